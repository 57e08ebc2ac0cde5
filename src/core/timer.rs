// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellable one-shot timer queue.
//!
//! A `TimerQueue<T>` holds a priority queue of `(deadline, tag)` entries
//! and a single dispatch thread that parks on a condvar until the head
//! deadline, then hands the tag to the handler. Tags are plain values
//! dispatched by the caller (typically a `match`), not polymorphic timer
//! objects.
//!
//! The dispatch thread never holds the queue lock while the handler
//! runs, so handlers may freely schedule or cancel entries.

use parking_lot::{Condvar, Mutex};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Identifies a scheduled entry for cancellation.
pub type TimerId = u64;

struct Entry<T> {
    at: Instant,
    id: TimerId,
    tag: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed so the max-heap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.at.cmp(&self.at).then_with(|| other.id.cmp(&self.id))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Entry<T>>,
    live: HashSet<TimerId>,
    next_id: TimerId,
    stop: bool,
}

struct Shared<T> {
    queue: Mutex<Inner<T>>,
    wake: Condvar,
}

/// One-shot timer queue with a dedicated dispatch thread.
///
/// Dropping the queue stops the thread and joins it (unless dropped
/// from the dispatch thread itself, in which case the thread exits on
/// its own once the stop flag is observed).
pub struct TimerQueue<T> {
    shared: Arc<Shared<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> TimerQueue<T> {
    /// Spawn the dispatch thread. `handler` is invoked once per fired
    /// entry, on the dispatch thread, with no queue lock held.
    pub fn spawn<F>(name: &str, handler: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                live: HashSet::new(),
                next_id: 1,
                stop: false,
            }),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(move || run(&worker, handler))
            .expect("failed to spawn timer thread");
        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Schedule `tag` to fire at `at`. Entries already in the past fire
    /// immediately (the dispatch thread is woken either way).
    pub fn schedule(&self, at: Instant, tag: T) -> TimerId {
        let mut inner = self.shared.queue.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.live.insert(id);
        inner.heap.push(Entry { at, id, tag });
        self.shared.wake.notify_one();
        id
    }

    /// Cancel a scheduled entry. A no-op if it already fired.
    pub fn cancel(&self, id: TimerId) {
        self.shared.queue.lock().live.remove(&id);
    }
}

fn run<T, F: FnMut(T)>(shared: &Shared<T>, mut handler: F) {
    loop {
        let tag;
        {
            let mut inner = shared.queue.lock();
            loop {
                if inner.stop {
                    return;
                }
                // Discard cancelled entries at the head.
                while let Some(top) = inner.heap.peek() {
                    if inner.live.contains(&top.id) {
                        break;
                    }
                    inner.heap.pop();
                }
                let Some(at) = inner.heap.peek().map(|e| e.at) else {
                    shared.wake.wait(&mut inner);
                    continue;
                };
                if Instant::now() < at {
                    shared.wake.wait_until(&mut inner, at);
                    continue;
                }
                if let Some(entry) = inner.heap.pop() {
                    inner.live.remove(&entry.id);
                    tag = entry.tag;
                    break;
                }
            }
        }
        handler(tag);
    }
}

impl<T> Drop for TimerQueue<T> {
    fn drop(&mut self) {
        self.shared.queue.lock().stop = true;
        self.shared.wake.notify_one();
        if let Some(t) = self.thread.take() {
            if t.thread().id() != thread::current().id() {
                let _ = t.join();
            }
        }
    }
}

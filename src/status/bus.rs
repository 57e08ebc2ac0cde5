// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status bus: one dispatcher thread per participant.
//!
//! The core enqueues notifications while holding its mutex; the
//! dispatcher invokes application callbacks with no core locks held,
//! so listeners may call back into the API freely. Notifications for
//! endpoints that have been destroyed are dropped at dispatch time.

use super::{
    LivelinessChangedStatus, LivelinessLostStatus, OfferedIncompatibleQosStatus,
    PublicationMatchedStatus, RequestedIncompatibleQosStatus, SubscriptionMatchedStatus,
};
use crate::core::Guid;
use crate::listener::{DataReaderListener, DataWriterListener};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

pub(crate) enum Notification {
    PublicationMatched {
        writer: Guid,
        listener: Weak<dyn DataWriterListener>,
        status: PublicationMatchedStatus,
    },
    OfferedIncompatibleQos {
        writer: Guid,
        listener: Weak<dyn DataWriterListener>,
        status: OfferedIncompatibleQosStatus,
    },
    LivelinessLost {
        writer: Guid,
        listener: Weak<dyn DataWriterListener>,
        status: LivelinessLostStatus,
    },
    SubscriptionMatched {
        reader: Guid,
        listener: Weak<dyn DataReaderListener>,
        status: SubscriptionMatchedStatus,
    },
    RequestedIncompatibleQos {
        reader: Guid,
        listener: Weak<dyn DataReaderListener>,
        status: RequestedIncompatibleQosStatus,
    },
    LivelinessChanged {
        reader: Guid,
        listener: Weak<dyn DataReaderListener>,
        status: LivelinessChangedStatus,
    },
    DataAvailable {
        reader: Guid,
        listener: Weak<dyn DataReaderListener>,
        writer: Guid,
        payload: Vec<u8>,
    },
}

impl Notification {
    fn endpoint(&self) -> Guid {
        match self {
            Self::PublicationMatched { writer, .. }
            | Self::OfferedIncompatibleQos { writer, .. }
            | Self::LivelinessLost { writer, .. } => *writer,
            Self::SubscriptionMatched { reader, .. }
            | Self::RequestedIncompatibleQos { reader, .. }
            | Self::LivelinessChanged { reader, .. }
            | Self::DataAvailable { reader, .. } => *reader,
        }
    }
}

pub(crate) struct StatusBus {
    tx: Option<Sender<Notification>>,
    alive: Arc<Mutex<HashSet<Guid>>>,
    thread: Option<JoinHandle<()>>,
}

impl StatusBus {
    pub fn spawn(participant: &str) -> Self {
        let (tx, rx) = channel::unbounded::<Notification>();
        let alive: Arc<Mutex<HashSet<Guid>>> = Arc::new(Mutex::new(HashSet::new()));
        let gate = Arc::clone(&alive);
        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let thread = thread::Builder::new()
            .name(format!("{participant}-status"))
            .spawn(move || {
                while let Ok(n) = rx.recv() {
                    if !gate.lock().contains(&n.endpoint()) {
                        continue;
                    }
                    dispatch(n);
                }
            })
            .expect("failed to spawn status dispatcher thread");
        Self {
            tx: Some(tx),
            alive,
            thread: Some(thread),
        }
    }

    /// Admit an endpoint; its notifications are deliverable from now on.
    pub fn register(&self, endpoint: Guid) {
        self.alive.lock().insert(endpoint);
    }

    /// Revoke an endpoint; queued notifications for it are dropped.
    pub fn revoke(&self, endpoint: Guid) {
        self.alive.lock().remove(&endpoint);
    }

    pub fn publish(&self, notification: Notification) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(notification);
        }
    }
}

fn dispatch(n: Notification) {
    match n {
        Notification::PublicationMatched {
            listener, status, ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_publication_matched(status);
            }
        }
        Notification::OfferedIncompatibleQos {
            listener, status, ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_offered_incompatible_qos(status);
            }
        }
        Notification::LivelinessLost {
            listener, status, ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_liveliness_lost(status);
            }
        }
        Notification::SubscriptionMatched {
            listener, status, ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_subscription_matched(status);
            }
        }
        Notification::RequestedIncompatibleQos {
            listener, status, ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_requested_incompatible_qos(status);
            }
        }
        Notification::LivelinessChanged {
            listener, status, ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_liveliness_changed(status);
            }
        }
        Notification::DataAvailable {
            listener,
            writer,
            payload,
            ..
        } => {
            if let Some(l) = listener.upgrade() {
                l.on_data_available(writer, &payload);
            }
        }
    }
}

impl Drop for StatusBus {
    fn drop(&mut self) {
        // Disconnect the channel so the dispatcher drains and exits.
        self.tx = None;
        if let Some(t) = self.thread.take() {
            if t.thread().id() != thread::current().id() {
                let _ = t.join();
            }
        }
    }
}

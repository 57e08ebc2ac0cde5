// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint registry: the participant's core state.
//!
//! A single mutex (held by the participant) guards everything in this
//! module: local writer and reader records, the per-pair lease tables,
//! and the expiration heap. Timer callbacks and inbound transport
//! calls mutate this state and accumulate [`Effect`]s; the participant
//! executes the effects only after the mutex is released, so listener
//! callbacks and channel sends never run under the core lock.

use crate::core::timer::{TimerId, TimerQueue};
use crate::core::Guid;
use crate::listener::{DataReaderListener, DataWriterListener};
use crate::qos::{Liveliness, Reliability};
use crate::status::bus::Notification;
use crate::status::{
    LivelinessChangedStatus, LivelinessLostStatus, OfferedIncompatibleQosStatus,
    PublicationMatchedStatus, RequestedIncompatibleQosStatus, SubscriptionMatchedStatus,
    QOS_POLICY_ID_LIVELINESS,
};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::Weak;
use std::time::{Duration, Instant};

/// Timer tags dispatched on the participant's timer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerTask {
    /// Participant-wide automatic assertion tick.
    AutomaticAssert,
    /// Deferred manual-by-participant announcement (coalescing).
    ManualParticipantAnnounce,
    /// Deferred heartbeat for a ManualByTopic writer.
    WriterHeartbeat(Guid),
    /// Writer-side lease ran out without a fresh assertion.
    WriterLease(Guid),
    /// Reader-side expiration heap head is due.
    LeaseCheck,
}

/// Deferred side effects of a core-state mutation, executed after the
/// core mutex is released.
pub(crate) enum Effect {
    Notify(Notification),
    /// Emit an automatic-scope assertion on the liveliness channel.
    SendAutomatic,
    /// Emit a manual-by-participant assertion on the liveliness channel.
    SendManual,
    /// Emit a heartbeat on the writer's own data channel.
    SendHeartbeat { writer: Guid },
    /// Route a written sample to matched readers.
    DeliverData { writer: Guid, payload: Vec<u8> },
}

/// Shared handles the engine and monitor need while mutating state.
pub(crate) struct Ctx<'a> {
    pub timer: &'a TimerQueue<TimerTask>,
}

/// Reader-side view of one matched writer.
pub(crate) struct LeaseEntry {
    /// Liveliness kind the writer offered; decides which assertion
    /// sources count (see the assertion-source table in the crate docs).
    pub offered_kind: crate::qos::LivelinessKind,
    /// Effective lease: the writer's offered duration.
    pub lease: Duration,
    /// `None` while not-alive or when the lease is infinite.
    pub deadline: Option<Instant>,
    pub alive: bool,
}

pub(crate) struct WriterRecord {
    pub topic: Arc<str>,
    pub liveliness: Liveliness,
    pub reliability: Reliability,
    pub listener: Option<Weak<dyn DataWriterListener>>,
    pub matched_readers: Vec<Guid>,
    /// False until the first assertion; the loss countdown only runs
    /// for writers that have asserted at least once.
    pub asserted: bool,
    pub alive: bool,
    pub lease_timer: Option<TimerId>,
    /// Current loss deadline; a lease fire that lands after a
    /// concurrent refresh sees a future deadline and stands down.
    pub lease_deadline: Option<Instant>,
    /// Coalescing state for ManualByTopic heartbeats.
    pub heartbeat_last_send: Option<Instant>,
    pub heartbeat_timer: Option<TimerId>,
    pub lost: LivelinessLostStatus,
    pub matched: PublicationMatchedStatus,
    pub incompatible: OfferedIncompatibleQosStatus,
}

pub(crate) struct ReaderRecord {
    pub topic: Arc<str>,
    pub requested: Liveliness,
    pub reliability: Reliability,
    pub listener: Option<Weak<dyn DataReaderListener>>,
    pub leases: HashMap<Guid, LeaseEntry>,
    pub changed: LivelinessChangedStatus,
    pub matched: SubscriptionMatchedStatus,
    pub incompatible: RequestedIncompatibleQosStatus,
}

/// Expiration heap key: min-heap over (deadline, reader, writer).
pub(crate) type LeaseKey = Reverse<(Instant, Guid, Guid)>;

pub(crate) struct CoreState {
    pub writers: HashMap<Guid, WriterRecord>,
    pub readers: HashMap<Guid, ReaderRecord>,
    /// Lazily invalidated: entries are checked against the current
    /// lease deadline when popped.
    pub expirations: BinaryHeap<LeaseKey>,
    pub lease_timer: Option<TimerId>,
    pub lease_timer_deadline: Option<Instant>,
    pub automatic_timer: Option<TimerId>,
    /// Coalescing state for manual-by-participant announcements.
    pub manual_timer: Option<TimerId>,
    pub manual_last_send: Option<Instant>,
}

impl CoreState {
    pub fn new() -> Self {
        Self {
            writers: HashMap::new(),
            readers: HashMap::new(),
            expirations: BinaryHeap::new(),
            lease_timer: None,
            lease_timer_deadline: None,
            automatic_timer: None,
            manual_timer: None,
            manual_last_send: None,
        }
    }

    /// Shortest finite announcement period over Automatic writers.
    pub fn min_automatic_period(&self) -> Option<Duration> {
        self.writers
            .values()
            .filter(|r| r.liveliness.kind == crate::qos::LivelinessKind::Automatic)
            .map(|r| r.liveliness.announcement_period)
            .filter(|p| *p != Liveliness::INFINITE)
            .min()
    }

    /// Shortest finite announcement period over ManualByParticipant
    /// writers; `None` means announcements are not throttled.
    pub fn min_manual_period(&self) -> Option<Duration> {
        self.writers
            .values()
            .filter(|r| r.liveliness.kind == crate::qos::LivelinessKind::ManualByParticipant)
            .map(|r| r.liveliness.announcement_period)
            .filter(|p| *p != Liveliness::INFINITE)
            .min()
    }

    pub fn has_manual_participant_writers(&self) -> bool {
        self.writers
            .values()
            .any(|r| r.liveliness.kind == crate::qos::LivelinessKind::ManualByParticipant)
    }

    /// A discovered reader matched one of our writers.
    pub fn writer_matched(&mut self, writer: Guid, reader: Guid, effects: &mut Vec<Effect>) {
        let Some(rec) = self.writers.get_mut(&writer) else {
            return;
        };
        rec.matched_readers.push(reader);
        rec.matched.total_count += 1;
        rec.matched.total_count_change += 1;
        rec.matched.current_count += 1;
        rec.matched.current_count_change += 1;
        rec.matched.last_subscription_handle = Some(reader);
        let status = take_publication_matched(rec);
        if let Some(listener) = rec.listener.clone() {
            effects.push(Effect::Notify(Notification::PublicationMatched {
                writer,
                listener,
                status,
            }));
        }
    }

    /// A previously matched reader went away.
    pub fn writer_unmatched(&mut self, writer: Guid, reader: Guid, effects: &mut Vec<Effect>) {
        let Some(rec) = self.writers.get_mut(&writer) else {
            return;
        };
        let before = rec.matched_readers.len();
        rec.matched_readers.retain(|r| *r != reader);
        if rec.matched_readers.len() == before {
            return;
        }
        invariant(rec.matched.current_count >= 1, "matched reader underflow");
        rec.matched.current_count -= 1;
        rec.matched.current_count_change -= 1;
        rec.matched.last_subscription_handle = Some(reader);
        let status = take_publication_matched(rec);
        if let Some(listener) = rec.listener.clone() {
            effects.push(Effect::Notify(Notification::PublicationMatched {
                writer,
                listener,
                status,
            }));
        }
    }

    /// A discovered reader requested liveliness beyond our offer.
    pub fn writer_incompatible(&mut self, writer: Guid, effects: &mut Vec<Effect>) {
        let Some(rec) = self.writers.get_mut(&writer) else {
            return;
        };
        rec.incompatible.total_count += 1;
        rec.incompatible.total_count_change += 1;
        rec.incompatible.last_policy_id = QOS_POLICY_ID_LIVELINESS;
        let status = take_offered_incompatible(rec);
        if let Some(listener) = rec.listener.clone() {
            effects.push(Effect::Notify(Notification::OfferedIncompatibleQos {
                writer,
                listener,
                status,
            }));
        }
    }
}

/// Snapshot a status for delivery, resetting its change fields. The
/// deltas therefore cover exactly the interval since the previous
/// delivery.
pub(crate) fn take_changed(rec: &mut ReaderRecord) -> LivelinessChangedStatus {
    let snapshot = rec.changed.clone();
    rec.changed.alive_count_change = 0;
    rec.changed.not_alive_count_change = 0;
    snapshot
}

pub(crate) fn take_lost(rec: &mut WriterRecord) -> LivelinessLostStatus {
    let snapshot = rec.lost.clone();
    rec.lost.total_count_change = 0;
    snapshot
}

pub(crate) fn take_subscription_matched(rec: &mut ReaderRecord) -> SubscriptionMatchedStatus {
    let snapshot = rec.matched.clone();
    rec.matched.total_count_change = 0;
    rec.matched.current_count_change = 0;
    snapshot
}

pub(crate) fn take_publication_matched(rec: &mut WriterRecord) -> PublicationMatchedStatus {
    let snapshot = rec.matched.clone();
    rec.matched.total_count_change = 0;
    rec.matched.current_count_change = 0;
    snapshot
}

pub(crate) fn take_requested_incompatible(
    rec: &mut ReaderRecord,
) -> RequestedIncompatibleQosStatus {
    let snapshot = rec.incompatible.clone();
    rec.incompatible.total_count_change = 0;
    snapshot
}

pub(crate) fn take_offered_incompatible(rec: &mut WriterRecord) -> OfferedIncompatibleQosStatus {
    let snapshot = rec.incompatible.clone();
    rec.incompatible.total_count_change = 0;
    snapshot
}

/// Internal invariant check. A violation means the lease bookkeeping is
/// corrupt; continuing would misreport liveliness, so the process logs
/// and aborts.
pub(crate) fn invariant(condition: bool, detail: &str) {
    if !condition {
        crate::error!("internal invariant violated: {}", detail);
        std::process::abort();
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::monitor;
use crate::channel::ParticipantMessage;
use crate::core::timer::TimerQueue;
use crate::core::Guid;
use crate::qos::{Liveliness, LivelinessKind, Reliability};
use crate::registry::{CoreState, Ctx, Effect, ReaderRecord, TimerTask};
use crate::status::{
    LivelinessChangedStatus, RequestedIncompatibleQosStatus, SubscriptionMatchedStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn reader_record(requested: Liveliness, reliability: Reliability) -> ReaderRecord {
    ReaderRecord {
        topic: Arc::from("topic"),
        requested,
        reliability,
        listener: None,
        leases: HashMap::new(),
        changed: LivelinessChangedStatus::default(),
        matched: SubscriptionMatchedStatus::default(),
        incompatible: RequestedIncompatibleQosStatus::default(),
    }
}

fn idle_timer() -> TimerQueue<TimerTask> {
    TimerQueue::spawn("monitor-test-timer", |_task| {})
}

struct Fixture {
    state: CoreState,
    reader: Guid,
    writer: Guid,
}

fn fixture(offered: &Liveliness, reader_reliability: Reliability, ctx: &Ctx<'_>) -> Fixture {
    let mut state = CoreState::new();
    let reader = Guid::user_reader([1; 12], 1);
    let writer = Guid::user_writer([2; 12], 1);
    state.readers.insert(
        reader,
        reader_record(
            Liveliness::new(offered.kind, offered.lease_duration),
            reader_reliability,
        ),
    );
    let mut effects = Vec::new();
    monitor::match_writer(
        &mut state,
        ctx,
        reader,
        writer,
        offered,
        Instant::now(),
        &mut effects,
    );
    Fixture { state, reader, writer }
}

fn counts(state: &CoreState, reader: Guid) -> (u32, u32) {
    let rec = &state.readers[&reader];
    (rec.changed.alive_count, rec.changed.not_alive_count)
}

#[test]
fn test_match_creates_alive_lease() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::automatic(Duration::from_millis(30));
    let f = fixture(&offered, Reliability::Reliable, &ctx);

    assert_eq!(counts(&f.state, f.reader), (1, 0));
    let entry = &f.state.readers[&f.reader].leases[&f.writer];
    assert!(entry.alive);
    assert!(entry.deadline.is_some());
}

#[test]
fn test_expiry_transitions_to_not_alive() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::automatic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);

    let mut effects = Vec::new();
    let later = Instant::now() + Duration::from_millis(100);
    monitor::on_lease_check(&mut f.state, &ctx, later, &mut effects);

    assert_eq!(counts(&f.state, f.reader), (0, 1));
    assert!(!f.state.readers[&f.reader].leases[&f.writer].alive);
    // alive + not_alive still covers every matched writer.
    assert_eq!(f.state.readers[&f.reader].leases.len(), 1);
}

#[test]
fn test_assertion_before_deadline_keeps_alive_and_advances() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::automatic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);
    let first_deadline = f.state.readers[&f.reader].leases[&f.writer].deadline;

    let mut effects = Vec::new();
    let msg = ParticipantMessage::automatic([2; 12]);
    let later = Instant::now() + Duration::from_millis(10);
    monitor::on_channel_message(&mut f.state, &ctx, &msg, later, &mut effects);

    let entry = &f.state.readers[&f.reader].leases[&f.writer];
    assert!(entry.alive);
    assert!(entry.deadline > first_deadline);
    assert_eq!(counts(&f.state, f.reader), (1, 0));
}

#[test]
fn test_recovery_after_expiry() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::automatic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);

    let mut effects = Vec::new();
    let expired_at = Instant::now() + Duration::from_millis(100);
    monitor::on_lease_check(&mut f.state, &ctx, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (0, 1));

    let msg = ParticipantMessage::automatic([2; 12]);
    monitor::on_channel_message(&mut f.state, &ctx, &msg, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (1, 0));
    assert!(f.state.readers[&f.reader].leases[&f.writer].alive);
}

#[test]
fn test_channel_scope_matches_offered_kind_exactly() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::manual_by_participant(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);

    let mut effects = Vec::new();
    let expired_at = Instant::now() + Duration::from_millis(100);
    monitor::on_lease_check(&mut f.state, &ctx, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (0, 1));

    // An automatic-scope assertion does not cover a ManualByParticipant
    // writer.
    let automatic = ParticipantMessage::automatic([2; 12]);
    monitor::on_channel_message(&mut f.state, &ctx, &automatic, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (0, 1));

    let manual = ParticipantMessage::manual_by_participant([2; 12], 1);
    monitor::on_channel_message(&mut f.state, &ctx, &manual, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (1, 0));
}

#[test]
fn test_sample_asserts_only_topic_kind() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };

    // ManualByParticipant offer: sample receipt is not an assertion.
    let offered = Liveliness::manual_by_participant(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);
    let mut effects = Vec::new();
    let expired_at = Instant::now() + Duration::from_millis(100);
    monitor::on_lease_check(&mut f.state, &ctx, expired_at, &mut effects);
    monitor::on_data(
        &mut f.state,
        &ctx,
        f.reader,
        f.writer,
        vec![1],
        expired_at,
        &mut effects,
    );
    assert_eq!(counts(&f.state, f.reader), (0, 1));

    // ManualByTopic offer: sample receipt recovers the lease.
    let offered = Liveliness::manual_by_topic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);
    let mut effects = Vec::new();
    monitor::on_lease_check(&mut f.state, &ctx, expired_at, &mut effects);
    monitor::on_data(
        &mut f.state,
        &ctx,
        f.reader,
        f.writer,
        vec![1],
        expired_at,
        &mut effects,
    );
    assert_eq!(counts(&f.state, f.reader), (1, 0));
}

#[test]
fn test_best_effort_reader_ignores_heartbeats() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::manual_by_topic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::BestEffort, &ctx);

    let mut effects = Vec::new();
    let expired_at = Instant::now() + Duration::from_millis(100);
    monitor::on_lease_check(&mut f.state, &ctx, expired_at, &mut effects);
    monitor::on_heartbeat(&mut f.state, &ctx, f.reader, f.writer, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (0, 1));
}

#[test]
fn test_reliable_reader_processes_heartbeats() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::manual_by_topic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);

    let mut effects = Vec::new();
    let expired_at = Instant::now() + Duration::from_millis(100);
    monitor::on_lease_check(&mut f.state, &ctx, expired_at, &mut effects);
    monitor::on_heartbeat(&mut f.state, &ctx, f.reader, f.writer, expired_at, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (1, 0));
}

#[test]
fn test_unmatch_destroys_lease_and_counts() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let offered = Liveliness::automatic(Duration::from_millis(30));
    let mut f = fixture(&offered, Reliability::Reliable, &ctx);

    let mut effects = Vec::new();
    monitor::unmatch_writer(&mut f.state, f.reader, f.writer, &mut effects);
    assert_eq!(counts(&f.state, f.reader), (0, 0));
    assert!(f.state.readers[&f.reader].leases.is_empty());
    assert_eq!(f.state.readers[&f.reader].matched.current_count, 0);
}

#[test]
fn test_expiry_is_aggregated_per_reader() {
    let timer = idle_timer();
    let ctx = Ctx { timer: &timer };
    let mut state = CoreState::new();
    let reader = Guid::user_reader([1; 12], 1);
    state.readers.insert(
        reader,
        reader_record(
            Liveliness::automatic(Duration::from_millis(30)),
            Reliability::Reliable,
        ),
    );
    // Give the record a listener so notifications materialize.
    struct NoOp;
    impl crate::listener::DataReaderListener for NoOp {}
    let listener: Arc<dyn crate::listener::DataReaderListener> = Arc::new(NoOp);
    if let Some(rec) = state.readers.get_mut(&reader) {
        rec.listener = Some(Arc::downgrade(&listener));
    }

    let offered = Liveliness::automatic(Duration::from_millis(30));
    let now = Instant::now();
    let mut effects = Vec::new();
    for key in 1..=3u32 {
        let writer = Guid::user_writer([2; 12], key);
        monitor::match_writer(&mut state, &ctx, reader, writer, &offered, now, &mut effects);
    }
    effects.clear();

    monitor::on_lease_check(
        &mut state,
        &ctx,
        now + Duration::from_millis(100),
        &mut effects,
    );
    // Three leases expired, one aggregated notification.
    let changed: Vec<_> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::Notify(crate::status::bus::Notification::LivelinessChanged {
                status, ..
            }) => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].not_alive_count, 3);
    assert_eq!(changed[0].not_alive_count_change, 3);
    assert_eq!(changed[0].alive_count, 0);

    let rec = &state.readers[&reader];
    assert_eq!(
        rec.changed.alive_count + rec.changed.not_alive_count,
        rec.leases.len() as u32
    );
}

#[test]
fn test_incompatible_offer_creates_no_lease() {
    let mut state = CoreState::new();
    let reader = Guid::user_reader([1; 12], 1);
    state.readers.insert(
        reader,
        reader_record(
            Liveliness::new(LivelinessKind::ManualByTopic, Duration::from_millis(10)),
            Reliability::Reliable,
        ),
    );

    let mut effects = Vec::new();
    monitor::incompatible_writer(&mut state, reader, &mut effects);
    let rec = &state.readers[&reader];
    assert!(rec.leases.is_empty());
    assert_eq!(rec.incompatible.total_count, 1);
    assert_eq!(
        rec.incompatible.last_policy_id,
        crate::status::QOS_POLICY_ID_LIVELINESS
    );
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blackbox liveliness scenarios: two participants wired through an
//! in-process domain, driven in real time with short leases.

use rtps_liveliness::{
    DataReader, DataReaderListener, DataWriter, DataWriterListener, Domain,
    LivelinessChangedStatus, LivelinessKind, LivelinessLostStatus, Participant, Reliability,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TOPIC: &str = "liveliness/topic";

/// Counts writer-side lost transitions via the listener.
#[derive(Default)]
struct WriterMonitor {
    lost: AtomicU32,
}

impl DataWriterListener for WriterMonitor {
    fn on_liveliness_lost(&self, _status: LivelinessLostStatus) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts reader-side recovery and loss transitions via the listener.
#[derive(Default)]
struct ReaderMonitor {
    recovered: AtomicU32,
    lost: AtomicU32,
}

impl DataReaderListener for ReaderMonitor {
    fn on_liveliness_changed(&self, status: LivelinessChangedStatus) {
        if status.alive_count_change > 0 {
            self.recovered
                .fetch_add(status.alive_count_change as u32, Ordering::SeqCst);
        }
        if status.not_alive_count_change > 0 {
            self.lost
                .fetch_add(status.not_alive_count_change as u32, Ordering::SeqCst);
        }
    }
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn wait_value(counter: &AtomicU32, expected: u32) -> u32 {
    wait_until(Duration::from_secs(2), || {
        counter.load(Ordering::SeqCst) == expected
    });
    counter.load(Ordering::SeqCst)
}

struct Pair {
    _pub_participant: Participant,
    _sub_participant: Participant,
    writer: DataWriter,
    _reader: DataReader,
    writer_monitor: Arc<WriterMonitor>,
    reader_monitor: Arc<ReaderMonitor>,
}

/// One writer and one reader on separate participants, reader first so
/// the match lands before the first write.
fn pair(
    writer_kind: LivelinessKind,
    reader_kind: LivelinessKind,
    lease: Duration,
    announcement: Duration,
    reliability: Reliability,
) -> Pair {
    let domain = Domain::new();
    let sub_participant = Participant::builder("sub")
        .domain(&domain)
        .build()
        .expect("subscriber participant");
    let pub_participant = Participant::builder("pub")
        .domain(&domain)
        .build()
        .expect("publisher participant");

    let reader_monitor = Arc::new(ReaderMonitor::default());
    let reader = sub_participant
        .create_reader(TOPIC)
        .reliability(reliability)
        .liveliness_kind(reader_kind)
        .liveliness_lease_duration(lease)
        .listener(Arc::clone(&reader_monitor) as Arc<dyn DataReaderListener>)
        .build()
        .expect("reader");

    let writer_monitor = Arc::new(WriterMonitor::default());
    let writer = pub_participant
        .create_writer(TOPIC)
        .reliability(reliability)
        .liveliness_kind(writer_kind)
        .liveliness_lease_duration(lease)
        .liveliness_announcement_period(announcement)
        .listener(Arc::clone(&writer_monitor) as Arc<dyn DataWriterListener>)
        .build()
        .expect("writer");

    assert_eq!(reader.subscription_matched_status().current_count, 1);
    assert_eq!(writer.publication_matched_status().current_count, 1);

    Pair {
        _pub_participant: pub_participant,
        _sub_participant: sub_participant,
        writer,
        _reader: reader,
        writer_monitor,
        reader_monitor,
    }
}

// ---------------------------------------------------------------------
// S1: automatic kind never loses liveliness while the process runs.
// ---------------------------------------------------------------------

#[test]
fn liveliness_automatic_reliable() {
    let p = pair(
        LivelinessKind::Automatic,
        LivelinessKind::Automatic,
        Duration::from_millis(20),
        Duration::from_millis(18),
        Reliability::Reliable,
    );

    thread::sleep(Duration::from_millis(200));

    assert_eq!(p.writer.liveliness_lost_status().total_count, 0);
    assert_eq!(p.writer_monitor.lost.load(Ordering::SeqCst), 0);
    assert_eq!(wait_value(&p.reader_monitor.recovered, 1), 1);
    assert_eq!(p.reader_monitor.lost.load(Ordering::SeqCst), 0);
}

#[test]
fn liveliness_automatic_best_effort() {
    let p = pair(
        LivelinessKind::Automatic,
        LivelinessKind::Automatic,
        Duration::from_millis(20),
        Duration::from_millis(18),
        Reliability::BestEffort,
    );

    thread::sleep(Duration::from_millis(200));

    // The liveliness channel is reliable regardless of user QoS.
    assert_eq!(p.writer.liveliness_lost_status().total_count, 0);
    assert_eq!(wait_value(&p.reader_monitor.recovered, 1), 1);
    assert_eq!(p.reader_monitor.lost.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------
// S2: short lease, manual-by-participant: every write/assert opens a
// short-lived aliveness window.
// ---------------------------------------------------------------------

#[test]
fn short_liveliness_manual_by_participant_reliable() {
    let p = pair(
        LivelinessKind::ManualByParticipant,
        LivelinessKind::ManualByParticipant,
        Duration::from_millis(10),
        Duration::from_millis(9),
        Reliability::Reliable,
    );

    for i in 0..3u8 {
        p.writer.write(&[i]).expect("write");
        thread::sleep(Duration::from_millis(100));
    }

    assert_eq!(p.writer.liveliness_lost_status().total_count, 3);
    assert_eq!(wait_value(&p.writer_monitor.lost, 3), 3);
    assert_eq!(wait_value(&p.reader_monitor.recovered, 3), 3);
    assert_eq!(wait_value(&p.reader_monitor.lost, 3), 3);

    for _ in 0..3 {
        p.writer.assert_liveliness().expect("assert");
        thread::sleep(Duration::from_millis(100));
    }

    assert_eq!(p.writer.liveliness_lost_status().total_count, 6);
    assert_eq!(wait_value(&p.reader_monitor.recovered, 6), 6);
    assert_eq!(wait_value(&p.reader_monitor.lost, 6), 6);
}

// ---------------------------------------------------------------------
// S3: long lease, manual-by-participant: a burst of writes keeps one
// aliveness window open, then the lease lapses once.
// ---------------------------------------------------------------------

#[test]
fn long_liveliness_manual_by_participant_reliable() {
    let p = pair(
        LivelinessKind::ManualByParticipant,
        LivelinessKind::ManualByParticipant,
        Duration::from_millis(200),
        Duration::from_millis(180),
        Reliability::Reliable,
    );

    for i in 0..3u8 {
        p.writer.write(&[i]).expect("write");
        thread::sleep(Duration::from_millis(100));
    }
    // Wait past the lease plus the last coalesced announcement.
    thread::sleep(Duration::from_millis(500));

    assert_eq!(p.writer.liveliness_lost_status().total_count, 1);
    assert_eq!(wait_value(&p.reader_monitor.recovered, 1), 1);
    assert_eq!(wait_value(&p.reader_monitor.lost, 1), 1);

    for _ in 0..3 {
        p.writer.assert_liveliness().expect("assert");
        thread::sleep(Duration::from_millis(100));
    }
    thread::sleep(Duration::from_millis(500));

    assert_eq!(p.writer.liveliness_lost_status().total_count, 2);
    assert_eq!(wait_value(&p.reader_monitor.recovered, 2), 2);
    assert_eq!(wait_value(&p.reader_monitor.lost, 2), 2);
}

// ---------------------------------------------------------------------
// S4: manual-by-topic + best-effort: assert_liveliness() rides on
// heartbeats, which best-effort endpoints neither send nor process, so
// the asserts are invisible to the reader.
// ---------------------------------------------------------------------

#[test]
fn manual_by_topic_best_effort_asserts_are_invisible() {
    let p = pair(
        LivelinessKind::ManualByTopic,
        LivelinessKind::ManualByTopic,
        Duration::from_millis(100),
        Duration::from_millis(90),
        Reliability::BestEffort,
    );

    for _ in 0..3 {
        p.writer.assert_liveliness().expect("assert");
        thread::sleep(Duration::from_millis(300));
    }

    // The writer loses liveliness after every lease expiry.
    assert_eq!(p.writer.liveliness_lost_status().total_count, 3);
    // The reader saw only the match-time aliveness and its single
    // expiry; nothing attributable to the asserts.
    assert_eq!(wait_value(&p.reader_monitor.recovered, 1), 1);
    assert_eq!(wait_value(&p.reader_monitor.lost, 1), 1);
}

/// Same shape with reliable endpoints: the heartbeats are visible.
#[test]
fn manual_by_topic_reliable_asserts_are_visible() {
    let p = pair(
        LivelinessKind::ManualByTopic,
        LivelinessKind::ManualByTopic,
        Duration::from_millis(100),
        Duration::from_millis(90),
        Reliability::Reliable,
    );

    for _ in 0..3 {
        p.writer.assert_liveliness().expect("assert");
        thread::sleep(Duration::from_millis(300));
    }

    assert_eq!(p.writer.liveliness_lost_status().total_count, 3);
    // Match + two recoveries from the later asserts (the first assert
    // lands inside the match window).
    assert_eq!(wait_value(&p.reader_monitor.recovered, 3), 3);
    assert_eq!(wait_value(&p.reader_monitor.lost, 3), 3);
}

// ---------------------------------------------------------------------
// S5: one assertion covers every manual-by-participant writer of the
// participant.
// ---------------------------------------------------------------------

#[test]
fn two_writers_two_readers_manual_by_participant() {
    let domain = Domain::new();
    let publishers = Participant::builder("publishers")
        .domain(&domain)
        .build()
        .expect("publishers");
    let subscribers = Participant::builder("subscribers")
        .domain(&domain)
        .build()
        .expect("subscribers");

    let lease = Duration::from_secs(1);
    let announcement = Duration::from_millis(500);

    let reader_monitors: Vec<Arc<ReaderMonitor>> =
        (0..2).map(|_| Arc::new(ReaderMonitor::default())).collect();
    let _readers: Vec<DataReader> = (0..2)
        .map(|i| {
            subscribers
                .create_reader(&format!("{TOPIC}{i}"))
                .liveliness_kind(LivelinessKind::ManualByParticipant)
                .liveliness_lease_duration(lease)
                .listener(Arc::clone(&reader_monitors[i]) as Arc<dyn DataReaderListener>)
                .build()
                .expect("reader")
        })
        .collect();

    let writers: Vec<DataWriter> = (0..2)
        .map(|i| {
            publishers
                .create_writer(&format!("{TOPIC}{i}"))
                .liveliness_kind(LivelinessKind::ManualByParticipant)
                .liveliness_lease_duration(lease)
                .liveliness_announcement_period(announcement)
                .build()
                .expect("writer")
        })
        .collect();

    // Only the first writer asserts; the kind covers the other.
    for _ in 0..4 {
        writers[0].assert_liveliness().expect("assert");
        thread::sleep(Duration::from_millis(50));
    }

    let lost_sum = || {
        writers
            .iter()
            .map(|w| w.liveliness_lost_status().total_count)
            .sum::<u32>()
    };
    let recovered_sum = || {
        reader_monitors
            .iter()
            .map(|m| m.recovered.load(Ordering::SeqCst))
            .sum::<u32>()
    };
    let reader_lost_sum = || {
        reader_monitors
            .iter()
            .map(|m| m.lost.load(Ordering::SeqCst))
            .sum::<u32>()
    };

    assert_eq!(lost_sum(), 0);
    assert!(wait_until(Duration::from_secs(1), || recovered_sum() == 2));
    assert_eq!(reader_lost_sum(), 0);

    // Idle past the lease (and the trailing coalesced announcement).
    thread::sleep(Duration::from_millis(2600));

    assert_eq!(lost_sum(), 2);
    assert_eq!(recovered_sum(), 2);
    assert!(wait_until(Duration::from_secs(1), || reader_lost_sum() == 2));
}

// ---------------------------------------------------------------------
// S6: three writers of distinct kinds, three readers requesting
// ManualByTopic: the ordering rule leaves exactly three matched pairs,
// all with the ManualByTopic writer, and only it asserts.
// ---------------------------------------------------------------------

#[test]
fn three_writers_three_readers() {
    let domain = Domain::new();
    let publishers = Participant::builder("publishers")
        .domain(&domain)
        .build()
        .expect("publishers");
    let subscribers = Participant::builder("subscribers")
        .domain(&domain)
        .build()
        .expect("subscribers");

    let lease = Duration::from_millis(500);
    let announcement = Duration::from_millis(250);

    let reader_monitors: Vec<Arc<ReaderMonitor>> =
        (0..3).map(|_| Arc::new(ReaderMonitor::default())).collect();
    let readers: Vec<DataReader> = (0..3)
        .map(|i| {
            subscribers
                .create_reader(TOPIC)
                .reliability(Reliability::Reliable)
                .liveliness_kind(LivelinessKind::ManualByTopic)
                .liveliness_lease_duration(lease)
                .listener(Arc::clone(&reader_monitors[i]) as Arc<dyn DataReaderListener>)
                .build()
                .expect("reader")
        })
        .collect();

    let kinds = [
        LivelinessKind::Automatic,
        LivelinessKind::ManualByParticipant,
        LivelinessKind::ManualByTopic,
    ];
    let writers: Vec<DataWriter> = kinds
        .iter()
        .map(|kind| {
            publishers
                .create_writer(TOPIC)
                .reliability(Reliability::Reliable)
                .liveliness_kind(*kind)
                .liveliness_lease_duration(lease)
                .liveliness_announcement_period(announcement)
                .build()
                .expect("writer")
        })
        .collect();

    // Each reader matched exactly the ManualByTopic writer.
    for reader in &readers {
        assert_eq!(reader.subscription_matched_status().current_count, 1);
    }
    assert_eq!(writers[2].publication_matched_status().current_count, 3);
    assert_eq!(writers[0].publication_matched_status().current_count, 0);
    assert_eq!(writers[1].publication_matched_status().current_count, 0);

    // Only the ManualByTopic writer asserts.
    for _ in 0..4 {
        writers[2].assert_liveliness().expect("assert");
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(2000));

    let recovered_sum: u32 = reader_monitors
        .iter()
        .map(|m| m.recovered.load(Ordering::SeqCst))
        .sum();
    assert_eq!(recovered_sum, 3);
}

// ---------------------------------------------------------------------
// Boundary behaviors.
// ---------------------------------------------------------------------

#[test]
fn equal_lease_is_compatible() {
    let p = pair(
        LivelinessKind::Automatic,
        LivelinessKind::Automatic,
        Duration::from_millis(10),
        Duration::from_millis(9),
        Reliability::Reliable,
    );
    assert_eq!(p.writer.publication_matched_status().current_count, 1);
}

#[test]
fn longer_offered_lease_is_incompatible() {
    let domain = Domain::new();
    let sub_participant = Participant::builder("sub")
        .domain(&domain)
        .build()
        .expect("sub");
    let pub_participant = Participant::builder("pub")
        .domain(&domain)
        .build()
        .expect("pub");

    let reader = sub_participant
        .create_reader(TOPIC)
        .liveliness_kind(LivelinessKind::Automatic)
        .liveliness_lease_duration(Duration::from_millis(10))
        .build()
        .expect("reader");
    let writer = pub_participant
        .create_writer(TOPIC)
        .liveliness_kind(LivelinessKind::Automatic)
        .liveliness_lease_duration(Duration::from_millis(11))
        .liveliness_announcement_period(Duration::from_millis(5))
        .build()
        .expect("writer");

    assert!(wait_until(Duration::from_secs(1), || {
        reader.requested_incompatible_qos_status().total_count == 1
    }));
    assert_eq!(writer.offered_incompatible_qos_status().total_count, 1);
    assert_eq!(reader.subscription_matched_status().current_count, 0);
    let changed = reader.liveliness_changed_status();
    assert_eq!(changed.alive_count + changed.not_alive_count, 0);
}

/// Offered ManualByTopic satisfies a requested Automatic, and both the
/// sample path and the heartbeat path count as assertions.
#[test]
fn manual_by_topic_offer_satisfies_automatic_request() {
    let domain = Domain::new();
    let sub_participant = Participant::builder("sub")
        .domain(&domain)
        .build()
        .expect("sub");
    let pub_participant = Participant::builder("pub")
        .domain(&domain)
        .build()
        .expect("pub");

    let monitor = Arc::new(ReaderMonitor::default());
    let _reader = sub_participant
        .create_reader(TOPIC)
        .reliability(Reliability::Reliable)
        .liveliness_kind(LivelinessKind::Automatic)
        .liveliness_lease_duration(Duration::from_millis(100))
        .listener(Arc::clone(&monitor) as Arc<dyn DataReaderListener>)
        .build()
        .expect("reader");
    let writer = pub_participant
        .create_writer(TOPIC)
        .reliability(Reliability::Reliable)
        .liveliness_kind(LivelinessKind::ManualByTopic)
        .liveliness_lease_duration(Duration::from_millis(100))
        .liveliness_announcement_period(Duration::from_millis(50))
        .build()
        .expect("writer");

    // Match window expires without assertions.
    assert_eq!(wait_value(&monitor.recovered, 1), 1);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(wait_value(&monitor.lost, 1), 1);

    // A sample write recovers the lease.
    writer.write(b"data").expect("write");
    assert_eq!(wait_value(&monitor.recovered, 2), 2);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(wait_value(&monitor.lost, 2), 2);

    // So does a bare heartbeat assertion.
    writer.assert_liveliness().expect("assert");
    assert_eq!(wait_value(&monitor.recovered, 3), 3);
}

#[test]
fn writer_drop_unmatches_reader() {
    let p = pair(
        LivelinessKind::Automatic,
        LivelinessKind::Automatic,
        Duration::from_secs(1),
        Duration::from_millis(500),
        Reliability::Reliable,
    );
    let reader_status = p._reader.subscription_matched_status();
    assert_eq!(reader_status.current_count, 1);

    drop(p.writer);

    assert!(wait_until(Duration::from_secs(1), || {
        p._reader.subscription_matched_status().current_count == 0
    }));
    let changed = p._reader.liveliness_changed_status();
    assert_eq!(changed.alive_count + changed.not_alive_count, 0);
}

#[test]
fn degenerate_announcement_period_is_rejected() {
    let participant = Participant::builder("solo").build().expect("participant");
    let result = participant
        .create_writer(TOPIC)
        .liveliness_kind(LivelinessKind::Automatic)
        .liveliness_lease_duration(Duration::from_millis(10))
        .liveliness_announcement_period(Duration::from_millis(10))
        .build();
    assert!(result.is_err());
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Liveliness QoS demo.
//!
//! ```text
//! liveliness_demo <publisher|subscriber> <AUTOMATIC|MANUAL_BY_PARTICIPANT|MANUAL_BY_TOPIC> [count] [sleep_ms]
//! ```
//!
//! The transport collaborator here is the in-process loopback, so each
//! role instantiates its peer in the same process: the publisher gets a
//! monitoring subscriber, the subscriber gets a publisher that writes a
//! few samples and then goes silent so loss detection is observable.
//!
//! Exit code 0 on graceful shutdown, 1 on initialization failure.

#[cfg(feature = "logging")]
use rtps_liveliness::logging::{init_logger, ConsoleOutput, LogLevel};
use rtps_liveliness::{
    DataReaderListener, DataWriterListener, Domain, Guid, LivelinessChangedStatus,
    LivelinessKind, LivelinessLostStatus, Participant, Reliability, SubscriptionMatchedStatus,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

struct PubListener;

impl DataWriterListener for PubListener {
    fn on_liveliness_lost(&self, status: LivelinessLostStatus) {
        println!("Liveliness lost (total {})", status.total_count);
    }
}

struct SubListener;

impl DataReaderListener for SubListener {
    fn on_data_available(&self, _writer: Guid, payload: &[u8]) {
        println!("Message of {} bytes RECEIVED", payload.len());
    }

    fn on_subscription_matched(&self, status: SubscriptionMatchedStatus) {
        if status.current_count_change > 0 {
            println!("Subscriber matched");
        } else {
            println!("Subscriber unmatched");
        }
    }

    fn on_liveliness_changed(&self, status: LivelinessChangedStatus) {
        if status.alive_count_change > 0 {
            println!("Publisher recovered liveliness");
        } else if status.not_alive_count_change > 0 {
            println!("Publisher lost liveliness");
        }
    }
}

fn parse_kind(arg: &str) -> Option<LivelinessKind> {
    match arg {
        "AUTOMATIC" => Some(LivelinessKind::Automatic),
        "MANUAL_BY_PARTICIPANT" => Some(LivelinessKind::ManualByParticipant),
        "MANUAL_BY_TOPIC" => Some(LivelinessKind::ManualByTopic),
        _ => None,
    }
}

const TOPIC: &str = "liveliness/demo";
const LEASE: Duration = Duration::from_millis(600);
const ANNOUNCEMENT: Duration = Duration::from_millis(300);

fn run_publisher(domain: &Domain, kind: LivelinessKind, count: u32, sleep: Duration) -> Option<()> {
    let participant = Participant::builder("Participant_pub")
        .domain(domain)
        .build()
        .ok()?;
    let writer = participant
        .create_writer(TOPIC)
        .reliability(Reliability::Reliable)
        .liveliness_kind(kind)
        .liveliness_lease_duration(LEASE)
        .liveliness_announcement_period(ANNOUNCEMENT)
        .listener(Arc::new(PubListener))
        .build()
        .ok()?;

    // In-process monitor so the run is observable end to end.
    let monitor_participant = Participant::builder("Participant_monitor")
        .domain(domain)
        .build()
        .ok()?;
    let _monitor = monitor_participant
        .create_reader(TOPIC)
        .reliability(Reliability::Reliable)
        .liveliness_kind(kind)
        .liveliness_lease_duration(LEASE)
        .listener(Arc::new(SubListener))
        .build()
        .ok()?;

    println!("Publisher running: {} samples every {:?}", count, sleep);
    for index in 1..=count {
        writer.write(format!("sample {index}").as_bytes()).ok()?;
        println!("Message {index} SENT");
        std::thread::sleep(sleep);
    }
    // Go silent long enough for the lease to lapse.
    std::thread::sleep(LEASE * 2);
    Some(())
}

fn run_subscriber(domain: &Domain, kind: LivelinessKind, count: u32, sleep: Duration) -> Option<()> {
    let participant = Participant::builder("Participant_sub")
        .domain(domain)
        .build()
        .ok()?;
    let _reader = participant
        .create_reader(TOPIC)
        .reliability(Reliability::Reliable)
        .liveliness_kind(kind)
        .liveliness_lease_duration(LEASE)
        .listener(Arc::new(SubListener))
        .build()
        .ok()?;

    // In-process peer: writes, then goes silent so the lease lapses.
    let peer_participant = Participant::builder("Participant_peer")
        .domain(domain)
        .build()
        .ok()?;
    let peer = peer_participant
        .create_writer(TOPIC)
        .reliability(Reliability::Reliable)
        .liveliness_kind(kind)
        .liveliness_lease_duration(LEASE)
        .liveliness_announcement_period(ANNOUNCEMENT)
        .build()
        .ok()?;

    println!("Subscriber running");
    for index in 1..=count {
        peer.write(format!("sample {index}").as_bytes()).ok()?;
        std::thread::sleep(sleep);
    }
    std::thread::sleep(LEASE * 2);
    Some(())
}

fn main() -> ExitCode {
    #[cfg(feature = "logging")]
    init_logger(Arc::new(ConsoleOutput), LogLevel::Warning);

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: liveliness_demo <publisher|subscriber> <AUTOMATIC|MANUAL_BY_PARTICIPANT|MANUAL_BY_TOPIC> [count] [sleep_ms]");
        return ExitCode::FAILURE;
    }
    let Some(kind) = parse_kind(&args[2]) else {
        eprintln!("Unknown liveliness kind: {}", args[2]);
        return ExitCode::FAILURE;
    };
    let count: u32 = args
        .get(3)
        .and_then(|a| a.parse().ok())
        .unwrap_or(10);
    let sleep = Duration::from_millis(
        args.get(4).and_then(|a| a.parse().ok()).unwrap_or(1000),
    );

    let domain = Domain::new();
    let ok = match args[1].as_str() {
        "publisher" => run_publisher(&domain, kind, count, sleep),
        "subscriber" => run_subscriber(&domain, kind, count, sleep),
        other => {
            eprintln!("Unknown role: {other} (expected publisher or subscriber)");
            return ExitCode::FAILURE;
        }
    };
    match ok {
        Some(()) => ExitCode::SUCCESS,
        None => {
            eprintln!("Initialization failed");
            ExitCode::FAILURE
        }
    }
}

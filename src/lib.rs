// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rtps-liveliness
//!
//! The Liveliness QoS subsystem of an RTPS (Real-Time Publish-Subscribe)
//! middleware: data writers advertise their aliveness to matched data
//! readers, and readers detect loss and recovery of that aliveness
//! within bounded time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtps_liveliness::{Domain, Participant, LivelinessKind, Reliability, Result};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let domain = Domain::new();
//!     let participant = Participant::builder("node").domain(&domain).build()?;
//!
//!     let writer = participant
//!         .create_writer("sensors/imu")
//!         .reliability(Reliability::Reliable)
//!         .liveliness_kind(LivelinessKind::ManualByTopic)
//!         .liveliness_lease_duration(Duration::from_millis(100))
//!         .liveliness_announcement_period(Duration::from_millis(50))
//!         .build()?;
//!
//!     writer.write(b"sample")?;
//!     writer.assert_liveliness()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |     Participant -> DataWriter/DataReader, listener callbacks       |
//! +--------------------------------------------------------------------+
//! |                        Liveliness Core                             |
//! |  Writer Assertion Engine | Reader Lease Monitor | Status Bus       |
//! |  Endpoint Registry (single core mutex) | Policy Compatibility      |
//! +--------------------------------------------------------------------+
//! |                        Built-in Protocol                           |
//! |  Liveliness Channel (participant messages, RELIABLE/VOLATILE)      |
//! +--------------------------------------------------------------------+
//! |                 Collaborators (in-process loopback)                |
//! |  Domain: discovery match/unmatch, sample/heartbeat routing         |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## What counts as an assertion
//!
//! | Writer kind | Reader observes | Requires heartbeat processing |
//! |---|---|---|
//! | `Automatic` | channel messages, emitted autonomously | no |
//! | `ManualByParticipant` | channel messages, app- or write-triggered | no |
//! | `ManualByTopic` + write | the data sample itself | no |
//! | `ManualByTopic` + `assert_liveliness()` | a heartbeat | yes — invisible to best-effort readers |
//!
//! ## Threads
//!
//! Each participant runs one timer thread (assertion cadence and lease
//! expiry) and one status dispatcher thread (listener callbacks, with
//! no core locks held). Application API calls never block on the
//! network.

/// Built-in liveliness channel and its wire format.
pub mod channel;
/// Core primitives: GUIDs, the monotonic clock, the timer queue.
pub mod core;
mod domain;
mod listener;
/// Compile-time configurable logging (`debug!`..`error!` macros).
pub mod logging;
mod participant;
/// QoS policies (liveliness kinds, leases, reliability).
pub mod qos;
mod reader;
mod registry;
/// Status structures delivered to listeners.
pub mod status;
mod writer;

pub use core::Guid;
pub use domain::Domain;
pub use listener::{DataReaderListener, DataWriterListener};
pub use participant::{
    DataReader, DataReaderBuilder, DataWriter, DataWriterBuilder, Participant, ParticipantBuilder,
};
pub use qos::{Liveliness, LivelinessKind, Reliability};
pub use status::{
    LivelinessChangedStatus, LivelinessLostStatus, OfferedIncompatibleQosStatus,
    PublicationMatchedStatus, RequestedIncompatibleQosStatus, SubscriptionMatchedStatus,
    QOS_POLICY_ID_LIVELINESS,
};

/// Errors returned by liveliness operations.
///
/// Only configuration problems surface synchronously; runtime
/// conditions (lease expiry, incompatible offers, transport hiccups)
/// manifest as listener events and logs, never as errors from API
/// calls.
#[derive(Debug)]
pub enum Error {
    /// Liveliness policy is degenerate (announcement period not below
    /// a finite lease duration).
    InvalidQos(String),
    /// Invalid state for the requested operation.
    InvalidState(String),
    /// A received message could not be decoded.
    SerializationError,
    /// Buffer too short for the fixed wire layout.
    BufferTooSmall,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidQos(msg) => write!(f, "Invalid QoS: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::SerializationError => write!(f, "Message decoding failed"),
            Error::BufferTooSmall => write!(f, "Buffer too small"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

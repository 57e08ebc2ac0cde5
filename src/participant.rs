// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant and endpoint handles.
//!
//! A [`Participant`] is a self-contained value: it owns the core state
//! mutex, one timer thread, one status dispatcher thread, and the
//! built-in liveliness channel. Endpoints are created through builders
//! with chainable QoS setters and live as long as their handles; a
//! dropped handle destroys the endpoint (cancelling its timers and
//! dropping its pending notifications).
//!
//! # Locking
//!
//! Every mutation takes the single core mutex, accumulates [`Effect`]s,
//! and executes them after release. Listener callbacks therefore never
//! run under a core lock, and the liveliness channel (which has its own
//! mutex) is never entered while the core mutex is held.

use crate::channel::{LivelinessChannel, ParticipantMessage};
use crate::core::clock::Clock;
use crate::core::guid::fresh_prefix;
use crate::core::timer::TimerQueue;
use crate::core::Guid;
use crate::domain::{Domain, EndpointInfo};
use crate::listener::{DataReaderListener, DataWriterListener};
use crate::qos::{Liveliness, LivelinessKind, Reliability};
use crate::reader::monitor;
use crate::registry::{CoreState, Ctx, Effect, ReaderRecord, TimerTask, WriterRecord};
use crate::status::{
    LivelinessChangedStatus, LivelinessLostStatus, OfferedIncompatibleQosStatus,
    PublicationMatchedStatus, RequestedIncompatibleQosStatus, SubscriptionMatchedStatus,
};
use crate::writer::engine;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub(crate) struct ParticipantInner {
    name: String,
    prefix: [u8; 12],
    clock: Clock,
    domain: Domain,
    channel: LivelinessChannel,
    bus: crate::status::bus::StatusBus,
    timer: TimerQueue<TimerTask>,
    state: Mutex<CoreState>,
    entity_seq: AtomicU32,
}

impl ParticipantInner {
    fn handle_timer(&self, task: TimerTask) {
        let now = self.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            let ctx = Ctx { timer: &self.timer };
            match task {
                TimerTask::AutomaticAssert => {
                    engine::on_automatic_tick(&mut st, &ctx, now, &mut effects);
                }
                TimerTask::ManualParticipantAnnounce => {
                    engine::on_manual_announce(&mut st, now, &mut effects);
                }
                TimerTask::WriterHeartbeat(writer) => {
                    engine::on_heartbeat_timer(&mut st, writer, now, &mut effects);
                }
                TimerTask::WriterLease(writer) => {
                    engine::on_writer_lease_expired(&mut st, writer, now, &mut effects);
                }
                TimerTask::LeaseCheck => {
                    monitor::on_lease_check(&mut st, &ctx, now, &mut effects);
                }
            }
        }
        self.run_effects(effects);
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(notification) => self.bus.publish(notification),
                Effect::SendAutomatic => {
                    let msg = self.channel.automatic_message();
                    self.domain.route_assertion(&msg.encode());
                }
                Effect::SendManual => {
                    let msg = self.channel.next_manual_message();
                    self.domain.route_assertion(&msg.encode());
                }
                Effect::SendHeartbeat { writer } => self.domain.route_heartbeat(writer),
                Effect::DeliverData { writer, payload } => {
                    self.domain.route_data(writer, &payload);
                }
            }
        }
    }

    fn alloc_writer_guid(&self) -> Guid {
        Guid::user_writer(self.prefix, self.entity_seq.fetch_add(1, Ordering::Relaxed))
    }

    fn alloc_reader_guid(&self) -> Guid {
        Guid::user_reader(self.prefix, self.entity_seq.fetch_add(1, Ordering::Relaxed))
    }

    fn add_writer(
        &self,
        guid: Guid,
        topic: Arc<str>,
        liveliness: Liveliness,
        reliability: Reliability,
        listener: Option<Weak<dyn DataWriterListener>>,
    ) {
        let now = self.clock.now();
        let mut st = self.state.lock();
        st.writers.insert(
            guid,
            WriterRecord {
                topic,
                liveliness,
                reliability,
                listener,
                matched_readers: Vec::new(),
                asserted: false,
                alive: false,
                lease_timer: None,
                lease_deadline: None,
                heartbeat_last_send: None,
                heartbeat_timer: None,
                lost: LivelinessLostStatus::default(),
                matched: PublicationMatchedStatus::default(),
                incompatible: OfferedIncompatibleQosStatus::default(),
            },
        );
        self.bus.register(guid);
        if liveliness.kind == LivelinessKind::Automatic {
            let ctx = Ctx { timer: &self.timer };
            engine::refresh_automatic_timer(&mut st, &ctx, now);
        }
    }

    fn add_reader(
        &self,
        guid: Guid,
        topic: Arc<str>,
        requested: Liveliness,
        reliability: Reliability,
        listener: Option<Weak<dyn DataReaderListener>>,
    ) {
        let mut st = self.state.lock();
        st.readers.insert(
            guid,
            ReaderRecord {
                topic,
                requested,
                reliability,
                listener,
                leases: HashMap::new(),
                changed: LivelinessChangedStatus::default(),
                matched: SubscriptionMatchedStatus::default(),
                incompatible: RequestedIncompatibleQosStatus::default(),
            },
        );
        self.bus.register(guid);
    }

    fn destroy_writer(&self, guid: Guid) {
        {
            let now = self.clock.now();
            let mut st = self.state.lock();
            if let Some(rec) = st.writers.remove(&guid) {
                if let Some(id) = rec.lease_timer {
                    self.timer.cancel(id);
                }
                if let Some(id) = rec.heartbeat_timer {
                    self.timer.cancel(id);
                }
                let ctx = Ctx { timer: &self.timer };
                engine::refresh_automatic_timer(&mut st, &ctx, now);
                if !st.has_manual_participant_writers() {
                    if let Some(id) = st.manual_timer.take() {
                        self.timer.cancel(id);
                    }
                }
            }
        }
        self.bus.revoke(guid);
        self.domain.retire_writer(guid);
    }

    fn destroy_reader(&self, guid: Guid) {
        {
            let mut st = self.state.lock();
            // Heap entries for the removed leases invalidate lazily.
            st.readers.remove(&guid);
        }
        self.bus.revoke(guid);
        self.domain.retire_reader(guid);
    }

    // ---- discovery events (called by the domain) ----

    pub(crate) fn remote_writer_matched(&self, reader: Guid, writer: Guid, offered: &Liveliness) {
        let now = self.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            let ctx = Ctx { timer: &self.timer };
            monitor::match_writer(&mut st, &ctx, reader, writer, offered, now, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn remote_writer_unmatched(&self, reader: Guid, writer: Guid) {
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            monitor::unmatch_writer(&mut st, reader, writer, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn remote_writer_incompatible(&self, reader: Guid) {
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            monitor::incompatible_writer(&mut st, reader, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn remote_reader_matched(&self, writer: Guid, reader: Guid) {
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            st.writer_matched(writer, reader, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn remote_reader_unmatched(&self, writer: Guid, reader: Guid) {
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            st.writer_unmatched(writer, reader, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn remote_reader_incompatible(&self, writer: Guid) {
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            st.writer_incompatible(writer, &mut effects);
        }
        self.run_effects(effects);
    }

    // ---- transport events (called by the domain) ----

    pub(crate) fn deliver_data(&self, reader: Guid, writer: Guid, payload: Vec<u8>) {
        let now = self.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            let ctx = Ctx { timer: &self.timer };
            monitor::on_data(&mut st, &ctx, reader, writer, payload, now, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn deliver_heartbeat(&self, reader: Guid, writer: Guid) {
        let now = self.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            let ctx = Ctx { timer: &self.timer };
            monitor::on_heartbeat(&mut st, &ctx, reader, writer, now, &mut effects);
        }
        self.run_effects(effects);
    }

    pub(crate) fn deliver_assertion(&self, buf: &[u8]) {
        let msg = match ParticipantMessage::decode(buf) {
            Ok(msg) => msg,
            Err(e) => {
                crate::warn!("{}: undecodable liveliness assertion dropped: {}", self.name, e);
                return;
            }
        };
        if !self.channel.accept(&msg) {
            return;
        }
        let now = self.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.state.lock();
            let ctx = Ctx { timer: &self.timer };
            monitor::on_channel_message(&mut st, &ctx, &msg, now, &mut effects);
        }
        self.run_effects(effects);
    }
}

impl Drop for ParticipantInner {
    fn drop(&mut self) {
        self.domain.detach(self.prefix);
    }
}

/// Entry point: one node in the liveliness domain.
///
/// # Example
///
/// ```no_run
/// use rtps_liveliness::{Domain, Participant, LivelinessKind, Reliability};
/// use std::time::Duration;
///
/// let domain = Domain::new();
/// let participant = Participant::builder("sensor_node")
///     .domain(&domain)
///     .build()?;
/// let writer = participant
///     .create_writer("sensors/temperature")
///     .reliability(Reliability::Reliable)
///     .liveliness_kind(LivelinessKind::ManualByParticipant)
///     .liveliness_lease_duration(Duration::from_millis(500))
///     .liveliness_announcement_period(Duration::from_millis(100))
///     .build()?;
/// writer.write(b"23.5")?;
/// # Ok::<(), rtps_liveliness::Error>(())
/// ```
pub struct Participant {
    inner: Arc<ParticipantInner>,
}

impl Participant {
    /// Start building a participant.
    #[must_use]
    pub fn builder(name: &str) -> ParticipantBuilder {
        ParticipantBuilder {
            name: name.to_string(),
            domain: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn guid_prefix(&self) -> [u8; 12] {
        self.inner.prefix
    }

    /// Start building a data writer on `topic`.
    #[must_use]
    pub fn create_writer(&self, topic: &str) -> DataWriterBuilder {
        DataWriterBuilder {
            participant: Arc::clone(&self.inner),
            topic: topic.to_string(),
            liveliness: Liveliness::default(),
            reliability: Reliability::default(),
            listener: None,
        }
    }

    /// Start building a data reader on `topic`.
    #[must_use]
    pub fn create_reader(&self, topic: &str) -> DataReaderBuilder {
        DataReaderBuilder {
            participant: Arc::clone(&self.inner),
            topic: topic.to_string(),
            liveliness: Liveliness::default(),
            reliability: Reliability::default(),
            listener: None,
        }
    }
}

/// Builder for [`Participant`].
pub struct ParticipantBuilder {
    name: String,
    domain: Option<Domain>,
}

impl ParticipantBuilder {
    /// Join an existing domain. Without this, the participant gets a
    /// private domain and only ever matches its own endpoints.
    #[must_use]
    pub fn domain(mut self, domain: &Domain) -> Self {
        self.domain = Some(domain.clone());
        self
    }

    /// Create the participant, spawning its timer and dispatcher
    /// threads.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the name is empty.
    pub fn build(self) -> Result<Participant> {
        if self.name.is_empty() {
            return Err(Error::InvalidState(
                "participant name must not be empty".into(),
            ));
        }
        let name = self.name;
        let domain = self.domain.unwrap_or_default();
        let prefix = fresh_prefix();
        let timer_name = format!("{name}-timer");
        let inner = Arc::new_cyclic(|weak: &Weak<ParticipantInner>| {
            let handle = weak.clone();
            let timer = TimerQueue::spawn(&timer_name, move |task| {
                if let Some(inner) = handle.upgrade() {
                    inner.handle_timer(task);
                }
            });
            ParticipantInner {
                bus: crate::status::bus::StatusBus::spawn(&name),
                channel: LivelinessChannel::new(prefix),
                clock: Clock::new(),
                domain: domain.clone(),
                entity_seq: AtomicU32::new(1),
                name,
                prefix,
                state: Mutex::new(CoreState::new()),
                timer,
            }
        });
        inner.domain.attach(prefix, &inner);
        crate::info!(
            "participant {} up ({})",
            inner.name,
            Guid::participant(prefix)
        );
        crate::debug!(
            "liveliness channel endpoints: {} / {}",
            inner.channel.writer_guid(),
            inner.channel.reader_guid()
        );
        Ok(Participant { inner })
    }
}

/// Builder for [`DataWriter`] with chainable QoS setters.
pub struct DataWriterBuilder {
    participant: Arc<ParticipantInner>,
    topic: String,
    liveliness: Liveliness,
    reliability: Reliability,
    listener: Option<Arc<dyn DataWriterListener>>,
}

impl DataWriterBuilder {
    #[must_use]
    pub fn reliability(mut self, kind: Reliability) -> Self {
        self.reliability = kind;
        self
    }

    #[must_use]
    pub fn liveliness_kind(mut self, kind: LivelinessKind) -> Self {
        self.liveliness.kind = kind;
        self
    }

    #[must_use]
    pub fn liveliness_lease_duration(mut self, duration: Duration) -> Self {
        self.liveliness.lease_duration = duration;
        self
    }

    #[must_use]
    pub fn liveliness_announcement_period(mut self, period: Duration) -> Self {
        self.liveliness.announcement_period = period;
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn DataWriterListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Create the writer and announce it to the domain.
    ///
    /// # Errors
    ///
    /// `InvalidQos` when the liveliness policy is degenerate
    /// (announcement period not below a finite lease).
    pub fn build(self) -> Result<DataWriter> {
        self.liveliness.validate().map_err(Error::InvalidQos)?;
        let guid = self.participant.alloc_writer_guid();
        let topic: Arc<str> = Arc::from(self.topic.as_str());
        let weak = self.listener.as_ref().map(Arc::downgrade);
        self.participant.add_writer(
            guid,
            Arc::clone(&topic),
            self.liveliness,
            self.reliability,
            weak,
        );
        self.participant.domain.announce_writer(
            guid,
            EndpointInfo {
                topic: Arc::clone(&topic),
                liveliness: self.liveliness,
                reliability: self.reliability,
            },
        );
        Ok(DataWriter {
            participant: self.participant,
            guid,
            topic,
            _listener: self.listener,
        })
    }
}

/// Builder for [`DataReader`] with chainable QoS setters.
pub struct DataReaderBuilder {
    participant: Arc<ParticipantInner>,
    topic: String,
    liveliness: Liveliness,
    reliability: Reliability,
    listener: Option<Arc<dyn DataReaderListener>>,
}

impl DataReaderBuilder {
    #[must_use]
    pub fn reliability(mut self, kind: Reliability) -> Self {
        self.reliability = kind;
        self
    }

    #[must_use]
    pub fn liveliness_kind(mut self, kind: LivelinessKind) -> Self {
        self.liveliness.kind = kind;
        self
    }

    #[must_use]
    pub fn liveliness_lease_duration(mut self, duration: Duration) -> Self {
        self.liveliness.lease_duration = duration;
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn DataReaderListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Create the reader and announce it to the domain.
    ///
    /// # Errors
    ///
    /// `InvalidQos` when the liveliness policy is degenerate.
    pub fn build(self) -> Result<DataReader> {
        self.liveliness.validate().map_err(Error::InvalidQos)?;
        let guid = self.participant.alloc_reader_guid();
        let topic: Arc<str> = Arc::from(self.topic.as_str());
        let weak = self.listener.as_ref().map(Arc::downgrade);
        self.participant.add_reader(
            guid,
            Arc::clone(&topic),
            self.liveliness,
            self.reliability,
            weak,
        );
        self.participant.domain.announce_reader(
            guid,
            EndpointInfo {
                topic: Arc::clone(&topic),
                liveliness: self.liveliness,
                reliability: self.reliability,
            },
        );
        Ok(DataReader {
            participant: self.participant,
            guid,
            topic,
            _listener: self.listener,
        })
    }
}

/// Publishing endpoint. Dropping the handle destroys the endpoint.
pub struct DataWriter {
    participant: Arc<ParticipantInner>,
    guid: Guid,
    topic: Arc<str>,
    _listener: Option<Arc<dyn DataWriterListener>>,
}

impl DataWriter {
    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a sample. The write doubles as a liveliness assertion
    /// for manual kinds. Never blocks on the network.
    ///
    /// # Errors
    ///
    /// Currently infallible; transport failures are retried or logged
    /// by the reliability layer, never surfaced here.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        let now = self.participant.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.participant.state.lock();
            let ctx = Ctx {
                timer: &self.participant.timer,
            };
            engine::on_sample_written(&mut st, &ctx, self.guid, payload.to_vec(), now, &mut effects);
        }
        self.participant.run_effects(effects);
        Ok(())
    }

    /// Assert liveliness without publishing data.
    ///
    /// For ManualByTopic writers the assertion rides on a heartbeat,
    /// which best-effort readers will not observe.
    ///
    /// # Errors
    ///
    /// Currently infallible; see [`Self::write`].
    pub fn assert_liveliness(&self) -> Result<()> {
        let now = self.participant.clock.now();
        let mut effects = Vec::new();
        {
            let mut st = self.participant.state.lock();
            let ctx = Ctx {
                timer: &self.participant.timer,
            };
            engine::assert_liveliness(&mut st, &ctx, self.guid, now, &mut effects);
        }
        self.participant.run_effects(effects);
        Ok(())
    }

    /// The liveliness policy this writer offers.
    #[must_use]
    pub fn liveliness(&self) -> Liveliness {
        let st = self.participant.state.lock();
        st.writers
            .get(&self.guid)
            .map(|r| r.liveliness)
            .unwrap_or_default()
    }

    /// Snapshot of the writer's liveliness-lost status (no reset).
    #[must_use]
    pub fn liveliness_lost_status(&self) -> LivelinessLostStatus {
        let st = self.participant.state.lock();
        st.writers
            .get(&self.guid)
            .map(|r| r.lost.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the writer's matched-reader status (no reset).
    #[must_use]
    pub fn publication_matched_status(&self) -> PublicationMatchedStatus {
        let st = self.participant.state.lock();
        st.writers
            .get(&self.guid)
            .map(|r| r.matched.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the writer's incompatible-QoS status (no reset).
    #[must_use]
    pub fn offered_incompatible_qos_status(&self) -> OfferedIncompatibleQosStatus {
        let st = self.participant.state.lock();
        st.writers
            .get(&self.guid)
            .map(|r| r.incompatible.clone())
            .unwrap_or_default()
    }
}

impl Drop for DataWriter {
    fn drop(&mut self) {
        self.participant.destroy_writer(self.guid);
    }
}

/// Subscribing endpoint. Dropping the handle destroys the endpoint.
pub struct DataReader {
    participant: Arc<ParticipantInner>,
    guid: Guid,
    topic: Arc<str>,
    _listener: Option<Arc<dyn DataReaderListener>>,
}

impl DataReader {
    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The liveliness policy this reader requests.
    #[must_use]
    pub fn liveliness(&self) -> Liveliness {
        let st = self.participant.state.lock();
        st.readers
            .get(&self.guid)
            .map(|r| r.requested)
            .unwrap_or_default()
    }

    /// Snapshot of the reader's liveliness status (no reset).
    #[must_use]
    pub fn liveliness_changed_status(&self) -> LivelinessChangedStatus {
        let st = self.participant.state.lock();
        st.readers
            .get(&self.guid)
            .map(|r| r.changed.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the reader's matched-writer status (no reset).
    #[must_use]
    pub fn subscription_matched_status(&self) -> SubscriptionMatchedStatus {
        let st = self.participant.state.lock();
        st.readers
            .get(&self.guid)
            .map(|r| r.matched.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the reader's incompatible-QoS status (no reset).
    #[must_use]
    pub fn requested_incompatible_qos_status(&self) -> RequestedIncompatibleQosStatus {
        let st = self.participant.state.lock();
        st.readers
            .get(&self.guid)
            .map(|r| r.incompatible.clone())
            .unwrap_or_default()
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        self.participant.destroy_reader(self.guid);
    }
}

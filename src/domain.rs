// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process domain: discovery and transport loopback.
//!
//! Stands in for the external discovery and reliability collaborators:
//! endpoints announce themselves here, the liveliness compatibility
//! gate runs at announcement time, and matched pairs get sample,
//! heartbeat, and liveliness-channel routing. Participants hold the
//! domain by value and the domain holds participants weakly — there
//! are no process-wide singletons and no ownership cycles.
//!
//! Routing honors the reliability asymmetry: heartbeats are emitted
//! only by reliable writers (enforced in the assertion engine) and
//! processed only by reliable readers (enforced in the lease monitor).
//! Liveliness-channel messages are delivered to every attached
//! participant, reliably, regardless of user-endpoint QoS.

use crate::core::Guid;
use crate::participant::ParticipantInner;
use crate::qos::{Liveliness, Reliability};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Announced endpoint attributes, the discovery view of an endpoint.
#[derive(Clone)]
pub(crate) struct EndpointInfo {
    pub topic: Arc<str>,
    pub liveliness: Liveliness,
    pub reliability: Reliability,
}

#[derive(Default)]
struct DomainState {
    participants: HashMap<[u8; 12], Weak<ParticipantInner>>,
    writers: HashMap<Guid, EndpointInfo>,
    readers: HashMap<Guid, EndpointInfo>,
    matches: HashSet<(Guid, Guid)>,
}

impl DomainState {
    fn participant(&self, prefix: &[u8; 12]) -> Option<Arc<ParticipantInner>> {
        self.participants.get(prefix).and_then(Weak::upgrade)
    }
}

/// Handle to an in-process domain. Cloning shares the same domain.
#[derive(Clone, Default)]
pub struct Domain {
    state: Arc<Mutex<DomainState>>,
}

impl Domain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, prefix: [u8; 12], participant: &Arc<ParticipantInner>) {
        let mut state = self.state.lock();
        state.participants.retain(|_, p| p.strong_count() > 0);
        state.participants.insert(prefix, Arc::downgrade(participant));
    }

    pub(crate) fn detach(&self, prefix: [u8; 12]) {
        self.state.lock().participants.remove(&prefix);
    }

    /// A writer appeared: run the compatibility gate against every
    /// reader on the topic, then deliver match or incompatible-QoS
    /// events to both sides.
    pub(crate) fn announce_writer(&self, writer: Guid, info: EndpointInfo) {
        let mut matched: Vec<(Guid, Arc<ParticipantInner>)> = Vec::new();
        let mut rejected: Vec<(Guid, Arc<ParticipantInner>)> = Vec::new();
        let writer_side;
        {
            let mut state = self.state.lock();
            state.writers.insert(writer, info.clone());
            for (reader, r) in &state.readers {
                if r.topic != info.topic {
                    continue;
                }
                let Some(p) = state.participant(&reader.prefix) else {
                    continue;
                };
                if info.liveliness.is_compatible_with(&r.liveliness) {
                    matched.push((*reader, p));
                } else {
                    rejected.push((*reader, p));
                }
            }
            for (reader, _) in &matched {
                state.matches.insert((writer, *reader));
            }
            writer_side = state.participant(&writer.prefix);
        }
        for (reader, p) in matched {
            p.remote_writer_matched(reader, writer, &info.liveliness);
            if let Some(wp) = &writer_side {
                wp.remote_reader_matched(writer, reader);
            }
        }
        for (reader, p) in rejected {
            crate::debug!("domain: incompatible liveliness offer {} -> {}", writer, reader);
            p.remote_writer_incompatible(reader);
            if let Some(wp) = &writer_side {
                wp.remote_reader_incompatible(writer);
            }
        }
    }

    /// A reader appeared: the mirror image of [`Self::announce_writer`].
    pub(crate) fn announce_reader(&self, reader: Guid, info: EndpointInfo) {
        let mut matched: Vec<(Guid, Liveliness, Arc<ParticipantInner>)> = Vec::new();
        let mut rejected: Vec<(Guid, Arc<ParticipantInner>)> = Vec::new();
        let reader_side;
        {
            let mut state = self.state.lock();
            state.readers.insert(reader, info.clone());
            for (writer, w) in &state.writers {
                if w.topic != info.topic {
                    continue;
                }
                let Some(p) = state.participant(&writer.prefix) else {
                    continue;
                };
                if w.liveliness.is_compatible_with(&info.liveliness) {
                    matched.push((*writer, w.liveliness, p));
                } else {
                    rejected.push((*writer, p));
                }
            }
            for (writer, _, _) in &matched {
                state.matches.insert((*writer, reader));
            }
            reader_side = state.participant(&reader.prefix);
        }
        for (writer, offered, wp) in matched {
            if let Some(rp) = &reader_side {
                rp.remote_writer_matched(reader, writer, &offered);
            }
            wp.remote_reader_matched(writer, reader);
        }
        for (writer, wp) in rejected {
            crate::debug!("domain: incompatible liveliness offer {} -> {}", writer, reader);
            if let Some(rp) = &reader_side {
                rp.remote_writer_incompatible(reader);
            }
            wp.remote_reader_incompatible(writer);
        }
    }

    /// A writer went away: unmatch it at every matched reader.
    pub(crate) fn retire_writer(&self, writer: Guid) {
        let mut affected: Vec<(Guid, Arc<ParticipantInner>)> = Vec::new();
        {
            let mut state = self.state.lock();
            state.writers.remove(&writer);
            let readers: Vec<Guid> = state
                .matches
                .iter()
                .filter(|(w, _)| *w == writer)
                .map(|(_, r)| *r)
                .collect();
            state.matches.retain(|(w, _)| *w != writer);
            for reader in readers {
                if let Some(p) = state.participant(&reader.prefix) {
                    affected.push((reader, p));
                }
            }
        }
        for (reader, p) in affected {
            p.remote_writer_unmatched(reader, writer);
        }
    }

    /// A reader went away: unmatch it at every matched writer.
    pub(crate) fn retire_reader(&self, reader: Guid) {
        let mut affected: Vec<(Guid, Arc<ParticipantInner>)> = Vec::new();
        {
            let mut state = self.state.lock();
            state.readers.remove(&reader);
            let writers: Vec<Guid> = state
                .matches
                .iter()
                .filter(|(_, r)| *r == reader)
                .map(|(w, _)| *w)
                .collect();
            state.matches.retain(|(_, r)| *r != reader);
            for writer in writers {
                if let Some(p) = state.participant(&writer.prefix) {
                    affected.push((writer, p));
                }
            }
        }
        for (writer, p) in affected {
            p.remote_reader_unmatched(writer, reader);
        }
    }

    /// Deliver a written sample to every matched reader.
    pub(crate) fn route_data(&self, writer: Guid, payload: &[u8]) {
        for (reader, p) in self.matched_readers_of(writer) {
            p.deliver_data(reader, writer, payload.to_vec());
        }
    }

    /// Deliver a heartbeat to every matched reader. Only reliable
    /// writers have a heartbeat path; whether the heartbeat counts as
    /// an assertion is the receiving monitor's decision.
    pub(crate) fn route_heartbeat(&self, writer: Guid) {
        {
            let state = self.state.lock();
            let reliable = state
                .writers
                .get(&writer)
                .is_some_and(|w| w.reliability.is_reliable());
            if !reliable {
                return;
            }
        }
        for (reader, p) in self.matched_readers_of(writer) {
            p.deliver_heartbeat(reader, writer);
        }
    }

    /// Reliably deliver an encoded liveliness-channel message to every
    /// attached participant, the sender included.
    pub(crate) fn route_assertion(&self, buf: &[u8]) {
        let targets: Vec<Arc<ParticipantInner>> = {
            let state = self.state.lock();
            state.participants.values().filter_map(Weak::upgrade).collect()
        };
        for p in targets {
            p.deliver_assertion(buf);
        }
    }

    fn matched_readers_of(&self, writer: Guid) -> Vec<(Guid, Arc<ParticipantInner>)> {
        let state = self.state.lock();
        state
            .matches
            .iter()
            .filter(|(w, _)| *w == writer)
            .filter_map(|(_, r)| state.participant(&r.prefix).map(|p| (*r, p)))
            .collect()
    }
}

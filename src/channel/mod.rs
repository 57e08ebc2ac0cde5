// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in liveliness channel.
//!
//! Every participant owns one writer/reader pair on a well-known
//! built-in topic over which automatic and manual-by-participant
//! assertions travel. The channel runs RELIABLE (assertions are
//! retried until acknowledged) and VOLATILE (only live assertions
//! matter; nothing is replayed to late joiners).
//!
//! The channel keeps its own mutex and never calls into the endpoint
//! registry or the assertion engine; message construction and
//! duplicate filtering are the only state it owns.

pub mod wire;

pub use wire::{
    AssertionScope, ParticipantMessage, PARTICIPANT_MESSAGE_LEN, SCOPE_AUTOMATIC,
    SCOPE_MANUAL_BY_PARTICIPANT,
};

use crate::core::guid::{
    ENTITYID_PARTICIPANT_MESSAGE_READER, ENTITYID_PARTICIPANT_MESSAGE_WRITER,
};
use crate::core::Guid;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct ChannelState {
    /// Next manual-by-participant counter to emit.
    manual_count: u64,
    /// Highest manual counter seen per remote (prefix, scope).
    last_seen: HashMap<([u8; 12], AssertionScope), u64>,
}

/// Per-participant liveliness channel endpoints and counters.
pub(crate) struct LivelinessChannel {
    prefix: [u8; 12],
    state: Mutex<ChannelState>,
}

impl LivelinessChannel {
    pub fn new(prefix: [u8; 12]) -> Self {
        Self {
            prefix,
            state: Mutex::new(ChannelState::default()),
        }
    }

    pub fn writer_guid(&self) -> Guid {
        Guid::new(self.prefix, ENTITYID_PARTICIPANT_MESSAGE_WRITER)
    }

    pub fn reader_guid(&self) -> Guid {
        Guid::new(self.prefix, ENTITYID_PARTICIPANT_MESSAGE_READER)
    }

    /// Build an automatic-scope assertion for this participant.
    pub fn automatic_message(&self) -> ParticipantMessage {
        ParticipantMessage::automatic(self.prefix)
    }

    /// Build the next manual-by-participant assertion; the counter is
    /// monotonic for the lifetime of the participant.
    pub fn next_manual_message(&self) -> ParticipantMessage {
        let mut state = self.state.lock();
        state.manual_count += 1;
        ParticipantMessage::manual_by_participant(self.prefix, state.manual_count)
    }

    /// Duplicate filter for received assertions. The reliable transport
    /// may redeliver; manual assertions whose counter does not advance
    /// are dropped. Automatic assertions carry no counter and always
    /// pass.
    pub fn accept(&self, msg: &ParticipantMessage) -> bool {
        match msg.scope {
            AssertionScope::Automatic => true,
            AssertionScope::ManualByParticipant => {
                let mut state = self.state.lock();
                let last = state
                    .last_seen
                    .entry((msg.prefix, msg.scope))
                    .or_insert(0);
                if msg.count > *last {
                    *last = msg.count;
                    true
                } else {
                    crate::debug!(
                        "liveliness channel: dropped stale manual assertion {} (last {})",
                        msg.count,
                        *last
                    );
                    false
                }
            }
        }
    }
}

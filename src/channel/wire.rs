// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire format of the built-in liveliness assertion message.
//!
//! Fixed little-endian layout:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 12   | participant prefix |
//! | 12     | 1    | scope: `0x01` automatic, `0x02` manual-by-participant |
//! | 13     | 8    | manual counter (u64 LE, `0` for automatic) |
//!
//! Receivers MUST ignore trailing bytes for forward compatibility.

use crate::qos::LivelinessKind;
use crate::{Error, Result};

/// Scope byte for automatic assertions.
pub const SCOPE_AUTOMATIC: u8 = 0x01;
/// Scope byte for manual-by-participant assertions.
pub const SCOPE_MANUAL_BY_PARTICIPANT: u8 = 0x02;

/// Encoded message length (receivers accept longer buffers).
pub const PARTICIPANT_MESSAGE_LEN: usize = 21;

/// Which writers of the sending participant an assertion covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionScope {
    /// Covers the participant's Automatic writers.
    Automatic,
    /// Covers the participant's ManualByParticipant writers.
    ManualByParticipant,
}

impl AssertionScope {
    /// Does an assertion with this scope count for a writer offering
    /// `kind`? Matching is exact: ManualByTopic writers never assert
    /// through the channel.
    #[must_use]
    pub fn covers(self, kind: LivelinessKind) -> bool {
        match self {
            Self::Automatic => kind == LivelinessKind::Automatic,
            Self::ManualByParticipant => kind == LivelinessKind::ManualByParticipant,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Automatic => SCOPE_AUTOMATIC,
            Self::ManualByParticipant => SCOPE_MANUAL_BY_PARTICIPANT,
        }
    }
}

/// One participant-scoped liveliness assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantMessage {
    /// Prefix of the asserting participant.
    pub prefix: [u8; 12],
    pub scope: AssertionScope,
    /// Monotonic per (participant, scope); `0` for automatic.
    pub count: u64,
}

impl ParticipantMessage {
    #[must_use]
    pub fn automatic(prefix: [u8; 12]) -> Self {
        Self {
            prefix,
            scope: AssertionScope::Automatic,
            count: 0,
        }
    }

    #[must_use]
    pub fn manual_by_participant(prefix: [u8; 12], count: u64) -> Self {
        Self {
            prefix,
            scope: AssertionScope::ManualByParticipant,
            count,
        }
    }

    /// Encode to the fixed wire layout.
    #[must_use]
    pub fn encode(&self) -> [u8; PARTICIPANT_MESSAGE_LEN] {
        let mut buf = [0u8; PARTICIPANT_MESSAGE_LEN];
        buf[0..12].copy_from_slice(&self.prefix);
        buf[12] = self.scope.as_byte();
        buf[13..21].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decode from a received buffer, ignoring trailing bytes.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` on a truncated buffer, `SerializationError` on
    /// an unknown scope byte.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < PARTICIPANT_MESSAGE_LEN {
            return Err(Error::BufferTooSmall);
        }
        let mut prefix = [0u8; 12];
        prefix.copy_from_slice(&buf[0..12]);
        let scope = match buf[12] {
            SCOPE_AUTOMATIC => AssertionScope::Automatic,
            SCOPE_MANUAL_BY_PARTICIPANT => AssertionScope::ManualByParticipant,
            _ => return Err(Error::SerializationError),
        };
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&buf[13..21]);
        Ok(Self {
            prefix,
            scope,
            count: u64::from_le_bytes(count_bytes),
        })
    }
}

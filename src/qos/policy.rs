// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::LivelinessKind;
use std::time::Duration;

/// LIVELINESS QoS policy.
///
/// A writer *offers* a kind, a lease duration, and an announcement
/// period; a reader *requests* a kind and a lease duration (the
/// announcement period is ignored on the reader side).
///
/// # Compatibility (request vs. offered)
///
/// A request is satisfied iff `offered.kind >= requested.kind` under
/// the kind ordering and `offered.lease_duration <=
/// requested.lease_duration`. Equality in both dimensions is
/// compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    /// Maximum interval a reader tolerates between assertions.
    pub lease_duration: Duration,
    /// Maximum interval between consecutive network assertions from
    /// this writer. Must be shorter than a finite lease duration.
    pub announcement_period: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: Self::INFINITE,
            announcement_period: Self::INFINITE,
        }
    }
}

impl Liveliness {
    /// Sentinel meaning "never expires".
    pub const INFINITE: Duration = Duration::from_secs(u64::MAX);

    #[must_use]
    pub fn new(kind: LivelinessKind, lease_duration: Duration) -> Self {
        Self {
            kind,
            lease_duration,
            announcement_period: Self::INFINITE,
        }
    }

    #[must_use]
    pub fn automatic(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::Automatic, lease_duration)
    }

    #[must_use]
    pub fn manual_by_participant(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::ManualByParticipant, lease_duration)
    }

    #[must_use]
    pub fn manual_by_topic(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::ManualByTopic, lease_duration)
    }

    #[must_use]
    pub fn infinite() -> Self {
        Self::default()
    }

    /// Set the announcement period (chainable).
    #[must_use]
    pub fn announcement_period(mut self, period: Duration) -> Self {
        self.announcement_period = period;
        self
    }

    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.lease_duration == Self::INFINITE
    }

    /// RxO check: does this offered policy satisfy `requested`?
    #[must_use]
    pub fn is_compatible_with(&self, requested: &Liveliness) -> bool {
        self.kind >= requested.kind && self.lease_duration <= requested.lease_duration
    }

    /// Validate the policy for endpoint creation. A finite lease
    /// requires a strictly shorter announcement period; otherwise the
    /// writer could not assert in time even in principle.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.lease_duration != Self::INFINITE && self.announcement_period >= self.lease_duration
        {
            return Err(format!(
                "announcement_period ({:?}) must be shorter than lease_duration ({:?})",
                self.announcement_period, self.lease_duration
            ));
        }
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader lease monitor.
//!
//! For every matched writer the monitor keeps a lease deadline and an
//! alive flag. A single expiration heap keyed by deadline drives a
//! single timer entry; when the head fires, every entry whose deadline
//! has passed transitions to not-alive and each affected reader gets
//! one aggregated notification. Heap entries are invalidated lazily:
//! an entry is real only if it still matches the lease's current
//! deadline.
//!
//! What counts as an assertion depends on the kind the writer
//! *offered*:
//!
//! | Offered kind        | Channel msg | Sample | Heartbeat |
//! |---------------------|-------------|--------|-----------|
//! | Automatic           | scope 0x01  | no     | no        |
//! | ManualByParticipant | scope 0x02  | no     | no        |
//! | ManualByTopic       | no          | yes    | reliable readers only |

use crate::channel::ParticipantMessage;
use crate::core::Guid;
use crate::qos::{Liveliness, LivelinessKind};
use crate::registry::{
    invariant, take_changed, take_requested_incompatible, take_subscription_matched, CoreState,
    Ctx, Effect, LeaseEntry, TimerTask,
};
use crate::status::bus::Notification;
use crate::status::QOS_POLICY_ID_LIVELINESS;
use std::cmp::Reverse;
use std::time::Instant;

/// A compatible writer matched this reader: the lease starts alive
/// with a full deadline, and the reader's aggregate counts move.
pub(crate) fn match_writer(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    reader: Guid,
    writer: Guid,
    offered: &Liveliness,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let deadline;
    {
        let Some(rec) = state.readers.get_mut(&reader) else {
            return;
        };
        deadline = now.checked_add(offered.lease_duration);
        rec.leases.insert(
            writer,
            LeaseEntry {
                offered_kind: offered.kind,
                lease: offered.lease_duration,
                deadline,
                alive: true,
            },
        );
        rec.changed.alive_count += 1;
        rec.changed.alive_count_change += 1;
        rec.changed.last_publication_handle = Some(writer);
        rec.matched.total_count += 1;
        rec.matched.total_count_change += 1;
        rec.matched.current_count += 1;
        rec.matched.current_count_change += 1;
        rec.matched.last_publication_handle = Some(writer);
        crate::debug!(
            "liveliness: reader {} on {} matched writer {}",
            reader,
            rec.topic,
            writer
        );

        let listener = rec.listener.clone();
        let matched = take_subscription_matched(rec);
        let changed = take_changed(rec);
        if let Some(listener) = listener {
            effects.push(Effect::Notify(Notification::SubscriptionMatched {
                reader,
                listener: listener.clone(),
                status: matched,
            }));
            effects.push(Effect::Notify(Notification::LivelinessChanged {
                reader,
                listener,
                status: changed,
            }));
        }
    }
    if let Some(at) = deadline {
        state.expirations.push(Reverse((at, reader, writer)));
        rearm_lease_timer(state, ctx);
    }
}

/// A matched writer went away: drop the lease and adjust counts in the
/// same critical section (the heap entry dies with the lease).
pub(crate) fn unmatch_writer(
    state: &mut CoreState,
    reader: Guid,
    writer: Guid,
    effects: &mut Vec<Effect>,
) {
    let Some(rec) = state.readers.get_mut(&reader) else {
        return;
    };
    let Some(entry) = rec.leases.remove(&writer) else {
        return;
    };
    if entry.alive {
        invariant(rec.changed.alive_count >= 1, "alive_count underflow on unmatch");
        rec.changed.alive_count -= 1;
        rec.changed.alive_count_change -= 1;
    } else {
        invariant(
            rec.changed.not_alive_count >= 1,
            "not_alive_count underflow on unmatch",
        );
        rec.changed.not_alive_count -= 1;
        rec.changed.not_alive_count_change -= 1;
    }
    invariant(rec.matched.current_count >= 1, "matched writer underflow");
    rec.matched.current_count -= 1;
    rec.matched.current_count_change -= 1;
    rec.matched.last_publication_handle = Some(writer);

    let listener = rec.listener.clone();
    let matched = take_subscription_matched(rec);
    // The removal is not a liveliness transition; the adjusted counts
    // ride along with the next liveliness delivery.
    let _ = take_changed(rec);
    if let Some(listener) = listener {
        effects.push(Effect::Notify(Notification::SubscriptionMatched {
            reader,
            listener,
            status: matched,
        }));
    }
}

/// A discovered writer offered less than this reader requested.
pub(crate) fn incompatible_writer(state: &mut CoreState, reader: Guid, effects: &mut Vec<Effect>) {
    let Some(rec) = state.readers.get_mut(&reader) else {
        return;
    };
    rec.incompatible.total_count += 1;
    rec.incompatible.total_count_change += 1;
    rec.incompatible.last_policy_id = QOS_POLICY_ID_LIVELINESS;
    let listener = rec.listener.clone();
    let status = take_requested_incompatible(rec);
    if let Some(listener) = listener {
        effects.push(Effect::Notify(Notification::RequestedIncompatibleQos {
            reader,
            listener,
            status,
        }));
    }
}

/// Apply a received assertion to one (reader, writer) lease.
fn assert_pair(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    reader: Guid,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let deadline;
    {
        let Some(rec) = state.readers.get_mut(&reader) else {
            return;
        };
        let Some(entry) = rec.leases.get_mut(&writer) else {
            return;
        };
        deadline = now.checked_add(entry.lease);
        entry.deadline = deadline;
        if !entry.alive {
            entry.alive = true;
            invariant(
                rec.changed.not_alive_count >= 1,
                "not_alive_count underflow on recovery",
            );
            rec.changed.not_alive_count -= 1;
            rec.changed.alive_count += 1;
            rec.changed.alive_count_change += 1;
            rec.changed.not_alive_count_change -= 1;
            rec.changed.last_publication_handle = Some(writer);
            let listener = rec.listener.clone();
            let status = take_changed(rec);
            if let Some(listener) = listener {
                effects.push(Effect::Notify(Notification::LivelinessChanged {
                    reader,
                    listener,
                    status,
                }));
            }
        }
    }
    if let Some(at) = deadline {
        state.expirations.push(Reverse((at, reader, writer)));
        rearm_lease_timer(state, ctx);
    }
}

/// Sample arrived from `writer`: deliver it, and count it as an
/// assertion when the writer offered ManualByTopic.
pub(crate) fn on_data(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    reader: Guid,
    writer: Guid,
    payload: Vec<u8>,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let asserts;
    {
        let Some(rec) = state.readers.get(&reader) else {
            return;
        };
        if let Some(listener) = rec.listener.clone() {
            effects.push(Effect::Notify(Notification::DataAvailable {
                reader,
                listener,
                writer,
                payload,
            }));
        }
        asserts = rec
            .leases
            .get(&writer)
            .is_some_and(|e| e.offered_kind == LivelinessKind::ManualByTopic);
    }
    if asserts {
        assert_pair(state, ctx, reader, writer, now, effects);
    }
}

/// Heartbeat arrived from `writer`. Best-effort readers do not process
/// heartbeats, so a ManualByTopic assertion is invisible to them.
pub(crate) fn on_heartbeat(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    reader: Guid,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let asserts;
    {
        let Some(rec) = state.readers.get(&reader) else {
            return;
        };
        if !rec.reliability.is_reliable() {
            return;
        }
        asserts = rec
            .leases
            .get(&writer)
            .is_some_and(|e| e.offered_kind == LivelinessKind::ManualByTopic);
    }
    if asserts {
        assert_pair(state, ctx, reader, writer, now, effects);
    }
}

/// A liveliness channel message arrived: assert every matched writer
/// of that participant whose offered kind the scope covers, across all
/// local readers.
pub(crate) fn on_channel_message(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    msg: &ParticipantMessage,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let mut pairs: Vec<(Guid, Guid)> = Vec::new();
    for (reader, rec) in &state.readers {
        for (writer, entry) in &rec.leases {
            if writer.prefix == msg.prefix && msg.scope.covers(entry.offered_kind) {
                pairs.push((*reader, *writer));
            }
        }
    }
    for (reader, writer) in pairs {
        assert_pair(state, ctx, reader, writer, now, effects);
    }
}

/// Drop heap entries that no longer reflect a live lease deadline and
/// return the earliest real deadline.
fn prune_head(state: &mut CoreState) -> Option<Instant> {
    while let Some(&Reverse((at, reader, writer))) = state.expirations.peek() {
        let valid = state
            .readers
            .get(&reader)
            .and_then(|rec| rec.leases.get(&writer))
            .is_some_and(|e| e.alive && e.deadline == Some(at));
        if valid {
            return Some(at);
        }
        state.expirations.pop();
    }
    None
}

/// Keep the single lease timer armed at the heap head.
fn rearm_lease_timer(state: &mut CoreState, ctx: &Ctx<'_>) {
    let Some(head) = prune_head(state) else {
        return;
    };
    match state.lease_timer_deadline {
        Some(current) if current <= head => {}
        _ => {
            if let Some(id) = state.lease_timer.take() {
                ctx.timer.cancel(id);
            }
            state.lease_timer = Some(ctx.timer.schedule(head, TimerTask::LeaseCheck));
            state.lease_timer_deadline = Some(head);
        }
    }
}

/// Lease timer fired: expire everything due, emit one aggregated
/// notification per affected reader, re-arm at the new head.
pub(crate) fn on_lease_check(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    state.lease_timer = None;
    state.lease_timer_deadline = None;
    let mut touched: Vec<Guid> = Vec::new();
    loop {
        let Some(&Reverse((at, reader, writer))) = state.expirations.peek() else {
            break;
        };
        if at > now {
            break;
        }
        state.expirations.pop();
        let Some(rec) = state.readers.get_mut(&reader) else {
            continue;
        };
        let Some(entry) = rec.leases.get_mut(&writer) else {
            continue;
        };
        if entry.deadline != Some(at) || !entry.alive {
            continue;
        }
        entry.alive = false;
        entry.deadline = None;
        invariant(rec.changed.alive_count >= 1, "alive_count underflow on expiry");
        rec.changed.alive_count -= 1;
        rec.changed.not_alive_count += 1;
        rec.changed.alive_count_change -= 1;
        rec.changed.not_alive_count_change += 1;
        rec.changed.last_publication_handle = Some(writer);
        crate::debug!("liveliness: reader {} lost writer {}", reader, writer);
        if !touched.contains(&reader) {
            touched.push(reader);
        }
    }
    for reader in touched {
        let Some(rec) = state.readers.get_mut(&reader) else {
            continue;
        };
        let listener = rec.listener.clone();
        let status = take_changed(rec);
        if let Some(listener) = listener {
            effects.push(Effect::Notify(Notification::LivelinessChanged {
                reader,
                listener,
                status,
            }));
        }
    }
    rearm_lease_timer(state, ctx);
}

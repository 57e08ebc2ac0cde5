// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer assertion engine.
//!
//! Three assertion sources feed the engine:
//!
//! 1. The participant-wide automatic tick, firing every
//!    `min(announcement_period)` over Automatic writers.
//! 2. Explicit `assert_liveliness()` calls.
//! 3. Sample writes.
//!
//! Manual assertions refresh writer-side state immediately and are
//! coalesced on the network: if the last network assertion for the
//! (kind, scope) is at least one announcement period old, a fresh one
//! goes out at once; otherwise a single deferred announcement is armed
//! at `last_send + announcement_period`. At most one announcement is
//! in flight per scope at any time.
//!
//! Writer-side loss detection arms on the first assertion: a writer
//! that never asserted cannot lose liveliness. Expiry without a fresh
//! assertion transitions the writer to lost exactly once; the next
//! assertion re-arms the countdown without an event.

use crate::core::Guid;
use crate::qos::{Liveliness, LivelinessKind};
use crate::registry::{take_lost, CoreState, Ctx, Effect, TimerTask};
use crate::status::bus::Notification;
use std::time::Instant;

/// Sample written on `writer`: route the payload and treat the write
/// as an assertion.
pub(crate) fn on_sample_written(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    writer: Guid,
    payload: Vec<u8>,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    if !state.writers.contains_key(&writer) {
        return;
    }
    effects.push(Effect::DeliverData { writer, payload });
    assert_writer(state, ctx, writer, now, effects);
}

/// Explicit `assert_liveliness()`: an assertion with no data payload.
pub(crate) fn assert_liveliness(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    assert_writer(state, ctx, writer, now, effects);
}

fn assert_writer(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let Some(kind) = state.writers.get(&writer).map(|r| r.liveliness.kind) else {
        return;
    };
    match kind {
        // The participant tick keeps automatic writers alive on the
        // network; an explicit assert only refreshes local state.
        LivelinessKind::Automatic => refresh_writer(state, ctx, writer, now),
        LivelinessKind::ManualByParticipant => {
            // One assertion covers every ManualByParticipant writer at
            // this participant.
            let covered: Vec<Guid> = state
                .writers
                .iter()
                .filter(|(_, r)| r.liveliness.kind == LivelinessKind::ManualByParticipant)
                .map(|(g, _)| *g)
                .collect();
            for guid in covered {
                refresh_writer(state, ctx, guid, now);
            }
            schedule_manual_announcement(state, ctx, now, effects);
        }
        LivelinessKind::ManualByTopic => {
            refresh_writer(state, ctx, writer, now);
            schedule_heartbeat(state, ctx, writer, now, effects);
        }
    }
}

/// Refresh a writer's own aliveness and re-arm its loss countdown.
fn refresh_writer(state: &mut CoreState, ctx: &Ctx<'_>, writer: Guid, now: Instant) {
    let Some(rec) = state.writers.get_mut(&writer) else {
        return;
    };
    rec.asserted = true;
    rec.alive = true;
    if let Some(id) = rec.lease_timer.take() {
        ctx.timer.cancel(id);
    }
    rec.lease_deadline = now.checked_add(rec.liveliness.lease_duration);
    if let Some(at) = rec.lease_deadline {
        rec.lease_timer = Some(ctx.timer.schedule(at, TimerTask::WriterLease(writer)));
    }
}

fn schedule_manual_announcement(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let period = state.min_manual_period();
    let due = match (period, state.manual_last_send) {
        (None, _) | (_, None) => true,
        (Some(p), Some(last)) => now.duration_since(last) >= p,
    };
    if due {
        state.manual_last_send = Some(now);
        effects.push(Effect::SendManual);
    } else if state.manual_timer.is_none() {
        // Coalesce: one deferred announcement per scope.
        if let (Some(p), Some(last)) = (period, state.manual_last_send) {
            if let Some(at) = last.checked_add(p) {
                state.manual_timer =
                    Some(ctx.timer.schedule(at, TimerTask::ManualParticipantAnnounce));
            }
        }
    }
}

/// Deferred manual announcement fired.
pub(crate) fn on_manual_announce(state: &mut CoreState, now: Instant, effects: &mut Vec<Effect>) {
    state.manual_timer = None;
    state.manual_last_send = Some(now);
    effects.push(Effect::SendManual);
}

fn schedule_heartbeat(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let Some(rec) = state.writers.get_mut(&writer) else {
        return;
    };
    if !rec.reliability.is_reliable() {
        // Best-effort writers have no heartbeat path; the assertion
        // stays invisible to readers.
        crate::debug!("liveliness: heartbeat suppressed for best-effort writer {writer}");
        return;
    }
    let period = rec.liveliness.announcement_period;
    let due = period == Liveliness::INFINITE
        || match rec.heartbeat_last_send {
            None => true,
            Some(last) => now.duration_since(last) >= period,
        };
    if due {
        rec.heartbeat_last_send = Some(now);
        effects.push(Effect::SendHeartbeat { writer });
    } else if rec.heartbeat_timer.is_none() {
        if let Some(last) = rec.heartbeat_last_send {
            if let Some(at) = last.checked_add(period) {
                rec.heartbeat_timer = Some(ctx.timer.schedule(at, TimerTask::WriterHeartbeat(writer)));
            }
        }
    }
}

/// Deferred heartbeat fired.
pub(crate) fn on_heartbeat_timer(
    state: &mut CoreState,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let Some(rec) = state.writers.get_mut(&writer) else {
        return;
    };
    rec.heartbeat_timer = None;
    rec.heartbeat_last_send = Some(now);
    effects.push(Effect::SendHeartbeat { writer });
}

/// Participant-wide automatic tick: refresh every Automatic writer and
/// emit one participant-scoped assertion.
pub(crate) fn on_automatic_tick(
    state: &mut CoreState,
    ctx: &Ctx<'_>,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    state.automatic_timer = None;
    let automatic: Vec<Guid> = state
        .writers
        .iter()
        .filter(|(_, r)| r.liveliness.kind == LivelinessKind::Automatic)
        .map(|(g, _)| *g)
        .collect();
    if automatic.is_empty() {
        return;
    }
    for guid in automatic {
        refresh_writer(state, ctx, guid, now);
    }
    effects.push(Effect::SendAutomatic);
    refresh_automatic_timer(state, ctx, now);
}

/// Re-arm the automatic tick after the Automatic writer set changed.
pub(crate) fn refresh_automatic_timer(state: &mut CoreState, ctx: &Ctx<'_>, now: Instant) {
    if let Some(id) = state.automatic_timer.take() {
        ctx.timer.cancel(id);
    }
    if let Some(period) = state.min_automatic_period() {
        if let Some(at) = now.checked_add(period) {
            state.automatic_timer = Some(ctx.timer.schedule(at, TimerTask::AutomaticAssert));
        }
    }
}

/// Writer-side lease ran out: one lost transition, one notification.
pub(crate) fn on_writer_lease_expired(
    state: &mut CoreState,
    writer: Guid,
    now: Instant,
    effects: &mut Vec<Effect>,
) {
    let Some(rec) = state.writers.get_mut(&writer) else {
        return;
    };
    rec.lease_timer = None;
    if !rec.asserted || !rec.alive {
        return;
    }
    // A fire raced with a refresh: the deadline moved into the future.
    if rec.lease_deadline.is_some_and(|d| d > now) {
        return;
    }
    rec.alive = false;
    rec.lease_deadline = None;
    rec.lost.total_count += 1;
    rec.lost.total_count_change += 1;
    crate::debug!(
        "liveliness: writer {} on {} lost liveliness (total {})",
        writer,
        rec.topic,
        rec.lost.total_count
    );
    let status = take_lost(rec);
    if let Some(listener) = rec.listener.clone() {
        effects.push(Effect::Notify(Notification::LivelinessLost {
            writer,
            listener,
            status,
        }));
    }
}

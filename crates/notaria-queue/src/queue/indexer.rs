//! Derives `position` and `estimated_wait_minutes` for a tenant's live sessions.
//!
//! Pure functions over a slice; no I/O, no clock.

use std::cmp::Ordering;

use super::domain::{Session, SessionPriority, SessionStatus};
use super::tenant::QueueConfig;

/// Ranking comparator shared by positions and admission order.
pub fn compare(config: &QueueConfig, a: &Session, b: &Session) -> Ordering {
    let tier = |session: &Session| {
        if config.enable_priorities {
            session.priority
        } else {
            SessionPriority::Normal
        }
    };

    tier(b)
        .cmp(&tier(a))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.0.cmp(&b.id.0))
}

/// Sorts `sessions` into queue order and rewrites their derived fields.
///
/// Ranked (WAITING/READY) sessions come first in comparator order with positions
/// `1..=N`; ACTIVE sessions follow ordered by `called_at` and carry no position.
/// A WAITING session's estimate is the service time of everything ranked ahead of
/// it, spread across `max_concurrent_sessions` servers and rounded up.
pub fn reindex(config: &QueueConfig, sessions: &mut [Session]) {
    sessions.sort_by(|a, b| match (a.status.is_ranked(), b.status.is_ranked()) {
        (true, true) => compare(config, a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .called_at
            .cmp(&b.called_at)
            .then_with(|| a.created_at.cmp(&b.created_at)),
    });

    let servers = config.max_concurrent_sessions.max(1);
    let mut position = 0u32;
    let mut minutes_ahead = 0u32;

    for session in sessions.iter_mut() {
        if !session.status.is_ranked() {
            session.position = None;
            session.estimated_wait_minutes = None;
            continue;
        }

        position += 1;
        session.position = Some(position);
        session.estimated_wait_minutes = Some(match session.status {
            SessionStatus::Waiting => minutes_ahead.div_ceil(servers),
            _ => 0,
        });
        minutes_ahead = minutes_ahead.saturating_add(config.estimate_for(session.tramite_type));
    }
}

/// Index of the highest-ranked WAITING session, if any.
pub fn next_waiting(config: &QueueConfig, sessions: &[Session]) -> Option<usize> {
    sessions
        .iter()
        .enumerate()
        .filter(|(_, session)| session.status == SessionStatus::Waiting)
        .min_by(|(_, a), (_, b)| compare(config, a, b))
        .map(|(index, _)| index)
}

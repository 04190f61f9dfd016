//! Session lifecycle transitions.
//!
//! ```text
//! WAITING --admit--> READY --call--> ACTIVE --complete--> COMPLETED
//!    |                 |                |
//!    +--expire/cancel--+--expire/cancel-+--cancel--> EXPIRED / CANCELLED
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{minutes, Session, SessionStatus};
use super::tenant::QueueConfig;

/// Operation requested against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Admit,
    Call,
    Complete,
    Cancel,
    Expire,
}

impl SessionEvent {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admit => "admit",
            Self::Call => "call",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Expire => "expire",
        }
    }
}

impl SessionStatus {
    /// Target status for `event`, or `None` when the transition is not allowed.
    pub const fn next(self, event: SessionEvent) -> Option<SessionStatus> {
        use SessionEvent as E;
        use SessionStatus as S;

        match (self, event) {
            (S::Waiting, E::Admit) => Some(S::Ready),
            (S::Waiting | S::Ready, E::Expire) => Some(S::Expired),
            (S::Waiting | S::Ready | S::Active, E::Cancel) => Some(S::Cancelled),
            (S::Ready, E::Call) => Some(S::Active),
            (S::Active, E::Complete) => Some(S::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedTransition {
    pub from: SessionStatus,
    pub event: SessionEvent,
}

/// Produces the successor record for `event`; the input is left untouched.
pub fn advance(
    session: &Session,
    event: SessionEvent,
    now: DateTime<Utc>,
    config: &QueueConfig,
) -> Result<Session, RejectedTransition> {
    let to = session
        .status
        .next(event)
        .ok_or(RejectedTransition {
            from: session.status,
            event,
        })?;

    let mut next = session.clone();
    next.status = to;
    next.updated_at = now;

    match event {
        SessionEvent::Admit => {
            next.ready_at = Some(now);
            // The READY phase gets its own window, counted from admission.
            next.expires_at = now + minutes(config.ready_timeout_minutes);
            next.estimated_wait_minutes = Some(0);
        }
        SessionEvent::Call => {
            next.called_at = Some(now);
            next.position = None;
            next.estimated_wait_minutes = None;
        }
        SessionEvent::Complete => {
            next.completed_at = Some(now);
        }
        SessionEvent::Cancel | SessionEvent::Expire => {}
    }

    if to.is_terminal() {
        next.position = None;
        next.estimated_wait_minutes = None;
    }

    Ok(next)
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::QueueConfig;

/// Notaría identifier; every queue invariant is scoped to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque session identifier, assigned once at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

/// Category of notarial procedure requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TramiteType {
    Compraventa,
    Testamento,
    PoderNotarial,
    Hipoteca,
    Donacion,
    ConstitucionSociedad,
    Certificacion,
    Otro,
}

impl TramiteType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Compraventa => "compraventa",
            Self::Testamento => "testamento",
            Self::PoderNotarial => "poder_notarial",
            Self::Hipoteca => "hipoteca",
            Self::Donacion => "donacion",
            Self::ConstitucionSociedad => "constitucion_sociedad",
            Self::Certificacion => "certificacion",
            Self::Otro => "otro",
        }
    }
}

/// Lifecycle status of a queued session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    Ready,
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl SessionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Cancelled)
    }

    /// READY and ACTIVE sessions count against `max_concurrent_sessions`.
    pub const fn holds_slot(self) -> bool {
        matches!(self, Self::Ready | Self::Active)
    }

    /// WAITING and READY sessions carry a position.
    pub const fn is_ranked(self) -> bool {
        matches!(self, Self::Waiting | Self::Ready)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordering precedence when the tenant has priorities enabled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl SessionPriority {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Intake payload produced once the client's document upload completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub document_id: String,
    pub client_name: String,
    pub tramite_type: TramiteType,
    #[serde(default)]
    pub priority: SessionPriority,
}

/// A client's place in a notaría's service queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub notaria_id: TenantId,
    pub document_id: String,
    pub client_name: String,
    pub tramite_type: TramiteType,
    pub status: SessionStatus,
    pub priority: SessionPriority,
    /// Derived rank among WAITING/READY sessions; advisory only.
    pub position: Option<u32>,
    /// Derived estimate in minutes; advisory only.
    pub estimated_wait_minutes: Option<u32>,
    pub expires_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn waiting(
        notaria_id: TenantId,
        draft: SessionDraft,
        now: DateTime<Utc>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            notaria_id,
            document_id: draft.document_id,
            client_name: draft.client_name.trim().to_string(),
            tramite_type: draft.tramite_type,
            status: SessionStatus::Waiting,
            priority: draft.priority,
            position: None,
            estimated_wait_minutes: None,
            expires_at: now + minutes(config.session_timeout_minutes),
            ready_at: None,
            called_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_ranked() && now > self.expires_at
    }

    pub fn status_view(&self) -> SessionStatusView {
        SessionStatusView {
            session_id: self.id,
            notaria_id: self.notaria_id.clone(),
            client_name: self.client_name.clone(),
            tramite_type: self.tramite_type.label(),
            status: self.status.label(),
            priority: self.priority.label(),
            position: self.position,
            estimated_wait_minutes: self.estimated_wait_minutes,
            expires_at: self.expires_at,
        }
    }
}

pub(crate) fn minutes(value: u32) -> Duration {
    Duration::minutes(i64::from(value))
}

/// Sanitized representation of a session for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusView {
    pub session_id: SessionId,
    pub notaria_id: TenantId,
    pub client_name: String,
    pub tramite_type: &'static str,
    pub status: &'static str,
    pub priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<u32>,
    pub expires_at: DateTime<Utc>,
}

/// Ordered snapshot of one notaría's live sessions.
#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    pub notaria_id: TenantId,
    pub capacity: u32,
    pub occupied: u32,
    /// WAITING/READY sessions in position order.
    pub ranked: Vec<Session>,
    /// ACTIVE sessions in the order they were called.
    pub active: Vec<Session>,
}

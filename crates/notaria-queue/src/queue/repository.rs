use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Session, SessionId, SessionStatus, TenantId};
use super::tenant::QueueConfig;

/// Durable record of sessions and the queue's recovery point.
///
/// Implementations must give read-after-write consistency within a tenant.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Every session owned by `tenant`, terminal ones included.
    async fn load(&self, tenant: &TenantId) -> Result<Vec<Session>, StoreError>;
    /// Inserts or replaces a single session.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;
    async fn fetch(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("conflicting write")]
    Conflict,
}

/// Source of per-tenant admission parameters.
pub trait TenantConfigProvider: Send + Sync {
    fn get(&self, tenant: &TenantId) -> Option<QueueConfig>;
    fn tenants(&self) -> Vec<TenantId>;
}

/// Notification emitted after a transition has been persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTransition {
    pub session: Session,
    /// `None` when the session was just created.
    pub previous: Option<SessionStatus>,
    pub current: SessionStatus,
    pub at: DateTime<Utc>,
}

/// Outbound hook for logging or push delivery. Failures never roll back a transition.
pub trait EventSink: Send + Sync {
    fn publish(&self, transition: &SessionTransition) -> Result<(), EventSinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

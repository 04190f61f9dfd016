//! Session admission queue for notaría document-processing slots.
//!
//! Clients enter as WAITING, are promoted to READY when one of the notaría's
//! `max_concurrent_sessions` slots frees up, become ACTIVE once called, and end
//! COMPLETED, EXPIRED, or CANCELLED. The [`AdmissionQueue`] drives the state
//! machine per tenant, the [`ExpirationSweeper`] reclaims stalled sessions, and
//! the indexer keeps positions and wait estimates current after every mutation.

pub mod clock;
pub mod domain;
pub mod indexer;
pub mod repository;
pub mod router;
pub mod service;
pub mod state;
pub mod sweeper;
pub mod tenant;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    QueueView, Session, SessionDraft, SessionId, SessionPriority, SessionStatus,
    SessionStatusView, TenantId, TramiteType,
};
pub use repository::{
    EventSink, EventSinkError, SessionStore, SessionTransition, StoreError, TenantConfigProvider,
};
pub use router::queue_router;
pub use service::{AdmissionQueue, ExpiryOutcome, QueueError, DEFAULT_STORE_TIMEOUT};
pub use state::SessionEvent;
pub use sweeper::{ExpirationSweeper, SweepReport};
pub use tenant::{InMemoryTenantConfigs, QueueConfig};

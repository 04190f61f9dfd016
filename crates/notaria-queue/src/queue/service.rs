use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{QueueView, Session, SessionDraft, SessionId, SessionStatus, TenantId};
use super::indexer;
use super::repository::{
    EventSink, SessionStore, SessionTransition, StoreError, TenantConfigProvider,
};
use super::state::{self, SessionEvent};
use super::tenant::QueueConfig;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-notaría admission queue.
///
/// Every mutating operation for a tenant runs under that tenant's async lock, so
/// enqueue, call, complete, cancel, and sweeper-driven expiry never interleave for
/// one notaría while different notarías proceed in parallel. Each transition is
/// written through the [`SessionStore`] before the in-memory ordering changes and
/// before the [`EventSink`] hears about it.
pub struct AdmissionQueue<S, C, E> {
    store: Arc<S>,
    configs: Arc<C>,
    events: Arc<E>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    tenants: Mutex<HashMap<TenantId, Arc<AsyncMutex<TenantQueue>>>>,
    directory: Mutex<HashMap<SessionId, TenantId>>,
}

/// Live (non-terminal) sessions of one tenant, kept in queue order.
#[derive(Debug, Default)]
struct TenantQueue {
    loaded: bool,
    sessions: Vec<Session>,
}

impl TenantQueue {
    fn find(&self, id: &SessionId) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == *id)
    }

    fn snapshot(&self, id: &SessionId) -> Option<Session> {
        self.find(id).map(|index| self.sessions[index].clone())
    }

    fn occupied(&self) -> u32 {
        self.sessions
            .iter()
            .filter(|session| session.status.holds_slot())
            .count() as u32
    }
}

/// Result of one tenant's expiry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryOutcome {
    pub expired: Vec<SessionId>,
    pub admitted: usize,
    pub failures: usize,
}

impl<S, C, E> AdmissionQueue<S, C, E>
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    pub fn new(store: Arc<S>, configs: Arc<C>, events: Arc<E>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            configs,
            events,
            clock,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            tenants: Mutex::new(HashMap::new()),
            directory: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        self.configs.tenants()
    }

    pub fn config_for(&self, tenant: &TenantId) -> Option<QueueConfig> {
        self.configs.get(tenant)
    }

    /// Rebuilds every configured tenant from the store before traffic is accepted.
    pub async fn recover(&self) -> Result<usize, QueueError> {
        let mut restored = 0;
        for tenant in self.configs.tenants() {
            let config = self.config(&tenant)?;
            let queue = self.lock_tenant(&tenant, &config).await?;
            restored += queue.sessions.len();
        }
        info!(restored, "admission queue recovered from store");
        Ok(restored)
    }

    /// Registers a new WAITING session and runs an admission pass.
    pub async fn enqueue(
        &self,
        tenant: &TenantId,
        draft: SessionDraft,
    ) -> Result<Session, QueueError> {
        let config = self.config(tenant)?;
        let mut queue = self.lock_tenant(tenant, &config).await?;

        let now = self.clock.now();
        let session = Session::waiting(tenant.clone(), draft, now, &config);
        self.persist(&session).await?;

        self.register(&session);
        queue.sessions.push(session.clone());
        self.announce(&session, None, now);
        indexer::reindex(&config, &mut queue.sessions);
        self.admit_logged(tenant, &config, &mut queue).await;

        Ok(queue.snapshot(&session.id).unwrap_or(session))
    }

    /// Promotes WAITING sessions while the tenant has free slots.
    pub async fn try_admit(&self, tenant: &TenantId) -> Result<Vec<Session>, QueueError> {
        let config = self.config(tenant)?;
        let mut queue = self.lock_tenant(tenant, &config).await?;
        self.admit_locked(&config, &mut queue).await
    }

    pub async fn call(&self, id: SessionId) -> Result<Session, QueueError> {
        self.transition(id, SessionEvent::Call).await
    }

    pub async fn complete(&self, id: SessionId) -> Result<Session, QueueError> {
        self.transition(id, SessionEvent::Complete).await
    }

    /// Cancelling a session that is already terminal returns it unchanged.
    pub async fn cancel(&self, id: SessionId) -> Result<Session, QueueError> {
        self.transition(id, SessionEvent::Cancel).await
    }

    pub async fn expire(&self, id: SessionId) -> Result<Session, QueueError> {
        self.transition(id, SessionEvent::Expire).await
    }

    pub async fn get(&self, id: SessionId) -> Result<Session, QueueError> {
        let tenant = self.resolve_tenant(&id).await?;
        let config = self.config(&tenant)?;
        let queue = self.lock_tenant(&tenant, &config).await?;
        if let Some(session) = queue.snapshot(&id) {
            return Ok(session);
        }
        drop(queue);

        self.fetch(&id).await?.ok_or(QueueError::NotFound(id))
    }

    pub async fn queue_view(&self, tenant: &TenantId) -> Result<QueueView, QueueError> {
        let config = self.config(tenant)?;
        let queue = self.lock_tenant(tenant, &config).await?;

        let (ranked, active): (Vec<Session>, Vec<Session>) = queue
            .sessions
            .iter()
            .cloned()
            .partition(|session| session.status.is_ranked());

        Ok(QueueView {
            notaria_id: tenant.clone(),
            capacity: config.max_concurrent_sessions,
            occupied: queue.occupied(),
            ranked,
            active,
        })
    }

    /// Expires every WAITING/READY session past its deadline, then fills any free slots.
    pub async fn expire_overdue(&self, tenant: &TenantId) -> Result<ExpiryOutcome, QueueError> {
        let config = self.config(tenant)?;
        let mut queue = self.lock_tenant(tenant, &config).await?;

        let now = self.clock.now();
        let overdue: Vec<SessionId> = queue
            .sessions
            .iter()
            .filter(|session| session.is_overdue(now))
            .map(|session| session.id)
            .collect();

        let mut outcome = ExpiryOutcome::default();
        for id in overdue {
            let Some(index) = queue.find(&id) else {
                continue;
            };
            match self
                .apply_locked(&config, &mut queue, index, SessionEvent::Expire)
                .await
            {
                Ok(_) => outcome.expired.push(id),
                Err(QueueError::InvalidTransition { from, .. }) => {
                    debug!(session_id = %id, %from, "session left the expiring state, skipping");
                }
                Err(err) => {
                    warn!(notaria_id = %tenant, session_id = %id, error = %err, "failed to expire session");
                    outcome.failures += 1;
                }
            }
        }

        // Also picks up slots left idle by an earlier failed admission pass.
        if queue.occupied() < config.max_concurrent_sessions {
            outcome.admitted = self.admit_logged(tenant, &config, &mut queue).await;
        }

        Ok(outcome)
    }

    async fn transition(&self, id: SessionId, event: SessionEvent) -> Result<Session, QueueError> {
        let tenant = self.resolve_tenant(&id).await?;
        let config = self.config(&tenant)?;
        let mut queue = self.lock_tenant(&tenant, &config).await?;

        let Some(index) = queue.find(&id) else {
            return self.settled(id, event).await;
        };

        let (session, freed_slot) = self.apply_locked(&config, &mut queue, index, event).await?;
        if freed_slot {
            self.admit_logged(&tenant, &config, &mut queue).await;
        }

        Ok(queue.snapshot(&id).unwrap_or(session))
    }

    /// Handles operations on sessions that already left the live ordering.
    async fn settled(&self, id: SessionId, event: SessionEvent) -> Result<Session, QueueError> {
        match self.fetch(&id).await? {
            Some(session) if session.status.is_terminal() => {
                if event == SessionEvent::Cancel {
                    debug!(session_id = %id, status = %session.status, "cancel on terminal session ignored");
                    Ok(session)
                } else {
                    Err(QueueError::InvalidTransition {
                        session_id: id,
                        from: session.status,
                        operation: event.label(),
                    })
                }
            }
            _ => Err(QueueError::NotFound(id)),
        }
    }

    /// Applies `event` to the live session at `index`; returns the new record and
    /// whether a READY/ACTIVE slot was released.
    async fn apply_locked(
        &self,
        config: &QueueConfig,
        queue: &mut TenantQueue,
        index: usize,
        event: SessionEvent,
    ) -> Result<(Session, bool), QueueError> {
        let previous = queue.sessions[index].status;
        let now = self.clock.now();
        let next = self.advance(&queue.sessions[index], event, now, config)?;
        self.persist(&next).await?;

        if next.status.is_terminal() {
            queue.sessions.remove(index);
            self.forget(&next.id);
        } else {
            queue.sessions[index] = next.clone();
        }
        self.announce(&next, Some(previous), now);
        indexer::reindex(config, &mut queue.sessions);

        let freed_slot = previous.holds_slot() && !next.status.holds_slot();
        Ok((next, freed_slot))
    }

    async fn admit_locked(
        &self,
        config: &QueueConfig,
        queue: &mut TenantQueue,
    ) -> Result<Vec<Session>, QueueError> {
        let mut admitted = Vec::new();

        while queue.occupied() < config.max_concurrent_sessions {
            let Some(index) = indexer::next_waiting(config, &queue.sessions) else {
                break;
            };
            let (session, _) = self
                .apply_locked(config, queue, index, SessionEvent::Admit)
                .await?;
            admitted.push(session.id);
        }

        Ok(admitted
            .iter()
            .filter_map(|id| queue.snapshot(id))
            .collect())
    }

    /// Admission pass whose failure does not undo the operation that triggered it;
    /// the next capacity event or sweep retries.
    async fn admit_logged(
        &self,
        tenant: &TenantId,
        config: &QueueConfig,
        queue: &mut TenantQueue,
    ) -> usize {
        match self.admit_locked(config, queue).await {
            Ok(admitted) => admitted.len(),
            Err(err) => {
                warn!(notaria_id = %tenant, error = %err, "admission pass failed");
                0
            }
        }
    }

    fn advance(
        &self,
        session: &Session,
        event: SessionEvent,
        now: DateTime<Utc>,
        config: &QueueConfig,
    ) -> Result<Session, QueueError> {
        state::advance(session, event, now, config).map_err(|rejected| {
            QueueError::InvalidTransition {
                session_id: session.id,
                from: rejected.from,
                operation: rejected.event.label(),
            }
        })
    }

    fn config(&self, tenant: &TenantId) -> Result<QueueConfig, QueueError> {
        self.configs
            .get(tenant)
            .ok_or_else(|| QueueError::TenantUnknown(tenant.clone()))
    }

    /// Acquires the tenant's section, loading its live sessions on first use.
    async fn lock_tenant(
        &self,
        tenant: &TenantId,
        config: &QueueConfig,
    ) -> Result<OwnedMutexGuard<TenantQueue>, QueueError> {
        let slot = {
            let mut tenants = self.tenants.lock().expect("tenant map mutex poisoned");
            tenants.entry(tenant.clone()).or_default().clone()
        };
        let mut queue = slot.lock_owned().await;

        if !queue.loaded {
            let stored = self.guarded(self.store.load(tenant)).await?;
            queue.sessions = stored
                .into_iter()
                .filter(|session| !session.status.is_terminal() && session.notaria_id == *tenant)
                .collect();
            for session in &queue.sessions {
                self.register(session);
            }
            queue.loaded = true;
            info!(notaria_id = %tenant, live = queue.sessions.len(), "tenant queue loaded");
        }

        // Config may have been hot-reloaded since the last operation.
        indexer::reindex(config, &mut queue.sessions);
        Ok(queue)
    }

    async fn resolve_tenant(&self, id: &SessionId) -> Result<TenantId, QueueError> {
        let known = self
            .directory
            .lock()
            .expect("session directory mutex poisoned")
            .get(id)
            .cloned();
        if let Some(tenant) = known {
            return Ok(tenant);
        }

        self.fetch(id)
            .await?
            .map(|session| session.notaria_id)
            .ok_or(QueueError::NotFound(*id))
    }

    fn register(&self, session: &Session) {
        self.directory
            .lock()
            .expect("session directory mutex poisoned")
            .insert(session.id, session.notaria_id.clone());
    }

    fn forget(&self, id: &SessionId) {
        self.directory
            .lock()
            .expect("session directory mutex poisoned")
            .remove(id);
    }

    async fn persist(&self, session: &Session) -> Result<(), QueueError> {
        self.guarded(self.store.save(session)).await
    }

    async fn fetch(&self, id: &SessionId) -> Result<Option<Session>, QueueError> {
        self.guarded(self.store.fetch(id)).await
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, QueueError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(QueueError::PersistenceFailure),
            Err(_) => Err(QueueError::PersistenceFailure(StoreError::Timeout(
                self.store_timeout,
            ))),
        }
    }

    fn announce(&self, session: &Session, previous: Option<SessionStatus>, at: DateTime<Utc>) {
        info!(
            notaria_id = %session.notaria_id,
            session_id = %session.id,
            from = previous.map(SessionStatus::label).unwrap_or("new"),
            to = session.status.label(),
            position = ?session.position,
            "session transition"
        );

        let transition = SessionTransition {
            session: session.clone(),
            previous,
            current: session.status,
            at,
        };
        if let Err(err) = self.events.publish(&transition) {
            warn!(session_id = %session.id, error = %err, "event sink rejected transition");
        }
    }
}

/// Error raised by the admission queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("notaría '{0}' has no queue configuration")]
    TenantUnknown(TenantId),
    #[error("cannot {operation} session {session_id} while it is {from}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionStatus,
        operation: &'static str,
    },
    #[error("session persistence failed: {0}")]
    PersistenceFailure(#[from] StoreError),
    #[error("session {0} not found")]
    NotFound(SessionId),
}

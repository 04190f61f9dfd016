use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::queue::{
    AdmissionQueue, EventSink, EventSinkError, InMemoryTenantConfigs, ManualClock, QueueConfig,
    Session, SessionDraft, SessionId, SessionPriority, SessionStore, SessionTransition,
    StoreError, TenantId, TramiteType,
};

pub(super) type TestQueue = AdmissionQueue<MemoryStore, InMemoryTenantConfigs, RecordingSink>;

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid start time")
}

pub(super) fn notaria() -> TenantId {
    TenantId::from("notaria-001")
}

pub(super) fn queue_config(max_concurrent_sessions: u32) -> QueueConfig {
    QueueConfig {
        max_concurrent_sessions,
        session_timeout_minutes: 30,
        ready_timeout_minutes: 10,
        estimated_time_per_tramite: 15,
        ..QueueConfig::default()
    }
}

pub(super) fn draft(client_name: &str, priority: SessionPriority) -> SessionDraft {
    SessionDraft {
        document_id: format!("doc-{}", client_name.to_ascii_lowercase()),
        client_name: client_name.to_string(),
        tramite_type: TramiteType::Compraventa,
        priority,
    }
}

pub(super) struct Fixture {
    pub(super) queue: Arc<TestQueue>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) configs: Arc<InMemoryTenantConfigs>,
    pub(super) sink: Arc<RecordingSink>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn build_queue(config: QueueConfig) -> Fixture {
    build_queue_with_store(config, Arc::new(MemoryStore::default()))
}

pub(super) fn build_queue_with_store(config: QueueConfig, store: Arc<MemoryStore>) -> Fixture {
    let configs = Arc::new(InMemoryTenantConfigs::new([(notaria(), config)]));
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ManualClock::new(t0()));
    let queue = Arc::new(AdmissionQueue::new(
        store.clone(),
        configs.clone(),
        sink.clone(),
        clock.clone(),
    ));
    Fixture {
        queue,
        store,
        configs,
        sink,
        clock,
    }
}

#[derive(Default)]
pub(super) struct MemoryStore {
    records: Mutex<HashMap<SessionId, Session>>,
    fail_saves: AtomicBool,
    failing_tenant: Mutex<Option<TenantId>>,
    failing_attempt: AtomicUsize,
    attempts: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub(super) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub(super) fn fail_saves_for(&self, tenant: TenantId) {
        *self.failing_tenant.lock().expect("store mutex poisoned") = Some(tenant);
    }

    /// Fails only the `attempt`-th call to `save` (1-based).
    pub(super) fn fail_save_attempt(&self, attempt: usize) {
        self.failing_attempt.store(attempt, Ordering::SeqCst);
    }

    pub(super) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(super) fn stored(&self, id: &SessionId) -> Option<Session> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, tenant: &TenantId) -> Result<Vec<Session>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|session| session.notaria_id == *tenant)
            .cloned()
            .collect())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_attempt.load(Ordering::SeqCst) == attempt {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        let failing = self
            .failing_tenant
            .lock()
            .expect("store mutex poisoned")
            .clone();
        if failing.as_ref() == Some(&session.notaria_id) {
            return Err(StoreError::Unavailable("shard offline".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn fetch(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.stored(id))
    }
}

/// Store whose writes never finish inside the queue's timeout.
pub(super) struct StalledStore {
    pub(super) delay: Duration,
}

#[async_trait]
impl SessionStore for StalledStore {
    async fn load(&self, _tenant: &TenantId) -> Result<Vec<Session>, StoreError> {
        Ok(Vec::new())
    }

    async fn save(&self, _session: &Session) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn fetch(&self, _id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(None)
    }
}

#[derive(Default)]
pub(super) struct RecordingSink {
    events: Mutex<Vec<SessionTransition>>,
    reject: AtomicBool,
}

impl RecordingSink {
    pub(super) fn transitions(&self) -> Vec<SessionTransition> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub(super) fn reject_all(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, transition: &SessionTransition) -> Result<(), EventSinkError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(EventSinkError::Transport("push gateway down".to_string()));
        }
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(transition.clone());
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

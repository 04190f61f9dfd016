use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use notaria_queue::queue::{
    EventSink, EventSinkError, Session, SessionId, SessionStore, SessionTransition, StoreError,
    TenantId,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local session table; contents are lost on restart.
#[derive(Default, Clone)]
pub(crate) struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<SessionId, Session>>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, tenant: &TenantId) -> Result<Vec<Session>, StoreError> {
        let guard = self.records.lock().expect("session store mutex poisoned");
        Ok(guard
            .values()
            .filter(|session| session.notaria_id == *tenant)
            .cloned()
            .collect())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("session store mutex poisoned");
        guard.insert(session.id, session.clone());
        Ok(())
    }

    async fn fetch(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let guard = self.records.lock().expect("session store mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

/// Event sink that only emits a debug record; real notification channels plug in here.
#[derive(Default, Clone)]
pub(crate) struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, transition: &SessionTransition) -> Result<(), EventSinkError> {
        debug!(
            session_id = %transition.session.id,
            status = transition.current.label(),
            at = %transition.at,
            "session event published"
        );
        Ok(())
    }
}

/// Sink that keeps every transition so the demo can print the event stream.
#[derive(Default, Clone)]
pub(crate) struct RecordingEventSink {
    events: Arc<Mutex<Vec<SessionTransition>>>,
}

impl EventSink for RecordingEventSink {
    fn publish(&self, transition: &SessionTransition) -> Result<(), EventSinkError> {
        let mut guard = self.events.lock().expect("event mutex poisoned");
        guard.push(transition.clone());
        Ok(())
    }
}

impl RecordingEventSink {
    pub(crate) fn drain(&self) -> Vec<SessionTransition> {
        std::mem::take(&mut *self.events.lock().expect("event mutex poisoned"))
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{SessionDraft, SessionId, SessionStatusView, TenantId};
use super::repository::{EventSink, SessionStore, TenantConfigProvider};
use super::service::{AdmissionQueue, QueueError};
use super::state::SessionEvent;

/// Router builder exposing the queue's public operations over HTTP.
pub fn queue_router<S, C, E>(queue: Arc<AdmissionQueue<S, C, E>>) -> Router
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/notarias/:notaria_id/sessions",
            post(enqueue_handler::<S, C, E>),
        )
        .route(
            "/api/v1/notarias/:notaria_id/queue",
            get(queue_view_handler::<S, C, E>),
        )
        .route(
            "/api/v1/notarias/:notaria_id/admit",
            post(admit_handler::<S, C, E>),
        )
        .route(
            "/api/v1/sessions/:session_id",
            get(session_handler::<S, C, E>),
        )
        .route(
            "/api/v1/sessions/:session_id/call",
            post(call_handler::<S, C, E>),
        )
        .route(
            "/api/v1/sessions/:session_id/complete",
            post(complete_handler::<S, C, E>),
        )
        .route(
            "/api/v1/sessions/:session_id/cancel",
            post(cancel_handler::<S, C, E>),
        )
        .route(
            "/api/v1/sessions/:session_id/expire",
            post(expire_handler::<S, C, E>),
        )
        .with_state(queue)
}

pub(crate) fn error_response(error: QueueError) -> Response {
    let status = match &error {
        QueueError::TenantUnknown(_) | QueueError::NotFound(_) => StatusCode::NOT_FOUND,
        QueueError::InvalidTransition { .. } => StatusCode::CONFLICT,
        QueueError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn parse_session_id(raw: &str) -> Result<SessionId, Response> {
    raw.parse::<SessionId>().map_err(|_| {
        let payload = json!({
            "error": format!("'{raw}' is not a valid session id"),
        });
        (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
    })
}

pub(crate) async fn enqueue_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(notaria_id): Path<String>,
    axum::Json(draft): axum::Json<SessionDraft>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    match queue.enqueue(&TenantId(notaria_id), draft).await {
        Ok(session) => (StatusCode::CREATED, axum::Json(session.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn queue_view_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(notaria_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    match queue.queue_view(&TenantId(notaria_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn admit_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(notaria_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    match queue.try_admit(&TenantId(notaria_id)).await {
        Ok(admitted) => {
            let views: Vec<SessionStatusView> =
                admitted.iter().map(|session| session.status_view()).collect();
            (StatusCode::OK, axum::Json(json!({ "admitted": views }))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn session_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match queue.get(id).await {
        Ok(session) => (StatusCode::OK, axum::Json(session.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

async fn transition<S, C, E>(
    queue: Arc<AdmissionQueue<S, C, E>>,
    session_id: String,
    event: SessionEvent,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let result = match event {
        SessionEvent::Call => queue.call(id).await,
        SessionEvent::Complete => queue.complete(id).await,
        SessionEvent::Cancel => queue.cancel(id).await,
        SessionEvent::Expire => queue.expire(id).await,
        SessionEvent::Admit => {
            let payload = json!({ "error": "sessions are admitted per notaría" });
            return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
        }
    };
    match result {
        Ok(session) => (StatusCode::OK, axum::Json(session.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn call_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    transition(queue, session_id, SessionEvent::Call).await
}

pub(crate) async fn complete_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    transition(queue, session_id, SessionEvent::Complete).await
}

pub(crate) async fn cancel_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    transition(queue, session_id, SessionEvent::Cancel).await
}

pub(crate) async fn expire_handler<S, C, E>(
    State(queue): State<Arc<AdmissionQueue<S, C, E>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    transition(queue, session_id, SessionEvent::Expire).await
}

use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::queue::router::{call_handler, cancel_handler, session_handler};
use crate::queue::{queue_router, SessionId, SessionPriority};

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn enqueue_route_creates_ready_session() {
    let fixture = build_queue(queue_config(1));
    let router = queue_router(fixture.queue.clone());

    let response = router
        .oneshot(post_json(
            "/api/v1/notarias/notaria-001/sessions",
            json!({
                "document_id": "doc-77",
                "client_name": "Ana Torres",
                "tramite_type": "testamento",
                "priority": "HIGH"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["priority"], "high");
    assert_eq!(body["tramite_type"], "testamento");
    assert_eq!(body["notaria_id"], "notaria-001");
    assert_eq!(body["position"], 1);
    assert_eq!(body["estimated_wait_minutes"], 0);
}

#[tokio::test]
async fn enqueue_route_defaults_priority_to_normal() {
    let fixture = build_queue(queue_config(1));
    let router = queue_router(fixture.queue.clone());

    let response = router
        .oneshot(post_json(
            "/api/v1/notarias/notaria-001/sessions",
            json!({
                "document_id": "doc-78",
                "client_name": "Luis Vega",
                "tramite_type": "poder_notarial"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["priority"], "normal");
}

#[tokio::test]
async fn enqueue_route_rejects_unknown_notaria() {
    let fixture = build_queue(queue_config(1));
    let router = queue_router(fixture.queue.clone());

    let response = router
        .oneshot(post_json(
            "/api/v1/notarias/notaria-999/sessions",
            json!({
                "document_id": "doc-1",
                "client_name": "Ana",
                "tramite_type": "otro"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("notaria-999"));
}

#[tokio::test]
async fn queue_route_lists_ranked_and_active_sessions() {
    let fixture = build_queue(queue_config(1));
    let first = fixture
        .queue
        .enqueue(&notaria(), draft("Ana", SessionPriority::Normal))
        .await
        .unwrap();
    fixture.queue.call(first.id).await.unwrap();
    fixture
        .queue
        .enqueue(&notaria(), draft("Beto", SessionPriority::Normal))
        .await
        .unwrap();

    let response = queue_router(fixture.queue.clone())
        .oneshot(
            Request::get("/api/v1/notarias/notaria-001/queue")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["capacity"], 1);
    assert_eq!(body["occupied"], 1);
    assert_eq!(body["ranked"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["ranked"][0]["client_name"], "Beto");
    assert_eq!(body["ranked"][0]["status"], "WAITING");
    assert_eq!(body["active"][0]["client_name"], "Ana");
}

#[tokio::test]
async fn admit_route_reports_promoted_sessions() {
    let fixture = build_queue(queue_config(1));
    let first = fixture
        .queue
        .enqueue(&notaria(), draft("Ana", SessionPriority::Normal))
        .await
        .unwrap();
    fixture
        .queue
        .enqueue(&notaria(), draft("Beto", SessionPriority::Normal))
        .await
        .unwrap();

    // Capacity grows, so a manual admission pass has room for Beto.
    fixture.configs.upsert(notaria(), queue_config(2));

    let response = queue_router(fixture.queue.clone())
        .oneshot(post_empty("/api/v1/notarias/notaria-001/admit"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let admitted = body["admitted"].as_array().cloned().unwrap_or_default();
    assert_eq!(admitted.len(), 1);
    assert_eq!(admitted[0]["client_name"], "Beto");
    assert_eq!(admitted[0]["status"], "ready");
    assert_ne!(admitted[0]["session_id"], json!(first.id.to_string()));
}

#[tokio::test]
async fn call_route_conflicts_for_waiting_session() {
    let fixture = build_queue(queue_config(1));
    fixture
        .queue
        .enqueue(&notaria(), draft("Ana", SessionPriority::Normal))
        .await
        .unwrap();
    let waiting = fixture
        .queue
        .enqueue(&notaria(), draft("Beto", SessionPriority::Normal))
        .await
        .unwrap();

    let response = call_handler(State(fixture.queue.clone()), Path(waiting.id.to_string())).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("waiting"));
}

#[tokio::test]
async fn complete_route_frees_the_slot() {
    let fixture = build_queue(queue_config(1));
    let first = fixture
        .queue
        .enqueue(&notaria(), draft("Ana", SessionPriority::Normal))
        .await
        .unwrap();
    let second = fixture
        .queue
        .enqueue(&notaria(), draft("Beto", SessionPriority::Normal))
        .await
        .unwrap();
    let router = queue_router(fixture.queue.clone());

    let called = router
        .clone()
        .oneshot(post_empty(&format!("/api/v1/sessions/{}/call", first.id)))
        .await
        .unwrap();
    assert_eq!(called.status(), StatusCode::OK);
    assert_eq!(read_json_body(called).await["status"], "active");

    let completed = router
        .clone()
        .oneshot(post_empty(&format!("/api/v1/sessions/{}/complete", first.id)))
        .await
        .unwrap();
    assert_eq!(completed.status(), StatusCode::OK);
    assert_eq!(read_json_body(completed).await["status"], "completed");

    let promoted = router
        .oneshot(
            Request::get(format!("/api/v1/sessions/{}", second.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(promoted.status(), StatusCode::OK);
    assert_eq!(read_json_body(promoted).await["status"], "ready");
}

#[tokio::test]
async fn cancel_route_is_idempotent() {
    let fixture = build_queue(queue_config(1));
    let session = fixture
        .queue
        .enqueue(&notaria(), draft("Ana", SessionPriority::Normal))
        .await
        .unwrap();

    for _ in 0..2 {
        let response =
            cancel_handler(State(fixture.queue.clone()), Path(session.id.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json_body(response).await["status"], "cancelled");
    }
}

#[tokio::test]
async fn expire_route_rejects_active_session() {
    let fixture = build_queue(queue_config(1));
    let session = fixture
        .queue
        .enqueue(&notaria(), draft("Ana", SessionPriority::Normal))
        .await
        .unwrap();
    fixture.queue.call(session.id).await.unwrap();

    let response = queue_router(fixture.queue.clone())
        .oneshot(post_empty(&format!("/api/v1/sessions/{}/expire", session.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn session_route_returns_not_found_for_unknown_id() {
    let fixture = build_queue(queue_config(1));

    let response = session_handler(
        State(fixture.queue.clone()),
        Path(SessionId::generate().to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_route_rejects_malformed_id() {
    let fixture = build_queue(queue_config(1));

    let response = queue_router(fixture.queue.clone())
        .oneshot(
            Request::get("/api/v1/sessions/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("not-a-uuid"));
}

#[tokio::test]
async fn persistence_failure_maps_to_service_unavailable() {
    let fixture = build_queue(queue_config(1));
    fixture.store.fail_saves(true);

    let response = queue_router(fixture.queue.clone())
        .oneshot(post_json(
            "/api/v1/notarias/notaria-001/sessions",
            json!({
                "document_id": "doc-1",
                "client_name": "Ana",
                "tramite_type": "hipoteca"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

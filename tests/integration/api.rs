//! API integration tests.
//!
//! These tests drive the router directly with `oneshot` requests.

use crate::common::insert_due_task;

use hookrun::api::{ApiState, build_router, create_api_state};
use hookrun::{InMemoryStorage, Scheduler, Storage};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_state(storage: Arc<InMemoryStorage>) -> ApiState<InMemoryStorage> {
    create_api_state(Arc::new(Scheduler::with_storage(storage)))
}

fn replay_request(task_id: i64, dlq_id: i64) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/tasks/{}/dlq/{}/replay", task_id, dlq_id))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Test: Health endpoint responds with status ok.
#[tokio::test]
async fn test_health_endpoint() {
    let router = build_router(create_test_state(Arc::new(InMemoryStorage::new())));

    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Test: Scheduler state reflects whether the loop was started.
#[tokio::test]
async fn test_scheduler_state_endpoint() {
    let scheduler = Arc::new(
        Scheduler::with_storage(Arc::new(InMemoryStorage::new()))
            .with_poll_interval(std::time::Duration::from_secs(60)),
    );
    let router = build_router(create_api_state(Arc::clone(&scheduler)));
    let request = || {
        Request::builder()
            .uri("/api/scheduler/state")
            .body(Body::empty())
            .unwrap()
    };

    let json = json_body(router.clone().oneshot(request()).await.unwrap()).await;
    assert_eq!(json["state"], "not_started");
    assert_eq!(json["is_running"], false);

    let handle = scheduler.start().unwrap();
    let json = json_body(router.clone().oneshot(request()).await.unwrap()).await;
    assert_eq!(json["state"], "running");
    assert_eq!(json["is_running"], true);

    handle.shutdown().await.unwrap();
    let json = json_body(router.oneshot(request()).await.unwrap()).await;
    assert_eq!(json["state"], "stopped");
}

/// Test: Replaying an entry returns the outcome and consumes the entry.
#[tokio::test]
async fn test_replay_endpoint_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let entry = storage
        .append_dead_letter(task.id, "HTTP 500".to_string())
        .await
        .unwrap();
    let router = build_router(create_test_state(Arc::clone(&storage)));

    let response = router
        .oneshot(replay_request(task.id.get(), entry.id.get()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["response_code"], 201);
    assert!(json["error"].is_null());
    assert!(json["latency_ms"].is_u64());

    assert!(storage.list_dead_letters(task.id).await.unwrap().is_empty());
    assert_eq!(storage.list_runs(task.id, 10).await.unwrap().len(), 1);
}

/// Test: A failed replay is still a 200 with the failure described.
#[tokio::test]
async fn test_replay_endpoint_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let entry = storage
        .append_dead_letter(task.id, "HTTP 503".to_string())
        .await
        .unwrap();
    let router = build_router(create_test_state(Arc::clone(&storage)));

    let response = router
        .oneshot(replay_request(task.id.get(), entry.id.get()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["response_code"], 503);
    assert_eq!(json["error"], "HTTP 503 Service Unavailable");
}

/// Test: Unknown entries and entries of another task are 404s.
#[tokio::test]
async fn test_replay_endpoint_not_found() {
    let storage = Arc::new(InMemoryStorage::new());
    let owner = insert_due_task(&*storage, "http://127.0.0.1:9/").await;
    let other = insert_due_task(&*storage, "http://127.0.0.1:9/").await;
    let entry = storage
        .append_dead_letter(owner.id, "boom".to_string())
        .await
        .unwrap();
    let router = build_router(create_test_state(Arc::clone(&storage)));

    let response = router
        .clone()
        .oneshot(replay_request(owner.id.get(), 9999))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["error"].is_string());

    let response = router
        .oneshot(replay_request(other.id.get(), entry.id.get()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(storage.list_dead_letters(owner.id).await.unwrap().len(), 1);
}

/// Test: Non-numeric ids are rejected by the path extractor.
#[tokio::test]
async fn test_replay_endpoint_bad_path() {
    let router = build_router(create_test_state(Arc::new(InMemoryStorage::new())));

    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks/abc/dlq/1/replay")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

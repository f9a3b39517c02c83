//! Scheduling integration tests.
//!
//! These tests run the real polling loop against a local HTTP endpoint.

use crate::common::{insert_due_task, wait_for_runs};

use chrono::Utc;
use hookrun::{
    EngineConfig, HttpMethod, InMemoryStorage, NewTask, RetryPolicy, RunStatus, Scheduler,
    SchedulerState, Storage,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test: The loop calls a due task once and records a successful run.
#[tokio::test]
async fn test_due_task_is_called_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ping"))
        .and(header("x-source", "hookrun"))
        .and(body_string("hello"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = storage
        .insert_task(
            NewTask::new(format!("{}/ping", server.uri()))
                .with_method(HttpMethod::Post)
                .with_headers_encoded(r#"{"X-Source":"hookrun"}"#)
                .with_body("hello")
                .with_schedule("@yearly")
                .with_created_at(Utc::now() - chrono::Duration::days(400)),
        )
        .await
        .unwrap();

    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_poll_interval(Duration::from_millis(50));
    let handle = scheduler.start().unwrap();

    let runs = wait_for_runs(&*storage, task.id, 1, Duration::from_secs(5)).await;
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].status_code, Some(200));

    // Several more polls happen, but the fresh run pushed the next
    // occurrence into the future.
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(storage.list_runs(task.id, 10).await.unwrap().len(), 1);
    assert_eq!(scheduler.state().await, SchedulerState::Stopped);
}

/// Test: Disabled and unscheduled tasks are never called.
#[tokio::test]
async fn test_disabled_and_manual_tasks_are_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let past = Utc::now() - chrono::Duration::hours(1);
    let disabled = storage
        .insert_task(
            NewTask::new(server.uri())
                .with_schedule("* * * * *")
                .with_enabled(false)
                .with_created_at(past),
        )
        .await
        .unwrap();
    let manual = storage
        .insert_task(NewTask::new(server.uri()).with_created_at(past))
        .await
        .unwrap();

    let scheduler = Scheduler::with_storage(Arc::clone(&storage));
    assert!(scheduler.poll_once(Utc::now()).await.is_empty());
    scheduler.wait_idle().await;

    assert!(storage.list_runs(disabled.id, 10).await.unwrap().is_empty());
    assert!(storage.list_runs(manual.id, 10).await.unwrap().is_empty());
}

/// Test: One bad task does not stop the others from being dispatched.
#[tokio::test]
async fn test_bad_cron_does_not_block_other_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    storage
        .insert_task(
            NewTask::new(server.uri())
                .with_schedule("61 * * * *")
                .with_created_at(Utc::now() - chrono::Duration::hours(1)),
        )
        .await
        .unwrap();
    let good = insert_due_task(&*storage, server.uri()).await;

    let scheduler = Scheduler::with_storage(Arc::clone(&storage));
    let dispatched = scheduler.poll_once(Utc::now()).await;
    scheduler.wait_idle().await;

    assert_eq!(dispatched, vec![good.id]);
    assert_eq!(storage.list_runs(good.id, 10).await.unwrap().len(), 1);
}

/// Test: A slow sequence is never overlapped by a second dispatch.
#[tokio::test]
async fn test_slow_task_is_not_dispatched_concurrently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_retry_policy(RetryPolicy::none());

    assert_eq!(scheduler.poll_once(Utc::now()).await, vec![task.id]);
    assert!(scheduler.poll_once(Utc::now()).await.is_empty());
    assert!(scheduler.poll_once(Utc::now()).await.is_empty());

    scheduler.wait_idle().await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

/// Test: The disable-worker setting keeps the loop from starting.
#[tokio::test]
async fn test_disable_worker_from_config() {
    let mut config = EngineConfig::default();
    config
        .apply_env(|key| (key == "DISABLE_WORKER").then(|| "1".to_string()))
        .unwrap();

    let scheduler = Scheduler::new(InMemoryStorage::new()).with_config(&config);

    assert!(scheduler.start().is_none());
    assert!(scheduler.handle().is_none());
    assert_eq!(scheduler.state().await, SchedulerState::NotStarted);
}

/// Test: The loop works the same over SQLite.
#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_loop_over_sqlite_storage() {
    use hookrun::SqliteStorage;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let storage = Arc::new(
        SqliteStorage::new(temp_dir.path().join("hookrun.db"))
            .await
            .unwrap(),
    );
    let task = insert_due_task(&*storage, server.uri()).await;

    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_poll_interval(Duration::from_millis(50));
    let handle = scheduler.start().unwrap();

    let runs = wait_for_runs(&*storage, task.id, 1, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(runs[0].status, RunStatus::Success);
    let last = storage.last_run(task.id).await.unwrap().unwrap();
    assert_eq!(last.id, runs[0].id);
}

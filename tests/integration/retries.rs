//! Retry and dead-letter integration tests.
//!
//! These tests drive full retry sequences against a local HTTP endpoint.

use crate::common::{insert_due_task, wait_for_dead_letter, wait_for_runs};

use chrono::Utc;
use hookrun::testing::{RecordingHandler, ScriptedExecutor};
use hookrun::{Event, EventBus, InMemoryStorage, RetryPolicy, RunStatus, Scheduler, Storage};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, vec![Duration::from_millis(10)])
}

/// Test: A task that keeps failing ends in exactly one dead-letter entry.
#[tokio::test]
async fn test_persistent_failure_is_dead_lettered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let scheduler = Scheduler::with_storage(Arc::clone(&storage)).with_retry_policy(fast_policy(2));

    scheduler.poll_once(Utc::now()).await;
    let entry = wait_for_dead_letter(&*storage, task.id, Duration::from_secs(5)).await;
    scheduler.wait_idle().await;

    assert_eq!(entry.error, "HTTP 500 Internal Server Error");
    let runs = storage.list_runs(task.id, 10).await.unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.status == RunStatus::Failure));
    assert!(runs.iter().all(|r| r.status_code == Some(500)));
    assert_eq!(storage.list_dead_letters(task.id).await.unwrap().len(), 1);
}

/// Test: A task that recovers within its budget is not dead-lettered.
#[tokio::test]
async fn test_recovery_within_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let scheduler = Scheduler::with_storage(Arc::clone(&storage)).with_retry_policy(fast_policy(3));

    scheduler.poll_once(Utc::now()).await;
    scheduler.wait_idle().await;

    let runs = storage.list_runs(task.id, 10).await.unwrap();
    let codes: Vec<_> = runs.iter().map(|r| r.status_code).collect();
    assert_eq!(codes, vec![Some(200), Some(503), Some(503)]);
    assert!(storage.list_dead_letters(task.id).await.unwrap().is_empty());

    // The newest run is the success, so it is the next baseline.
    let last = storage.last_run(task.id).await.unwrap().unwrap();
    assert_eq!(last.status, RunStatus::Success);
}

/// Test: An unreachable endpoint fails without a status code.
#[tokio::test]
async fn test_unreachable_endpoint_records_transport_errors() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, url).await;
    let scheduler = Scheduler::with_storage(Arc::clone(&storage)).with_retry_policy(fast_policy(1));

    scheduler.poll_once(Utc::now()).await;
    wait_for_dead_letter(&*storage, task.id, Duration::from_secs(5)).await;
    scheduler.wait_idle().await;

    let runs = wait_for_runs(&*storage, task.id, 2, Duration::from_secs(1)).await;
    assert!(runs.iter().all(|r| r.status_code.is_none()));
    assert!(runs.iter().all(|r| r.error.is_some()));
}

/// Test: Backoff delays follow the schedule and saturate at its last entry.
#[tokio::test(start_paused = true)]
async fn test_backoff_timing_through_scheduler() {
    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, "http://unused").await;
    let executor = Arc::new(ScriptedExecutor::always_failing("connection refused"));

    let event_bus = EventBus::new();
    let handler = RecordingHandler::new();
    event_bus.register(handler.clone()).await;

    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_executor(executor.clone())
        .with_event_bus(event_bus)
        .with_retry_policy(RetryPolicy::new(
            4,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        ));

    scheduler.poll_once(Utc::now()).await;
    scheduler.wait_idle().await;

    assert_eq!(
        executor.call_gaps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(4),
        ]
    );
    assert_eq!(storage.list_runs(task.id, 10).await.unwrap().len(), 5);

    assert_eq!(
        handler
            .count(|e| matches!(e, Event::TaskDispatched { .. }))
            .await,
        1
    );
    assert_eq!(
        handler
            .count(|e| matches!(e, Event::RetryScheduled { .. }))
            .await,
        4
    );
    let dead = handler
        .events()
        .await
        .into_iter()
        .find_map(|e| match e {
            Event::DeadLettered { error, .. } => Some(error),
            _ => None,
        });
    assert_eq!(dead.as_deref(), Some("connection refused"));
}

/// Test: Shutdown waits for a sequence that is sleeping between attempts.
#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_backoff_sleep() {
    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, "http://unused").await;
    let executor = Arc::new(ScriptedExecutor::fail_times(1, "flaky"));

    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_executor(executor.clone())
        .with_poll_interval(Duration::from_secs(60))
        .with_retry_policy(RetryPolicy::new(1, vec![Duration::from_secs(10)]));

    let handle = scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(executor.call_count(), 1);

    handle.shutdown().await.unwrap();

    assert_eq!(executor.call_count(), 2);
    let runs = storage.list_runs(task.id, 10).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Success);
}

/// Test: Two tasks due in the same tick retry side by side.
#[tokio::test(start_paused = true)]
async fn test_two_due_tasks_retry_concurrently() {
    let storage = Arc::new(InMemoryStorage::new());
    let first = insert_due_task(&*storage, "http://unused/a").await;
    let second = insert_due_task(&*storage, "http://unused/b").await;
    let executor = Arc::new(ScriptedExecutor::always_failing("boom"));

    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_executor(executor.clone())
        .with_retry_policy(RetryPolicy::new(2, vec![Duration::from_secs(1)]));

    let started = tokio::time::Instant::now();
    assert_eq!(
        scheduler.poll_once(Utc::now()).await,
        vec![first.id, second.id]
    );
    scheduler.wait_idle().await;

    // Run one after the other this would take 4s of backoff.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(executor.call_count(), 6);
    for task_id in [first.id, second.id] {
        assert_eq!(storage.list_runs(task_id, 10).await.unwrap().len(), 3);
        assert_eq!(storage.list_dead_letters(task_id).await.unwrap().len(), 1);
    }
}

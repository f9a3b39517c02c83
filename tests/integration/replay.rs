//! Dead-letter replay integration tests.

use crate::common::{insert_due_task, wait_for_dead_letter};

use chrono::Utc;
use hookrun::{
    DeadLetterId, EngineConfig, InMemoryStorage, ReplayError, RetryPolicy, RunStatus, Scheduler,
    Storage, TaskId,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test: A task dead-lettered by the loop can be replayed once it is fixed.
#[tokio::test]
async fn test_dead_letter_then_successful_replay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let scheduler =
        Scheduler::with_storage(Arc::clone(&storage)).with_retry_policy(RetryPolicy::none());

    scheduler.poll_once(Utc::now()).await;
    let entry = wait_for_dead_letter(&*storage, task.id, Duration::from_secs(5)).await;
    scheduler.wait_idle().await;
    assert_eq!(entry.error, "HTTP 502 Bad Gateway");

    let outcome = scheduler.replay(task.id, entry.id).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.status_code(), Some(200));
    assert!(storage.list_dead_letters(task.id).await.unwrap().is_empty());

    let runs = storage.list_runs(task.id, 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[1].status, RunStatus::Failure);
}

/// Test: Replay does not retry, even when the policy would.
#[tokio::test]
async fn test_replay_makes_a_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let entry = storage
        .append_dead_letter(task.id, "HTTP 500".to_string())
        .await
        .unwrap();

    let scheduler = Scheduler::with_storage(Arc::clone(&storage))
        .with_retry_policy(RetryPolicy::new(5, vec![Duration::from_millis(1)]));
    let outcome = scheduler.replay(task.id, entry.id).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(storage.list_runs(task.id, 10).await.unwrap().len(), 1);
    // Removed by default even though the replay failed.
    assert!(storage.list_dead_letters(task.id).await.unwrap().is_empty());
}

/// Test: The keep-on-failure setting leaves a failed replay's entry in place.
#[tokio::test]
async fn test_failed_replay_keeps_entry_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let task = insert_due_task(&*storage, server.uri()).await;
    let entry = storage
        .append_dead_letter(task.id, "HTTP 500".to_string())
        .await
        .unwrap();

    let config = EngineConfig {
        keep_dead_letter_on_failed_replay: true,
        ..EngineConfig::default()
    };
    let scheduler = Scheduler::with_storage(Arc::clone(&storage)).with_config(&config);

    let first = scheduler.replay(task.id, entry.id).await.unwrap();
    let second = scheduler.replay(task.id, entry.id).await.unwrap();

    assert_eq!(first.status_code(), Some(500));
    assert_eq!(second.status_code(), Some(500));
    assert_eq!(storage.list_runs(task.id, 10).await.unwrap().len(), 2);
    assert_eq!(
        storage.list_dead_letters(task.id).await.unwrap()[0].id,
        entry.id
    );
}

/// Test: Replaying an unknown or foreign entry is rejected without a call.
#[tokio::test]
async fn test_replay_rejects_unknown_and_foreign_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let owner = insert_due_task(&*storage, server.uri()).await;
    let other = insert_due_task(&*storage, server.uri()).await;
    let entry = storage
        .append_dead_letter(owner.id, "boom".to_string())
        .await
        .unwrap();
    let scheduler = Scheduler::with_storage(Arc::clone(&storage));

    let err = scheduler
        .replay(owner.id, DeadLetterId::new(9999))
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::DeadLetterNotFound { .. }));

    let err = scheduler.replay(other.id, entry.id).await.unwrap_err();
    assert!(matches!(err, ReplayError::DeadLetterNotFound { .. }));

    let err = scheduler
        .replay(TaskId::new(9999), entry.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::DeadLetterNotFound { .. }));

    // Nothing was consumed.
    assert_eq!(storage.list_dead_letters(owner.id).await.unwrap().len(), 1);
    assert!(storage.list_runs(owner.id, 10).await.unwrap().is_empty());
}

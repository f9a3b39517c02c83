//! Common test utilities shared across integration tests.

use chrono::{Duration as ChronoDuration, Utc};
use hookrun::{DeadLetterEntry, NewTask, Storage, StoredRun, TaskId, WebhookTask};
use std::time::Duration;

/// Insert an enabled yearly task created over a year ago.
///
/// It is due right away, and once it has run its next occurrence is months
/// out, so the loop never calls it twice during a test.
pub async fn insert_due_task(storage: &dyn Storage, url: impl Into<String>) -> WebhookTask {
    storage
        .insert_task(
            NewTask::new(url)
                .with_schedule("@yearly")
                .with_created_at(Utc::now() - ChronoDuration::days(400)),
        )
        .await
        .unwrap()
}

/// Wait until a task has at least `count` runs, polling storage.
///
/// Polls every 10ms and panics once `timeout` has elapsed.
pub async fn wait_for_runs(
    storage: &dyn Storage,
    task_id: TaskId,
    count: usize,
    timeout: Duration,
) -> Vec<StoredRun> {
    let start = tokio::time::Instant::now();
    loop {
        let runs = storage.list_runs(task_id, 100).await.unwrap();
        if runs.len() >= count {
            return runs;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for {} run(s) of task {}, have {}",
                count,
                task_id,
                runs.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until a task has a dead-letter entry, polling storage.
pub async fn wait_for_dead_letter(
    storage: &dyn Storage,
    task_id: TaskId,
    timeout: Duration,
) -> DeadLetterEntry {
    let start = tokio::time::Instant::now();
    loop {
        let entries = storage.list_dead_letters(task_id).await.unwrap();
        if let Some(entry) = entries.into_iter().next() {
            return entry;
        }
        if start.elapsed() > timeout {
            panic!("Timeout waiting for a dead letter of task {}", task_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

//! Retry controller.
//!
//! Runs one retry sequence for a task: attempt, record, back off, repeat,
//! and dead-letter the task once the budget is spent.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use super::dead_letter::DeadLetterSink;
use super::executor::Executor;
use crate::core::retry::RetryPolicy;
use crate::core::task::WebhookTask;
use crate::events::{Event, EventBus};
use crate::storage::{NewRun, Storage, StorageError};

/// Error text for a dead-letter entry when no attempt reported one.
const UNKNOWN_ERROR: &str = "unknown";

/// Drives a task through attempts according to a retry policy.
pub struct RetryController<S: Storage> {
    storage: Arc<S>,
    executor: Arc<dyn Executor>,
    policy: RetryPolicy,
    sink: DeadLetterSink<S>,
    event_bus: Arc<EventBus>,
}

impl<S: Storage> Clone for RetryController<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            executor: Arc::clone(&self.executor),
            policy: self.policy.clone(),
            sink: self.sink.clone(),
            event_bus: Arc::clone(&self.event_bus),
        }
    }
}

impl<S: Storage> RetryController<S> {
    pub fn new(
        storage: Arc<S>,
        executor: Arc<dyn Executor>,
        policy: RetryPolicy,
        sink: DeadLetterSink<S>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            storage,
            executor,
            policy,
            sink,
            event_bus,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the task until it succeeds or the retry budget is exhausted.
    ///
    /// Every attempt appends exactly one run. Returns `Ok(true)` on success
    /// and `Ok(false)` after writing a dead-letter entry. A storage error
    /// aborts the sequence.
    pub async fn run_with_retries(&self, task: &WebhookTask) -> Result<bool, StorageError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;
        let mut last_error: Option<String> = None;

        loop {
            attempt += 1;
            let outcome = self.executor.execute(task).await;
            let run = self
                .storage
                .append_run(NewRun::from_outcome(task.id, &outcome))
                .await?;

            self.event_bus
                .emit(Event::attempt_recorded(
                    task.id,
                    run.id,
                    attempt,
                    outcome.is_success(),
                    outcome.status_code(),
                    outcome.latency(),
                ))
                .await;

            if outcome.is_success() {
                info!(
                    task_id = %task.id,
                    attempt,
                    status_code = outcome.status_code(),
                    latency_ms = outcome.latency_ms(),
                    "webhook succeeded"
                );
                return Ok(true);
            }

            if let Some(error) = outcome.error().filter(|e| !e.is_empty()) {
                last_error = Some(error.to_string());
            }
            warn!(
                task_id = %task.id,
                attempt,
                max_attempts,
                status_code = outcome.status_code(),
                error = outcome.error().unwrap_or_default(),
                "webhook attempt failed"
            );

            if !self.policy.should_retry(attempt) {
                break;
            }

            let delay = self.policy.delay_for(attempt);
            self.event_bus
                .emit(Event::retry_scheduled(task.id, attempt, delay))
                .await;
            sleep(delay).await;
        }

        let error = last_error.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        self.sink.record(task.id, error).await?;
        Ok(false)
    }
}

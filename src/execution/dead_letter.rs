//! Dead-letter recording and replay.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::executor::Executor;
use crate::core::outcome::Outcome;
use crate::core::types::{DeadLetterId, TaskId};
use crate::events::{Event, EventBus};
use crate::storage::{DeadLetterEntry, NewRun, Storage, StorageError};

/// Errors that can occur when replaying a dead-letter entry.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// No entry with that id exists for that task.
    #[error("dead letter {dead_letter_id} not found for task {task_id}")]
    DeadLetterNotFound {
        task_id: TaskId,
        dead_letter_id: DeadLetterId,
    },

    /// The entry exists but its task does not.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Writes dead-letter entries and replays them.
pub struct DeadLetterSink<S: Storage> {
    storage: Arc<S>,
    executor: Arc<dyn Executor>,
    event_bus: Arc<EventBus>,
    keep_on_failed_replay: bool,
}

impl<S: Storage> Clone for DeadLetterSink<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            executor: Arc::clone(&self.executor),
            event_bus: Arc::clone(&self.event_bus),
            keep_on_failed_replay: self.keep_on_failed_replay,
        }
    }
}

impl<S: Storage> DeadLetterSink<S> {
    pub fn new(storage: Arc<S>, executor: Arc<dyn Executor>, event_bus: Arc<EventBus>) -> Self {
        Self {
            storage,
            executor,
            event_bus,
            keep_on_failed_replay: false,
        }
    }

    /// Keep the entry when its replay fails instead of removing it.
    pub fn with_keep_on_failed_replay(mut self, keep: bool) -> Self {
        self.keep_on_failed_replay = keep;
        self
    }

    /// Record a terminal failure for a task.
    pub async fn record(
        &self,
        task_id: TaskId,
        error: impl Into<String>,
    ) -> Result<DeadLetterEntry, StorageError> {
        let error = error.into();
        let entry = self
            .storage
            .append_dead_letter(task_id, error.clone())
            .await?;

        error!(
            task_id = %task_id,
            dead_letter_id = %entry.id,
            error = %error,
            "task moved to dead-letter queue"
        );
        self.event_bus
            .emit(Event::dead_lettered(task_id, entry.id, error))
            .await;
        Ok(entry)
    }

    /// Execute a dead-lettered task once more, outside the retry policy.
    ///
    /// Appends exactly one run and removes the entry. When the sink keeps
    /// entries on failed replay, a failed attempt leaves the entry in place.
    pub async fn replay(
        &self,
        task_id: TaskId,
        dead_letter_id: DeadLetterId,
    ) -> Result<Outcome, ReplayError> {
        let not_found = || ReplayError::DeadLetterNotFound {
            task_id,
            dead_letter_id,
        };

        let entry = match self.storage.get_dead_letter(dead_letter_id).await {
            Ok(entry) => entry,
            Err(StorageError::NotFound(_)) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if entry.task_id != task_id {
            return Err(not_found());
        }

        let task = match self.storage.get_task(task_id).await {
            Ok(task) => task,
            Err(StorageError::NotFound(_)) => return Err(ReplayError::TaskNotFound(task_id)),
            Err(e) => return Err(e.into()),
        };

        let outcome = self.executor.execute(&task).await;
        self.storage
            .append_run(NewRun::from_outcome(task_id, &outcome))
            .await?;

        if outcome.is_success() || !self.keep_on_failed_replay {
            self.storage.delete_dead_letter(dead_letter_id).await?;
        }

        if outcome.is_success() {
            info!(task_id = %task_id, dead_letter_id = %dead_letter_id, "replay succeeded");
        } else {
            warn!(
                task_id = %task_id,
                dead_letter_id = %dead_letter_id,
                error = outcome.error().unwrap_or_default(),
                "replay failed"
            );
        }
        self.event_bus
            .emit(Event::replayed(task_id, dead_letter_id, outcome.is_success()))
            .await;

        Ok(outcome)
    }
}

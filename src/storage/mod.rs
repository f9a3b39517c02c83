//! Storage abstraction for tasks, runs, and dead-letter entries.
//!
//! The engine needs only a narrow contract from the store: read enabled
//! tasks and their latest run, append runs and dead-letter entries, and
//! remove dead-letter entries on replay. Backends are pluggable
//! (in-memory, SQLite).

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::outcome::Outcome;
use crate::core::task::{NewTask, WebhookTask};
use crate::core::types::{DeadLetterId, RunId, TaskId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate key was detected.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// Status of a recorded execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }
}

impl FromStr for RunStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failure" => Ok(RunStatus::Failure),
            other => Err(StorageError::SerializationError(format!(
                "unknown run status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that is about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    pub task_id: TaskId,
    pub status: RunStatus,
    pub latency_ms: u64,
    /// Absent when the request never got a response.
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl NewRun {
    /// Build the run row describing one attempt's outcome.
    pub fn from_outcome(task_id: TaskId, outcome: &Outcome) -> Self {
        Self {
            task_id,
            status: if outcome.is_success() {
                RunStatus::Success
            } else {
                RunStatus::Failure
            },
            latency_ms: outcome.latency_ms(),
            status_code: outcome.status_code(),
            error: outcome.error().map(str::to_string),
        }
    }
}

/// Immutable record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRun {
    /// Store-assigned identifier; increases with insertion order.
    pub id: RunId,
    pub task_id: TaskId,
    pub status: RunStatus,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    /// When the attempt was recorded.
    pub created_at: DateTime<Utc>,
}

/// Terminal-failure record for a task whose retry budget ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub task_id: TaskId,
    /// Error of the last failed attempt.
    pub error: String,
    pub created_at: DateTime<Utc>,
}

/// Storage trait for persisting runner state.
#[async_trait]
pub trait Storage: Send + Sync {
    // Task operations

    /// Store a new task and return it with its assigned id.
    async fn insert_task(&self, task: NewTask) -> Result<WebhookTask, StorageError>;

    /// Replace an existing task definition.
    async fn update_task(&self, task: WebhookTask) -> Result<(), StorageError>;

    /// Get a task by ID.
    async fn get_task(&self, id: TaskId) -> Result<WebhookTask, StorageError>;

    /// List all enabled tasks, ordered by id.
    async fn list_enabled_tasks(&self) -> Result<Vec<WebhookTask>, StorageError>;

    // Run operations

    /// Most recent run for a task, if any.
    async fn last_run(&self, task_id: TaskId) -> Result<Option<StoredRun>, StorageError>;

    /// Append a run row stamped with the current time.
    async fn append_run(&self, run: NewRun) -> Result<StoredRun, StorageError>;

    /// List runs for a task, most recent first.
    /// Returns at most `limit` runs.
    async fn list_runs(&self, task_id: TaskId, limit: usize)
    -> Result<Vec<StoredRun>, StorageError>;

    // Dead-letter operations

    /// Append a dead-letter entry for a task.
    async fn append_dead_letter(
        &self,
        task_id: TaskId,
        error: String,
    ) -> Result<DeadLetterEntry, StorageError>;

    /// Get a dead-letter entry by ID.
    async fn get_dead_letter(&self, id: DeadLetterId) -> Result<DeadLetterEntry, StorageError>;

    /// List dead-letter entries for a task, most recent first.
    async fn list_dead_letters(&self, task_id: TaskId)
    -> Result<Vec<DeadLetterEntry>, StorageError>;

    /// Delete a dead-letter entry. Returns false if it did not exist.
    async fn delete_dead_letter(&self, id: DeadLetterId) -> Result<bool, StorageError>;
}

//! In-memory storage implementation.
//!
//! Provides a thread-safe in-memory backend for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{DeadLetterEntry, NewRun, Storage, StorageError, StoredRun};
use crate::core::task::{NewTask, WebhookTask};
use crate::core::types::{DeadLetterId, RunId, TaskId};

/// In-memory storage backend.
///
/// Thread-safe storage using RwLock for concurrent access.
/// Data is not persisted across restarts.
pub struct InMemoryStorage {
    tasks: RwLock<BTreeMap<TaskId, WebhookTask>>,
    runs: RwLock<BTreeMap<RunId, StoredRun>>,
    dead_letters: RwLock<BTreeMap<DeadLetterId, DeadLetterEntry>>,
    next_id: AtomicI64,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(BTreeMap::new()),
            runs: RwLock::new(BTreeMap::new()),
            dead_letters: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Ids are unique across tables, which is harmless and keeps one counter.
    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn insert_task(&self, task: NewTask) -> Result<WebhookTask, StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = task.into_task(TaskId::new(self.allocate_id()), Utc::now());
        tasks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_task(&self, task: WebhookTask) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        if !tasks.contains_key(&task.id) {
            return Err(StorageError::NotFound(format!("task: {}", task.id)));
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<WebhookTask, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("task: {}", id)))
    }

    async fn list_enabled_tasks(&self) -> Result<Vec<WebhookTask>, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tasks.values().filter(|t| t.enabled).cloned().collect())
    }

    async fn last_run(&self, task_id: TaskId) -> Result<Option<StoredRun>, StorageError> {
        let runs = self.runs.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(runs
            .values()
            .filter(|r| r.task_id == task_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn append_run(&self, run: NewRun) -> Result<StoredRun, StorageError> {
        let mut runs = self.runs.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = StoredRun {
            id: RunId::new(self.allocate_id()),
            task_id: run.task_id,
            status: run.status,
            latency_ms: run.latency_ms,
            status_code: run.status_code,
            error: run.error,
            created_at: Utc::now(),
        };
        runs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_runs(&self, task_id: TaskId, limit: usize) -> Result<Vec<StoredRun>, StorageError> {
        let runs = self.runs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = runs
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        // Most recent first; ids break timestamp ties in insertion order.
        result.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        result.truncate(limit);
        Ok(result)
    }

    async fn append_dead_letter(
        &self,
        task_id: TaskId,
        error: String,
    ) -> Result<DeadLetterEntry, StorageError> {
        let mut entries = self
            .dead_letters
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let entry = DeadLetterEntry {
            id: DeadLetterId::new(self.allocate_id()),
            task_id,
            error,
            created_at: Utc::now(),
        };
        entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_dead_letter(&self, id: DeadLetterId) -> Result<DeadLetterEntry, StorageError> {
        let entries = self
            .dead_letters
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        entries
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("dead letter: {}", id)))
    }

    async fn list_dead_letters(
        &self,
        task_id: TaskId,
    ) -> Result<Vec<DeadLetterEntry>, StorageError> {
        let entries = self
            .dead_letters
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = entries
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(result)
    }

    async fn delete_dead_letter(&self, id: DeadLetterId) -> Result<bool, StorageError> {
        let mut entries = self
            .dead_letters
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.remove(&id).is_some())
    }
}

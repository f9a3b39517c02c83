//! SQLite storage implementation.
//!
//! Provides persistent storage using SQLite database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use super::{DeadLetterEntry, NewRun, RunStatus, Storage, StorageError, StoredRun};
use crate::core::task::{HttpMethod, NewTask, WebhookTask};
use crate::core::types::{DeadLetterId, RunId, TaskId};

/// SQLite storage backend.
///
/// Provides persistent storage with automatic schema migration.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given database path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

type TaskRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
);

type RunRow = (i64, i64, String, i64, Option<i64>, Option<String>, i64);

type DeadLetterRow = (i64, i64, String, i64);

const TASK_COLUMNS: &str =
    "id, url, method, headers_encoded, body, schedule_cron, enabled, created_at";
const RUN_COLUMNS: &str = "id, task_id, status, latency_ms, status_code, error, created_at";
const DEAD_LETTER_COLUMNS: &str = "id, task_id, error, created_at";

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn task_from_row(row: TaskRow) -> Result<WebhookTask, StorageError> {
    let method = HttpMethod::from_str(&row.2)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    Ok(WebhookTask {
        id: TaskId::new(row.0),
        url: row.1,
        method,
        headers_encoded: row.3,
        body: row.4,
        schedule_cron: row.5,
        enabled: row.6,
        created_at: millis_to_datetime(row.7),
    })
}

fn run_from_row(row: RunRow) -> Result<StoredRun, StorageError> {
    let status_code = row
        .4
        .map(u16::try_from)
        .transpose()
        .map_err(|e| StorageError::SerializationError(format!("invalid status code: {}", e)))?;
    Ok(StoredRun {
        id: RunId::new(row.0),
        task_id: TaskId::new(row.1),
        status: RunStatus::from_str(&row.2)?,
        latency_ms: u64::try_from(row.3).unwrap_or(0),
        status_code,
        error: row.5,
        created_at: millis_to_datetime(row.6),
    })
}

fn dead_letter_from_row(row: DeadLetterRow) -> DeadLetterEntry {
    DeadLetterEntry {
        id: DeadLetterId::new(row.0),
        task_id: TaskId::new(row.1),
        error: row.2,
        created_at: millis_to_datetime(row.3),
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_task(&self, task: NewTask) -> Result<WebhookTask, StorageError> {
        // Truncate to the stored precision so the returned copy matches reads.
        let now = millis_to_datetime(Utc::now().timestamp_millis());
        let created_at = task.created_at.unwrap_or(now);

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (url, method, headers_encoded, body, schedule_cron, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.url)
        .bind(task.method.as_str())
        .bind(&task.headers_encoded)
        .bind(&task.body)
        .bind(&task.schedule_cron)
        .bind(task.enabled)
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        let id = TaskId::new(result.last_insert_rowid());
        Ok(task.into_task(id, millis_to_datetime(created_at.timestamp_millis())))
    }

    async fn update_task(&self, task: WebhookTask) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET url = ?, method = ?, headers_encoded = ?, body = ?, schedule_cron = ?, enabled = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.url)
        .bind(task.method.as_str())
        .bind(&task.headers_encoded)
        .bind(&task.body)
        .bind(&task.schedule_cron)
        .bind(task.enabled)
        .bind(task.id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("task: {}", task.id)));
        }
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<WebhookTask, StorageError> {
        let row: TaskRow =
            sqlx::query_as(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?
                .ok_or_else(|| StorageError::NotFound(format!("task: {}", id)))?;

        task_from_row(row)
    }

    async fn list_enabled_tasks(&self) -> Result<Vec<WebhookTask>, StorageError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE enabled = 1 ORDER BY id",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        // A row that no longer converts must not hide the healthy ones.
        let tasks = rows
            .into_iter()
            .filter_map(|row| {
                let task_id = row.0;
                task_from_row(row)
                    .inspect_err(|e| warn!(task_id, error = %e, "skipping unreadable task row"))
                    .ok()
            })
            .collect();
        Ok(tasks)
    }

    async fn last_run(&self, task_id: TaskId) -> Result<Option<StoredRun>, StorageError> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {} FROM runs WHERE task_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
            RUN_COLUMNS
        ))
        .bind(task_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        row.map(run_from_row).transpose()
    }

    async fn append_run(&self, run: NewRun) -> Result<StoredRun, StorageError> {
        let created_at = Utc::now().timestamp_millis();
        let latency_ms = i64::try_from(run.latency_ms).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r#"
            INSERT INTO runs (task_id, status, latency_ms, status_code, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.task_id.get())
        .bind(run.status.as_str())
        .bind(latency_ms)
        .bind(run.status_code.map(i64::from))
        .bind(&run.error)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(StoredRun {
            id: RunId::new(result.last_insert_rowid()),
            task_id: run.task_id,
            status: run.status,
            latency_ms: run.latency_ms,
            status_code: run.status_code,
            error: run.error,
            created_at: millis_to_datetime(created_at),
        })
    }

    async fn list_runs(
        &self,
        task_id: TaskId,
        limit: usize,
    ) -> Result<Vec<StoredRun>, StorageError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {} FROM runs WHERE task_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            RUN_COLUMNS
        ))
        .bind(task_id.get())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter().map(run_from_row).collect()
    }

    async fn append_dead_letter(
        &self,
        task_id: TaskId,
        error: String,
    ) -> Result<DeadLetterEntry, StorageError> {
        let created_at = Utc::now().timestamp_millis();

        let result =
            sqlx::query("INSERT INTO dead_letters (task_id, error, created_at) VALUES (?, ?, ?)")
                .bind(task_id.get())
                .bind(&error)
                .bind(created_at)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(DeadLetterEntry {
            id: DeadLetterId::new(result.last_insert_rowid()),
            task_id,
            error,
            created_at: millis_to_datetime(created_at),
        })
    }

    async fn get_dead_letter(&self, id: DeadLetterId) -> Result<DeadLetterEntry, StorageError> {
        let row: DeadLetterRow = sqlx::query_as(&format!(
            "SELECT {} FROM dead_letters WHERE id = ?",
            DEAD_LETTER_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("dead letter: {}", id)))?;

        Ok(dead_letter_from_row(row))
    }

    async fn list_dead_letters(
        &self,
        task_id: TaskId,
    ) -> Result<Vec<DeadLetterEntry>, StorageError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(&format!(
            "SELECT {} FROM dead_letters WHERE task_id = ? ORDER BY created_at DESC, id DESC",
            DEAD_LETTER_COLUMNS
        ))
        .bind(task_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(rows.into_iter().map(dead_letter_from_row).collect())
    }

    async fn delete_dead_letter(&self, id: DeadLetterId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM dead_letters WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

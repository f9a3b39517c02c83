//! hookrun - a cron-scheduled webhook execution engine.
//!
//! Tasks are registered HTTP calls with an optional cron schedule. The
//! [`Scheduler`] polls storage, dispatches due tasks to a retry sequence,
//! records every attempt as a run, and moves tasks whose retry budget is
//! exhausted to a dead-letter queue from which they can be replayed.

pub mod api;
pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod scheduler;
pub mod secrets;
pub mod storage;
pub mod testing;

pub use config::{ConfigError, EngineConfig, StorageConfig, YamlLoader};
pub use core::outcome::Outcome;
pub use core::retry::RetryPolicy;
pub use core::schedule::{Schedule, ScheduleError, next_due};
pub use core::task::{HttpMethod, NewTask, TaskError, WebhookTask};
pub use core::types::{DeadLetterId, RunId, TaskId};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{DeadLetterSink, Executor, HttpExecutor, ReplayError, RetryController};
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle, SchedulerState};
pub use secrets::{Base64JsonDecoder, DecodeError, HeaderDecoder, JsonHeaderDecoder};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
pub use storage::{
    DeadLetterEntry, InMemoryStorage, NewRun, RunStatus, Storage, StorageError, StoredRun,
};

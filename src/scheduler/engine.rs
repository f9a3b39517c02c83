//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Polling enabled tasks and deciding which are due
//! - Handing each due task to its own retry sequence
//! - Never running two sequences for the same task at once
//! - Replaying dead-letter entries on request

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::types::{SchedulerCommand, SchedulerError, SchedulerState};
use crate::config::EngineConfig;
use crate::core::outcome::Outcome;
use crate::core::retry::RetryPolicy;
use crate::core::schedule::{Schedule, ScheduleError};
use crate::core::task::WebhookTask;
use crate::core::types::{DeadLetterId, TaskId};
use crate::events::{Event, EventBus};
use crate::execution::{DeadLetterSink, Executor, HttpExecutor, ReplayError, RetryController};
use crate::storage::Storage;

type RunningTasks = Arc<RwLock<HashMap<TaskId, JoinHandle<()>>>>;

/// Polls storage for due webhook tasks and dispatches them.
pub struct Scheduler<S: Storage> {
    /// Storage backend.
    storage: Arc<S>,
    /// Performs single attempts.
    executor: Arc<dyn Executor>,
    /// Retry policy applied to every sequence.
    retry_policy: RetryPolicy,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
    /// Interval between due-checks.
    poll_interval: Duration,
    /// Graceful shutdown timeout (default: 30 seconds).
    shutdown_timeout: Duration,
    /// When set, `start` never spawns the loop.
    disabled: bool,
    keep_dead_letter_on_failed_replay: bool,
    /// In-flight retry sequences, one per task at most.
    running: RunningTasks,
    /// Set exactly once by the first `start`.
    handle: OnceLock<SchedulerHandle>,
}

impl<S: Storage + 'static> Scheduler<S> {
    /// Create a new scheduler with the given storage.
    pub fn new(storage: S) -> Self {
        Self::with_storage(Arc::new(storage))
    }

    /// Create a new scheduler with shared storage.
    pub fn with_storage(storage: Arc<S>) -> Self {
        Self {
            storage,
            executor: Arc::new(HttpExecutor::new()),
            retry_policy: RetryPolicy::default(),
            event_bus: Arc::new(EventBus::new()),
            poll_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            disabled: false,
            keep_dead_letter_on_failed_replay: false,
            running: Arc::new(RwLock::new(HashMap::new())),
            handle: OnceLock::new(),
        }
    }

    /// Apply engine settings: poll interval, retry policy, request timeout,
    /// shutdown timeout, disable-worker and replay behavior.
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_poll_interval(config.poll_interval())
            .with_retry_policy(config.retry_policy())
            .with_executor(Arc::new(
                HttpExecutor::new().with_timeout(config.request_timeout()),
            ))
            .with_shutdown_timeout(config.shutdown_timeout())
            .with_disabled(config.disable_worker)
            .with_keep_dead_letter_on_failed_replay(config.keep_dead_letter_on_failed_replay)
    }

    /// Set the executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Disable the polling loop. Replay keeps working.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Keep a dead-letter entry when its replay fails.
    pub fn with_keep_dead_letter_on_failed_replay(mut self, keep: bool) -> Self {
        self.keep_dead_letter_on_failed_replay = keep;
        self
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Get the storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn dead_letter_sink(&self) -> DeadLetterSink<S> {
        DeadLetterSink::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.executor),
            Arc::clone(&self.event_bus),
        )
        .with_keep_on_failed_replay(self.keep_dead_letter_on_failed_replay)
    }

    fn poller(&self) -> Poller<S> {
        Poller {
            storage: Arc::clone(&self.storage),
            controller: RetryController::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.executor),
                self.retry_policy.clone(),
                self.dead_letter_sink(),
                Arc::clone(&self.event_bus),
            ),
            event_bus: Arc::clone(&self.event_bus),
            running: Arc::clone(&self.running),
        }
    }

    /// Start the polling loop.
    ///
    /// Returns `None` when the worker is disabled. Otherwise the loop is
    /// spawned on the first call only; every call returns the same handle.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Option<SchedulerHandle> {
        if self.disabled {
            info!("worker disabled, scheduler not started");
            return None;
        }

        let handle = self.handle.get_or_init(|| {
            let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
            let state = Arc::new(RwLock::new(SchedulerState::Running));
            let poller = self.poller();
            let poll_interval = self.poll_interval;
            let shutdown_timeout = self.shutdown_timeout;
            let loop_state = Arc::clone(&state);

            tokio::spawn(async move {
                poller
                    .run(command_rx, loop_state, poll_interval, shutdown_timeout)
                    .await;
            });
            info!(poll_interval = ?poll_interval, "scheduler started");

            SchedulerHandle { command_tx, state }
        });
        Some(handle.clone())
    }

    /// Handle of the running loop, if `start` has spawned one.
    pub fn handle(&self) -> Option<&SchedulerHandle> {
        self.handle.get()
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        match self.handle.get() {
            Some(handle) => handle.state().await,
            None => SchedulerState::NotStarted,
        }
    }

    /// Run one due-check cycle at `now` and return the dispatched task ids.
    ///
    /// Dispatched sequences run in the background; use
    /// [`Scheduler::wait_idle`] to wait for them.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        self.poller().poll_once(now).await
    }

    /// Number of retry sequences currently in flight.
    pub async fn in_flight(&self) -> usize {
        let running = self.running.read().await;
        running.values().filter(|h| !h.is_finished()).count()
    }

    /// Wait until no retry sequence is in flight.
    pub async fn wait_idle(&self) {
        while self.in_flight().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Replay a dead-letter entry once, outside the retry policy.
    pub async fn replay(
        &self,
        task_id: TaskId,
        dead_letter_id: DeadLetterId,
    ) -> Result<Outcome, ReplayError> {
        self.dead_letter_sink().replay(task_id, dead_letter_id).await
    }
}

/// The part of the scheduler that lives inside the spawned loop.
struct Poller<S: Storage> {
    storage: Arc<S>,
    controller: RetryController<S>,
    event_bus: Arc<EventBus>,
    running: RunningTasks,
}

impl<S: Storage + 'static> Poller<S> {
    /// Main scheduler loop.
    async fn run(
        self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
        poll_interval: Duration,
        shutdown_timeout: Duration,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once(Utc::now()).await;
                    self.cleanup_finished().await;
                }

                command = command_rx.recv() => {
                    let response = match command {
                        Some(SchedulerCommand::Shutdown { response }) => Some(response),
                        // Every handle was dropped; nobody can stop us anymore.
                        None => None,
                    };

                    let mut s = state.write().await;
                    *s = SchedulerState::Stopped;
                    drop(s);

                    self.await_running(shutdown_timeout).await;
                    info!("scheduler stopped");
                    if let Some(response) = response {
                        let _ = response.send(());
                    }
                    break;
                }
            }
        }
    }

    async fn poll_once(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let tasks = match self.storage.list_enabled_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "failed to list enabled tasks");
                return Vec::new();
            }
        };

        let mut dispatched = Vec::new();
        for task in tasks {
            let task_id = task.id;
            match self.is_due(&task, now).await {
                Ok(true) => {
                    if self.dispatch(task).await {
                        dispatched.push(task_id);
                    }
                }
                Ok(false) => {}
                Err(SchedulerError::Schedule(e)) => {
                    warn!(task_id = %task_id, error = %e, "skipping task with unusable schedule");
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "skipping task after error");
                }
            }
        }
        dispatched
    }

    /// A task is due when the first occurrence after its baseline is not
    /// later than `now`. The baseline is the newest run's time, or the
    /// task's creation time when it has never run.
    async fn is_due(&self, task: &WebhookTask, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let Some(expression) = task.schedule_cron.as_deref().filter(|_| task.enabled) else {
            return Ok(false);
        };
        if self.is_in_flight(task.id).await {
            debug!(task_id = %task.id, "task still in flight");
            return Ok(false);
        }

        let baseline = match self.storage.last_run(task.id).await? {
            Some(run) => run.created_at,
            None => task.created_at,
        };

        let schedule = Schedule::new(expression)?;
        match schedule.next_after(baseline) {
            Ok(next) => Ok(next <= now),
            Err(ScheduleError::NoMoreOccurrences) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_in_flight(&self, task_id: TaskId) -> bool {
        let running = self.running.read().await;
        running.get(&task_id).is_some_and(|h| !h.is_finished())
    }

    /// Spawn a retry sequence for the task. Returns false if one is already
    /// in flight.
    async fn dispatch(&self, task: WebhookTask) -> bool {
        let task_id = task.id;
        let mut running = self.running.write().await;
        if running.get(&task_id).is_some_and(|h| !h.is_finished()) {
            return false;
        }

        info!(task_id = %task_id, url = %task.url, "dispatching due task");

        // The sequence is registered under the lock but held back until the
        // dispatch event has gone out, so handlers run without the lock and
        // still see the dispatch before any attempt.
        let (go_tx, go_rx) = oneshot::channel::<()>();
        let controller = self.controller.clone();
        let registry = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            let _ = go_rx.await;
            if let Err(e) = controller.run_with_retries(&task).await {
                warn!(task_id = %task_id, error = %e, "retry sequence aborted");
            }
            registry.write().await.remove(&task_id);
        });
        running.insert(task_id, handle);
        drop(running);

        self.event_bus.emit(Event::task_dispatched(task_id)).await;
        let _ = go_tx.send(());
        true
    }

    /// Clean up finished task handles.
    async fn cleanup_finished(&self) {
        let mut running = self.running.write().await;
        running.retain(|_, handle| !handle.is_finished());
    }

    /// Wait for in-flight sequences to complete, up to `timeout`.
    async fn await_running(&self, timeout: Duration) {
        let running_count = self.running.read().await.len();

        if running_count == 0 {
            return;
        }

        info!(
            "graceful shutdown: waiting for {} in-flight task(s) (timeout: {:?})",
            running_count, timeout
        );

        let start = tokio::time::Instant::now();
        let deadline = start + timeout;

        loop {
            let mut running = self.running.write().await;
            running.retain(|_, handle| !handle.is_finished());
            let remaining = running.len();
            drop(running);

            if remaining == 0 {
                info!("in-flight tasks completed in {:?}", start.elapsed());
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "graceful shutdown timeout ({:?}) exceeded with {} task(s) still running",
                    timeout, remaining
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

//! Testing utilities for users of the hookrun library.
//!
//! This module provides helpers for testing engine behavior without a
//! network:
//!
//! - [`ScriptedExecutor`]: An executor that replays queued outcomes
//! - [`RecordingHandler`]: An event handler that keeps every event
//! - [`transport_failure`] / [`http_failure`] / [`http_success`]: outcome shorthands

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::core::outcome::Outcome;
use crate::core::task::WebhookTask;
use crate::core::types::TaskId;
use crate::events::{Event, EventHandler};
use crate::execution::Executor;

/// A successful outcome with the given status code.
pub fn http_success(status_code: u16) -> Outcome {
    Outcome::success(Duration::from_millis(5), status_code)
}

/// A failed outcome carrying a non-2xx status code.
pub fn http_failure(status_code: u16) -> Outcome {
    Outcome::failure(
        Duration::from_millis(5),
        Some(status_code),
        format!("HTTP {}", status_code),
    )
}

/// A failed outcome with no response at all.
pub fn transport_failure(error: impl Into<String>) -> Outcome {
    Outcome::failure(Duration::from_millis(5), None, error)
}

/// One recorded call to a [`ScriptedExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorCall {
    pub task_id: TaskId,
    /// Tokio clock reading when the call began, so paused-time tests can
    /// assert exact backoff gaps.
    pub at: Instant,
}

/// An executor that returns queued outcomes in order.
///
/// Once the queue is empty every call returns the fallback outcome
/// (a 200 success unless changed with [`ScriptedExecutor::with_fallback`]).
///
/// # Example
///
/// ```
/// use hookrun::testing::{ScriptedExecutor, http_failure, http_success};
///
/// let executor = ScriptedExecutor::new()
///     .then(http_failure(503))
///     .then(http_success(200));
/// assert_eq!(executor.remaining(), 2);
/// ```
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    delay: Duration,
    calls: Mutex<Vec<ExecutorCall>>,
}

impl ScriptedExecutor {
    /// Create an executor with an empty script.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: http_success(200),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// An executor whose every call fails at the transport level.
    pub fn always_failing(error: impl Into<String>) -> Self {
        Self::new().with_fallback(transport_failure(error))
    }

    /// An executor that fails `times` times with the given error, then succeeds.
    pub fn fail_times(times: usize, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut executor = Self::new();
        for _ in 0..times {
            executor = executor.then(transport_failure(error.clone()));
        }
        executor
    }

    /// Queue one more outcome.
    pub fn then(self, outcome: Outcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// Outcome returned once the script is exhausted.
    pub fn with_fallback(mut self, outcome: Outcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// Make every call take this long (on the tokio clock).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of queued outcomes not yet returned.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Gaps between consecutive calls.
    pub fn call_gaps(&self) -> Vec<Duration> {
        let calls = self.calls();
        calls.windows(2).map(|w| w[1].at - w[0].at).collect()
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, task: &WebhookTask) -> Outcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ExecutorCall {
                task_id: task.id,
                at: Instant::now(),
            });
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Event handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of recorded events.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Number of recorded events matching a predicate.
    pub async fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

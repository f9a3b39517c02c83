//! Lifecycle events and event handling.
//!
//! The scheduler and retry controller publish what they do to an
//! `EventBus`, so embedders can observe dispatches, attempts and
//! dead-lettering without reading the store.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{DeadLetterId, RunId, TaskId};

/// Lifecycle events emitted by the engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A due task was handed to a retry sequence.
    TaskDispatched { task_id: TaskId, timestamp: Instant },

    /// One attempt finished and its run was appended.
    AttemptRecorded {
        task_id: TaskId,
        run_id: RunId,
        /// 1-indexed attempt number within the sequence.
        attempt: u32,
        success: bool,
        status_code: Option<u16>,
        latency: Duration,
        timestamp: Instant,
    },

    /// An attempt failed and the controller is about to sleep before retrying.
    RetryScheduled {
        task_id: TaskId,
        /// The attempt that just failed.
        attempt: u32,
        delay: Duration,
        timestamp: Instant,
    },

    /// The retry budget ran out and a dead-letter entry was written.
    DeadLettered {
        task_id: TaskId,
        dead_letter_id: DeadLetterId,
        error: String,
        timestamp: Instant,
    },

    /// A dead-letter entry was replayed.
    Replayed {
        task_id: TaskId,
        dead_letter_id: DeadLetterId,
        success: bool,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TaskDispatched { timestamp, .. } => *timestamp,
            Event::AttemptRecorded { timestamp, .. } => *timestamp,
            Event::RetryScheduled { timestamp, .. } => *timestamp,
            Event::DeadLettered { timestamp, .. } => *timestamp,
            Event::Replayed { timestamp, .. } => *timestamp,
        }
    }

    /// Task this event concerns.
    pub fn task_id(&self) -> TaskId {
        match self {
            Event::TaskDispatched { task_id, .. }
            | Event::AttemptRecorded { task_id, .. }
            | Event::RetryScheduled { task_id, .. }
            | Event::DeadLettered { task_id, .. }
            | Event::Replayed { task_id, .. } => *task_id,
        }
    }

    pub fn task_dispatched(task_id: TaskId) -> Self {
        Event::TaskDispatched {
            task_id,
            timestamp: Instant::now(),
        }
    }

    pub fn attempt_recorded(
        task_id: TaskId,
        run_id: RunId,
        attempt: u32,
        success: bool,
        status_code: Option<u16>,
        latency: Duration,
    ) -> Self {
        Event::AttemptRecorded {
            task_id,
            run_id,
            attempt,
            success,
            status_code,
            latency,
            timestamp: Instant::now(),
        }
    }

    pub fn retry_scheduled(task_id: TaskId, attempt: u32, delay: Duration) -> Self {
        Event::RetryScheduled {
            task_id,
            attempt,
            delay,
            timestamp: Instant::now(),
        }
    }

    pub fn dead_lettered(task_id: TaskId, dead_letter_id: DeadLetterId, error: String) -> Self {
        Event::DeadLettered {
            task_id,
            dead_letter_id,
            error,
            timestamp: Instant::now(),
        }
    }

    pub fn replayed(task_id: TaskId, dead_letter_id: DeadLetterId, success: bool) -> Self {
        Event::Replayed {
            task_id,
            dead_letter_id,
            success,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers, in registration order.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//! Scheduler engine for webhook tasks.
//!
//! This module provides the polling loop that finds due tasks and hands
//! each one to a retry sequence, plus the handle used to stop it.

mod engine;
mod handle;
mod types;

pub use engine::Scheduler;
pub use handle::SchedulerHandle;
pub use types::{SchedulerError, SchedulerState};

//! Task execution engine.
//!
//! This module provides the single-attempt HTTP executor, the retry
//! controller that drives attempts under a policy, and the dead-letter
//! sink that records and replays terminal failures.

mod dead_letter;
mod executor;
mod retry;

pub use dead_letter::{DeadLetterSink, ReplayError};
pub use executor::{DEFAULT_REQUEST_TIMEOUT, Executor, HttpExecutor};
pub use retry::RetryController;

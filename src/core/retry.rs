//! Retry policy for webhook executions.
//!
//! A policy is a retry budget plus an ordered backoff schedule that
//! saturates at its last entry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy applied to every scheduled execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries, not including the initial attempt.
    /// `max_retries = 3` means up to 4 attempts in total.
    pub max_retries: u32,

    /// Delays between consecutive attempts. Entry `i` is slept after the
    /// `i+1`-th failed attempt; indices past the end reuse the last entry.
    #[serde(with = "serde_durations")]
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Vec::new(),
        }
    }

    /// Create a policy with the given budget and backoff schedule.
    pub fn new(max_retries: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Total attempts a sequence may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Check if another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Delay to sleep after the given failed attempt (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(last) = self.backoff.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (attempt.saturating_sub(1) as usize).min(last);
        self.backoff[index]
    }
}

impl Default for RetryPolicy {
    /// Three retries with a 1s, 2s, 4s backoff.
    fn default() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        )
    }
}

/// Serializes the backoff schedule as whole seconds.
mod serde_durations {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs: Vec<u64> = durations.iter().map(Duration::as_secs).collect();
        secs.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Vec::<u64>::deserialize(deserializer)?;
        Ok(secs.into_iter().map(Duration::from_secs).collect())
    }
}

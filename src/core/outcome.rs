//! Result of a single execution attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one HTTP execution attempt.
///
/// A failure caused by the transport (timeout, DNS, refused connection)
/// carries no status code; a failure caused by a non-2xx response does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// The endpoint answered with a 2xx status.
    Success {
        #[serde(with = "millis")]
        latency: Duration,
        status_code: u16,
    },
    /// The request failed or the endpoint answered with a non-2xx status.
    Failure {
        #[serde(with = "millis")]
        latency: Duration,
        status_code: Option<u16>,
        error: String,
    },
}

impl Outcome {
    /// Create a successful outcome.
    pub fn success(latency: Duration, status_code: u16) -> Self {
        Outcome::Success {
            latency,
            status_code,
        }
    }

    /// Create a failed outcome.
    pub fn failure(latency: Duration, status_code: Option<u16>, error: impl Into<String>) -> Self {
        Outcome::Failure {
            latency,
            status_code,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn latency(&self) -> Duration {
        match self {
            Outcome::Success { latency, .. } | Outcome::Failure { latency, .. } => *latency,
        }
    }

    /// Latency in whole milliseconds, as recorded on runs.
    pub fn latency_ms(&self) -> u64 {
        u64::try_from(self.latency().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Outcome::Success { status_code, .. } => Some(*status_code),
            Outcome::Failure { status_code, .. } => *status_code,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

//! API response types.

use serde::Serialize;

use crate::core::outcome::Outcome;
use crate::scheduler::SchedulerState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Scheduler state response.
#[derive(Debug, Serialize)]
pub struct SchedulerStateResponse {
    pub state: &'static str,
    pub is_running: bool,
}

impl From<SchedulerState> for SchedulerStateResponse {
    fn from(state: SchedulerState) -> Self {
        Self {
            state: state.as_str(),
            is_running: state == SchedulerState::Running,
        }
    }
}

/// Result of replaying a dead-letter entry.
#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub ok: bool,
    /// Absent when no response was received.
    pub response_code: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl From<Outcome> for ReplayResponse {
    fn from(outcome: Outcome) -> Self {
        Self {
            ok: outcome.is_success(),
            response_code: outcome.status_code(),
            error: outcome.error().map(str::to_string),
            latency_ms: outcome.latency_ms(),
        }
    }
}

//! API request handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::core::types::{DeadLetterId, TaskId};
use crate::scheduler::Scheduler;
use crate::storage::Storage;

use super::errors::ApiError;
use super::responses::{HealthResponse, ReplayResponse, SchedulerStateResponse};

/// Shared application state for API handlers.
pub struct ApiState<S: Storage> {
    pub scheduler: Arc<Scheduler<S>>,
}

impl<S: Storage> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Get scheduler state.
pub async fn get_scheduler_state<S: Storage + 'static>(
    State(state): State<ApiState<S>>,
) -> Json<SchedulerStateResponse> {
    let scheduler_state = state.scheduler.state().await;
    Json(SchedulerStateResponse::from(scheduler_state))
}

/// Replay a dead-letter entry of a task.
pub async fn replay_dead_letter<S: Storage + 'static>(
    State(state): State<ApiState<S>>,
    Path((task_id, dlq_id)): Path<(i64, i64)>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let outcome = state
        .scheduler
        .replay(TaskId::new(task_id), DeadLetterId::new(dlq_id))
        .await?;
    Ok(Json(ReplayResponse::from(outcome)))
}

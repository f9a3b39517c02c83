//! Core domain types: identifiers, task definitions, outcomes, cron
//! schedules and retry policies.

pub mod outcome;
pub mod retry;
pub mod schedule;
pub mod task;
pub mod types;

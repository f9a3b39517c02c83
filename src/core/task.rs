//! Webhook task definitions.
//!
//! A `WebhookTask` is a registered HTTP call with an optional cron schedule.
//! The engine only ever holds transient copies of tasks read from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::types::TaskId;

/// Errors that can occur when building task definitions.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The HTTP method is not one of GET/POST/PUT/DELETE/PATCH.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

/// HTTP methods a webhook task may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// The canonical upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = TaskError;

    /// Parse a method name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            _ => Err(TaskError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered webhook definition, as read from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTask {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Destination URL.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Encoded header blob, decoded by a `HeaderDecoder` at execution time.
    pub headers_encoded: Option<String>,
    /// Request body, sent verbatim.
    pub body: Option<String>,
    /// Cron expression. Tasks without one are never auto-triggered.
    pub schedule_cron: Option<String>,
    /// Whether the scheduler considers this task at all.
    pub enabled: bool,
    /// When the task was registered.
    pub created_at: DateTime<Utc>,
}

impl WebhookTask {
    /// Whether the scheduler may auto-trigger this task.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.schedule_cron.is_some()
    }
}

/// A task definition that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub url: String,
    pub method: HttpMethod,
    pub headers_encoded: Option<String>,
    pub body: Option<String>,
    pub schedule_cron: Option<String>,
    pub enabled: bool,
    /// Overrides the registration time; the store uses "now" when unset.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewTask {
    /// Create an enabled, unscheduled GET task.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers_encoded: None,
            body: None,
            schedule_cron: None,
            enabled: true,
            created_at: None,
        }
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the encoded header blob.
    pub fn with_headers_encoded(mut self, blob: impl Into<String>) -> Self {
        self.headers_encoded = Some(blob.into());
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the cron schedule.
    pub fn with_schedule(mut self, cron: impl Into<String>) -> Self {
        self.schedule_cron = Some(cron.into());
        self
    }

    /// Set enabled status.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Backdate or postdate the registration time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Materialize the stored form with the given id.
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> WebhookTask {
        WebhookTask {
            id,
            url: self.url,
            method: self.method,
            headers_encoded: self.headers_encoded,
            body: self.body,
            schedule_cron: self.schedule_cron,
            enabled: self.enabled,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

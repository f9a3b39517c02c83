//! Single-attempt HTTP execution.
//!
//! An `Executor` performs exactly one request for a task and reports an
//! `Outcome`. It never retries and never touches the store; that is the
//! retry controller's job.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

use crate::core::outcome::Outcome;
use crate::core::task::{HttpMethod, WebhookTask};
use crate::secrets::{HeaderDecoder, JsonHeaderDecoder};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Performs one attempt of a task.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute the task once. Never fails; problems become a failure `Outcome`.
    async fn execute(&self, task: &WebhookTask) -> Outcome;
}

/// Executor that sends the task's request over HTTP with `reqwest`.
pub struct HttpExecutor {
    client: Client,
    timeout: Duration,
    decoder: Arc<dyn HeaderDecoder>,
}

impl HttpExecutor {
    /// Create an executor with the default timeout and JSON header decoding.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create an executor around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            decoder: Arc::new(JsonHeaderDecoder),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the decoder used for the task's header blob.
    pub fn with_decoder(mut self, decoder: Arc<dyn HeaderDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Get the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn decode_headers(&self, task: &WebhookTask) -> HeaderMap {
        let Some(blob) = task.headers_encoded.as_deref() else {
            return HeaderMap::new();
        };
        if blob.trim().is_empty() {
            return HeaderMap::new();
        }

        let pairs: HashMap<String, String> = match self.decoder.decode(blob) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "failed to decode headers, sending none");
                return HeaderMap::new();
            }
        };

        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, value) in pairs {
            let parsed = HeaderName::from_bytes(name.as_bytes())
                .ok()
                .zip(HeaderValue::from_str(&value).ok());
            match parsed {
                Some((name, value)) => {
                    headers.insert(name, value);
                }
                None => warn!(task_id = %task.id, header = %name, "skipping invalid header"),
            }
        }
        headers
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, task: &WebhookTask) -> Outcome {
        let mut request = self
            .client
            .request(to_reqwest_method(task.method), &task.url)
            .headers(self.decode_headers(task))
            .timeout(self.timeout);
        if let Some(body) = &task.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) => {
                let latency = start.elapsed();
                let status = response.status();
                if status.is_success() {
                    Outcome::success(latency, status.as_u16())
                } else {
                    let error = format!(
                        "HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    );
                    Outcome::failure(latency, Some(status.as_u16()), error)
                }
            }
            Err(e) => Outcome::failure(start.elapsed(), None, e.to_string()),
        }
    }
}

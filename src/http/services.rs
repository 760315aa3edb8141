//! Downstream service calls for response aggregation.
//!
//! # Responsibilities
//! - Fetch a service endpoint with a blocking GET
//! - Report status line and body text, or why the call failed
//!
//! # Design Decisions
//! - Blocking on purpose: pipelines run on a worker thread and append
//!   results in endpoint order
//! - Every call is bounded by the configured service timeout
//! - No retries; a failed endpoint is simply left out by the caller

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::observability::metrics;

/// Errors from a single service call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, timeout or protocol failure.
    #[error("request to {uri} failed: {source}")]
    Request {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be read.
    #[error("reading body from {uri} failed: {source}")]
    Body {
        uri: String,
        #[source]
        source: reqwest::Error,
    },
}

/// What a service endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReply {
    /// Status line, e.g. `200 OK`.
    pub status_text: String,
    pub body: String,
}

/// Performs service endpoint calls.
pub trait ServiceFetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<ServiceReply, FetchError>;
}

/// Fetches endpoints over HTTP with `reqwest`'s blocking client.
///
/// Must only be used off the async runtime (e.g. inside `spawn_blocking`).
/// The client is built on first use, on that worker thread, and shared by
/// every later fetch.
#[derive(Debug, Clone)]
pub struct HttpServiceFetcher {
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpServiceFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceLock::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, FetchError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(self.client.get_or_init(|| built))
    }
}

impl ServiceFetcher for HttpServiceFetcher {
    fn fetch(&self, uri: &str) -> Result<ServiceReply, FetchError> {
        let start = Instant::now();
        let response = self
            .client()?
            .get(uri)
            .send()
            .map_err(|source| FetchError::Request {
                uri: uri.to_string(),
                source,
            })?;
        let status_text = response.status().to_string();
        let body = response.text().map_err(|source| FetchError::Body {
            uri: uri.to_string(),
            source,
        })?;

        tracing::debug!(
            uri = %uri,
            status = %status_text,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Service endpoint fetched"
        );
        Ok(ServiceReply { status_text, body })
    }
}

/// Fetches every endpoint in order and renders the successful ones as
/// `{uri}: {status}: {body}<br>`. Failures are logged and skipped.
pub fn aggregate(fetcher: &dyn ServiceFetcher, endpoints: &[String]) -> String {
    let mut aggregated = String::new();
    for uri in endpoints {
        match fetcher.fetch(uri) {
            Ok(reply) => {
                metrics::record_service_fetch("ok");
                aggregated.push_str(&format!("{}: {}: {}<br>", uri, reply.status_text, reply.body));
            }
            Err(e) => {
                metrics::record_service_fetch("error");
                tracing::warn!(uri = %uri, error = %e, "Service endpoint failed, omitting");
            }
        }
    }
    aggregated
}

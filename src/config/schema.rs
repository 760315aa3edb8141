//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the stub server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::http::request::Cookie;
use crate::routing::{HandlerRecord, InjectionKey, ResponsePlan};

/// Root configuration for the stub server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct StubServerConfig {
    /// Listener configuration (bind address, fallback).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Stubs registered at startup, in order.
    pub stubs: Vec<StubConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8181"). Port 0 picks a free port.
    pub bind_address: String,

    /// Fall back to an ephemeral loopback port when the bind fails.
    pub fallback: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            fallback: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for each service endpoint fetch in seconds.
    pub service_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn service(&self) -> Duration {
        Duration::from_secs(self.service_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            service_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A stub declared in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StubConfig {
    /// HTTP method (case-insensitive).
    pub method: String,

    /// Path, optionally with a query string, or `*`.
    pub path: String,

    /// Response status (0 leaves the transport default).
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Response body as text.
    #[serde(default)]
    pub body: Option<String>,

    /// Response body as JSON; sets `Content-Type: application/json`.
    #[serde(default)]
    pub body_json: Option<serde_json::Value>,

    /// Headers the request must carry with exactly these values.
    #[serde(default)]
    pub required_headers: BTreeMap<String, String>,

    /// Cookies the request must carry (by name).
    #[serde(default)]
    pub required_cookies: Vec<CookieConfig>,

    /// Injection tokens (`path`).
    #[serde(default)]
    pub inject: Vec<String>,

    /// Service endpoints fetched and appended to the body.
    #[serde(default)]
    pub services: Vec<String>,

    /// Wrap the body in an HTML document.
    #[serde(default)]
    pub render_html: bool,
}

fn default_status() -> u16 {
    200
}

/// A required cookie.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CookieConfig {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl StubConfig {
    /// A stub answering `method` + `path` with an empty 200.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status: default_status(),
            headers: BTreeMap::new(),
            body: None,
            body_json: None,
            required_headers: BTreeMap::new(),
            required_cookies: Vec::new(),
            inject: Vec::new(),
            services: Vec::new(),
            render_html: false,
        }
    }

    /// Builds the handler record this stub describes.
    ///
    /// Unknown injection tokens are skipped here; validation reports them.
    pub fn to_record(&self) -> HandlerRecord {
        let mut record = HandlerRecord::new(&self.method, &self.path);

        let mut plan = ResponsePlan::new(self.status);
        plan.headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(json) = &self.body_json {
            if !self.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                plan.headers
                    .push(("Content-Type".to_string(), "application/json".to_string()));
            }
            plan.body = json.to_string().into_bytes();
        } else if let Some(body) = &self.body {
            plan.body = body.clone().into_bytes();
        }
        record.response = plan;

        for (name, value) in &self.required_headers {
            record.set_required_header(name, value);
        }
        record.required_cookies = self
            .required_cookies
            .iter()
            .map(|c| Cookie::new(c.name.clone(), c.value.clone()))
            .collect();
        for token in &self.inject {
            match token.parse::<InjectionKey>() {
                Ok(key) => record.injection_keys.push(key),
                Err(e) => tracing::warn!(error = %e, path = %self.path, "Skipping injection key"),
            }
        }
        record.service_endpoints = self.services.clone();
        record.render_html = self.render_html;
        record
    }
}

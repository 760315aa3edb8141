//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse, statuses fit)
//! - Reject stubs that could never be served as declared
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StubServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{StubConfig, StubServerConfig};
use crate::routing::InjectionKey;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("timeout '{field}' must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("stub #{index}: invalid method '{method}'")]
    InvalidMethod { index: usize, method: String },

    #[error("stub #{index}: path must not be empty")]
    EmptyPath { index: usize },

    #[error("stub #{index}: status {status} is outside 100..=999")]
    InvalidStatus { index: usize, status: u16 },

    #[error("stub #{index}: 'body' and 'body_json' are mutually exclusive")]
    ConflictingBody { index: usize },

    #[error("stub #{index}: unknown injection key '{key}'")]
    UnknownInjectionKey { index: usize, key: String },

    #[error("stub #{index}: invalid service URL '{url}'")]
    InvalidServiceUrl { index: usize, url: String },
}

/// Checks `config`, returning every problem found.
pub fn validate_config(config: &StubServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout { field: "request_secs" });
    }
    if config.timeouts.service_secs == 0 {
        errors.push(ValidationError::ZeroTimeout { field: "service_secs" });
    }

    for (index, stub) in config.stubs.iter().enumerate() {
        validate_stub(index, stub, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_stub(index: usize, stub: &StubConfig, errors: &mut Vec<ValidationError>) {
    if stub.method.is_empty() || Method::from_bytes(stub.method.to_ascii_uppercase().as_bytes()).is_err() {
        errors.push(ValidationError::InvalidMethod {
            index,
            method: stub.method.clone(),
        });
    }
    if stub.path.is_empty() {
        errors.push(ValidationError::EmptyPath { index });
    }
    if stub.status != 0 && !(100..=999).contains(&stub.status) {
        errors.push(ValidationError::InvalidStatus {
            index,
            status: stub.status,
        });
    }
    if stub.body.is_some() && stub.body_json.is_some() {
        errors.push(ValidationError::ConflictingBody { index });
    }
    for key in &stub.inject {
        if key.parse::<InjectionKey>().is_err() {
            errors.push(ValidationError::UnknownInjectionKey {
                index,
                key: key.clone(),
            });
        }
    }
    for service in &stub.services {
        let valid = url::Url::parse(service)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidServiceUrl {
                index,
                url: service.clone(),
            });
        }
    }
}

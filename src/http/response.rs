//! Outgoing response surface.
//!
//! # Responsibilities
//! - Define the write surface pipelines emit into
//! - Buffer a response and hand it to axum
//!
//! # Design Decisions
//! - Status `0` means "not written"; the transport default (200) applies
//! - Body writes append, headers are added in emission order
//! - Header names/values that are not valid HTTP are dropped with a warning

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Status written when no handler matches.
pub const NOT_FOUND_STATUS: u16 = 404;

/// Body written when no handler matches.
pub const NOT_FOUND_BODY: &str = "--- 404 Page Not Found";

/// Where a pipeline writes its result.
pub trait ResponseWriter {
    /// Add a response header.
    fn set_header(&mut self, name: &str, value: &str);

    /// Set the status code.
    fn write_status(&mut self, status: u16);

    /// Append to the body.
    fn write_body(&mut self, bytes: &[u8]);
}

/// A buffered response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingResponse {
    /// `0` until a status is written.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutgoingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status that goes on the wire.
    pub fn effective_status(&self) -> u16 {
        if self.status == 0 {
            200
        } else {
            self.status
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ResponseWriter for OutgoingResponse {
    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn write_status(&mut self, status: u16) {
        self.status = status;
    }

    fn write_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }
}

impl IntoResponse for OutgoingResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.effective_status()).unwrap_or_else(|_| {
            tracing::warn!(status = self.status, "Invalid status code, sending 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "Dropping invalid response header"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_status_defaults_to_ok() {
        let out = OutgoingResponse::new();
        assert_eq!(out.status, 0);
        assert_eq!(out.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_writes_accumulate() {
        let mut out = OutgoingResponse::new();
        out.write_status(201);
        out.set_header("Content-Type", "application/json");
        out.set_header("X-Multi", "1");
        out.set_header("X-Multi", "2");
        out.write_body(b"{");
        out.write_body(b"}");

        assert_eq!(out.header("content-type"), Some("application/json"));
        assert_eq!(out.body_text(), "{}");

        let response = out.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all("x-multi").iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_is_dropped() {
        let mut out = OutgoingResponse::new();
        out.set_header("bad header", "x");
        out.set_header("X-Ok", "y");
        let response = out.into_response();
        assert_eq!(response.headers().len(), 1);
    }
}

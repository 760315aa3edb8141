//! Inbound request descriptor and request IDs.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for tracing
//! - Capture what the engine needs from a request: method, path, query,
//!   headers and cookies
//!
//! # Design Decisions
//! - The descriptor is read-only input to matching and pipelines
//! - Cookies are parsed from every `Cookie` header, in order
//! - The request body is never read

use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use std::collections::BTreeMap;
use std::fmt;
use tower_http::request_id::{MakeRequestId, RequestId};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Produces a fresh UUID v4 request ID for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// A cookie name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// What the engine sees of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Uppercase HTTP verb.
    pub method: String,
    /// Raw path, without the query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub cookies: Vec<Cookie>,
}

impl InboundRequest {
    /// Builds a descriptor from a method and a `path?query` target.
    pub fn new(method: &str, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method: method.to_ascii_uppercase(),
            path,
            query,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
        }
    }

    /// Captures method, target, headers and cookies from request parts.
    pub fn from_parts(parts: &Parts) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut inbound = Self::new(parts.method.as_str(), target);
        inbound.cookies = parse_cookies(&parts.headers);
        inbound.headers = parts.headers.clone();
        inbound
    }

    /// Adds a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<axum::http::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Path followed by `?query` when one was present.
    pub fn full_path(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// First value of header `name` (case-insensitive), if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Headers as a sorted map of lowercase name to every value.
    pub fn header_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in self.headers.iter() {
            map.entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        map
    }
}

/// Parses `name=value` pairs out of every `Cookie` header.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie::new(name, value.trim().trim_matches('"')))
        })
        .collect()
}

//! Handler records: one registered expectation and its canned response.
//!
//! # Design Decisions
//! - Records are plain data; the registry owns them behind `Arc` so a request
//!   in flight keeps a stable snapshot while setup code keeps mutating
//! - `method` is always uppercase
//! - `path_spec` is normalized at registration (see [`normalize_path_spec`])

use std::fmt;
use std::str::FromStr;

use crate::http::pipeline::Pipeline;
use crate::http::request::Cookie;

/// The literal wildcard path token.
pub const WILDCARD: &str = "*";

/// Opaque handle to a registered record.
///
/// Handles are never reused, so a handle obtained before a reset simply stops
/// resolving to anything afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// A piece of the inbound request that can be substituted into a body template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionKey {
    /// The inbound request path, without its leading `/`.
    Path,
}

impl InjectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionKey::Path => "path",
        }
    }
}

impl FromStr for InjectionKey {
    type Err = UnknownInjectionKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(InjectionKey::Path),
            other => Err(UnknownInjectionKey(other.to_string())),
        }
    }
}

/// Returned when parsing an unsupported injection token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown injection key '{0}'")]
pub struct UnknownInjectionKey(pub String);

/// The canned response before any pipeline mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePlan {
    /// Status code; `0` leaves the transport default in place.
    pub status: u16,
    /// Response headers, emitted in order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl ResponsePlan {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// One registered expectation.
#[derive(Clone)]
pub struct HandlerRecord {
    pub(crate) id: HandlerId,
    /// Uppercase HTTP verb.
    pub method: String,
    /// Normalized path (always ending in `/`, optionally followed by `?query`)
    /// or the wildcard token.
    pub path_spec: String,
    /// Required header name with its required values. Only single-valued
    /// requirements are enforced.
    pub required_headers: Vec<(String, Vec<String>)>,
    /// Cookies that must be present (by name) on the inbound request.
    pub required_cookies: Vec<Cookie>,
    pub injection_keys: Vec<InjectionKey>,
    /// URIs fetched and appended to the body.
    pub service_endpoints: Vec<String>,
    pub response: ResponsePlan,
    /// Wrap the final body in a minimal HTML document.
    pub render_html: bool,
    /// Overrides the automatically selected pipeline.
    pub pipeline: Option<Pipeline>,
}

impl HandlerRecord {
    /// Creates an unregistered record; the registry assigns its id on insert.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            id: HandlerId(0),
            method: method.to_ascii_uppercase(),
            path_spec: normalize_path_spec(path),
            required_headers: Vec::new(),
            required_cookies: Vec::new(),
            injection_keys: Vec::new(),
            service_endpoints: Vec::new(),
            response: ResponsePlan::default(),
            render_html: false,
            pipeline: None,
        }
    }

    /// Handle of this record.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn is_wildcard(&self) -> bool {
        self.path_spec.starts_with(WILDCARD)
    }

    /// True when the record asks for anything beyond replaying its plan.
    pub fn needs_validation(&self) -> bool {
        !self.required_headers.is_empty()
            || !self.required_cookies.is_empty()
            || !self.injection_keys.is_empty()
            || !self.service_endpoints.is_empty()
            || self.render_html
    }

    /// Looks up a required cookie by name.
    pub fn required_cookie(&self, name: &str) -> Option<&Cookie> {
        self.required_cookies.iter().find(|c| c.name == name)
    }

    /// Replaces every requirement for `name` with the single value `value`.
    pub(crate) fn set_required_header(&mut self, name: &str, value: &str) {
        match self.header_slot(name) {
            Some(values) => {
                values.clear();
                values.push(value.to_string());
            }
            None => self
                .required_headers
                .push((name.to_string(), vec![value.to_string()])),
        }
    }

    /// Adds `value` to the requirements for `name`.
    pub(crate) fn add_required_header(&mut self, name: &str, value: &str) {
        match self.header_slot(name) {
            Some(values) => values.push(value.to_string()),
            None => self
                .required_headers
                .push((name.to_string(), vec![value.to_string()])),
        }
    }

    fn header_slot(&mut self, name: &str) -> Option<&mut Vec<String>> {
        self.required_headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path_spec", &self.path_spec)
            .field("required_headers", &self.required_headers)
            .field("required_cookies", &self.required_cookies)
            .field("injection_keys", &self.injection_keys)
            .field("service_endpoints", &self.service_endpoints)
            .field("response", &self.response)
            .field("render_html", &self.render_html)
            .field("custom_pipeline", &self.pipeline.is_some())
            .finish()
    }
}

/// Normalizes a registered path: the path part always starts and ends with
/// `/`, a query string is kept verbatim after it, and the wildcard is left
/// untouched.
pub fn normalize_path_spec(spec: &str) -> String {
    if spec.starts_with(WILDCARD) {
        return spec.to_string();
    }
    let rooted = if spec.starts_with('/') {
        spec.to_string()
    } else {
        format!("/{}", spec)
    };
    match rooted.split_once('?') {
        Some((path, query)) => format!("{}?{}", ensure_trailing_slash(path), query),
        None => ensure_trailing_slash(&rooted),
    }
}

pub(crate) fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

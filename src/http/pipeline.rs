//! Response pipelines: turn a resolved record and an inbound request into an
//! outgoing response.
//!
//! # Data Flow
//! ```text
//! dispatch(registry, inbound)
//!     → no record           → 404 "--- 404 Page Not Found"
//!     → record.pipeline     → custom pipeline
//!     → needs_validation()  → validating pipeline
//!     → otherwise           → default pipeline
//!
//! validating pipeline:
//!     plan → required headers → required cookies (skipped after a header failure)
//!          → emit headers → emit status → aggregate services
//!          → inject request path → append aggregation → wrap HTML → emit body
//! ```
//!
//! # Design Decisions
//! - Pipelines only write to the response; records are never touched
//! - Header failure takes precedence: cookies are not checked after it
//! - A precondition failure drops the planned headers and writes the
//!   diagnostic verbatim (no services, templating or HTML shell)
//! - Only single-valued header requirements are enforced

use std::sync::Arc;
use std::time::Instant;

use crate::http::request::InboundRequest;
use crate::http::response::{ResponseWriter, NOT_FOUND_BODY, NOT_FOUND_STATUS};
use crate::http::services::{self, ServiceFetcher};
use crate::observability::metrics;
use crate::routing::matcher::unescape;
use crate::routing::{HandlerRecord, InjectionKey, MatchKind, Registry};

/// Everything a pipeline may read.
pub struct Exchange<'a> {
    pub record: &'a HandlerRecord,
    pub request: &'a InboundRequest,
    pub fetcher: &'a dyn ServiceFetcher,
}

/// A response strategy stored on a record.
pub type Pipeline = Arc<dyn Fn(&Exchange<'_>, &mut dyn ResponseWriter) + Send + Sync>;

/// Wraps a closure or fn item as a [`Pipeline`].
pub fn pipeline<F>(f: F) -> Pipeline
where
    F: Fn(&Exchange<'_>, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Outcome of a dispatch, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotFound,
    Matched(MatchKind),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::NotFound => "not_found",
            Outcome::Matched(MatchKind::Exact) => "exact",
            Outcome::Matched(MatchKind::Wildcard) => "wildcard",
            Outcome::Matched(MatchKind::Path) => "path",
        }
    }
}

/// Resolves `request` against `registry` and runs the selected pipeline.
pub fn dispatch(
    registry: &Registry,
    request: &InboundRequest,
    fetcher: &dyn ServiceFetcher,
    out: &mut dyn ResponseWriter,
) -> Outcome {
    let start = Instant::now();
    let Some((record, kind)) = registry.lookup(&request.method, &request.full_path()) else {
        tracing::info!(method = %request.method, path = %request.full_path(), "No handler matched");
        out.write_status(NOT_FOUND_STATUS);
        out.write_body(NOT_FOUND_BODY.as_bytes());
        return Outcome::NotFound;
    };

    tracing::debug!(
        handler = %record.id(),
        method = %request.method,
        path = %request.full_path(),
        kind = ?kind,
        "Handler matched"
    );

    let exchange = Exchange {
        record: &record,
        request,
        fetcher,
    };
    match &record.pipeline {
        Some(custom) => custom(&exchange, out),
        None if record.needs_validation() => validating_pipeline(&exchange, out),
        None => default_pipeline(&exchange, out),
    }

    metrics::record_pipeline(kind_label(kind), start);
    Outcome::Matched(kind)
}

fn kind_label(kind: MatchKind) -> &'static str {
    Outcome::Matched(kind).as_str()
}

/// Replays the record's plan: headers, status when nonzero, body when non-empty.
pub fn default_pipeline(exchange: &Exchange<'_>, out: &mut dyn ResponseWriter) {
    let plan = &exchange.record.response;
    for (name, value) in &plan.headers {
        out.set_header(name, value);
    }
    if plan.status > 0 {
        out.write_status(plan.status);
    }
    if !plan.body.is_empty() {
        out.write_body(&plan.body);
    }
}

/// Checks header and cookie preconditions, then templates and aggregates the body.
pub fn validating_pipeline(exchange: &Exchange<'_>, out: &mut dyn ResponseWriter) {
    let record = exchange.record;
    let request = exchange.request;

    let failure = check_headers(record, request).or_else(|| check_cookies(record, request));
    if let Some(failure) = failure {
        tracing::info!(
            handler = %record.id(),
            kind = failure.kind,
            "Precondition failed"
        );
        metrics::record_precondition_failure(failure.kind);
        out.write_status(500);
        out.write_body(failure.message.as_bytes());
        return;
    }

    for (name, value) in &record.response.headers {
        out.set_header(name, value);
    }
    if record.response.status > 0 {
        out.write_status(record.response.status);
    }

    let aggregated = if record.service_endpoints.is_empty() {
        String::new()
    } else {
        services::aggregate(exchange.fetcher, &record.service_endpoints)
    };

    if record.response.body.is_empty() {
        return;
    }

    let mut body = if record.injection_keys.is_empty() {
        record.response.body.clone()
    } else {
        inject(record, request)
    };
    body.extend_from_slice(aggregated.as_bytes());
    if record.render_html {
        body = wrap_html(&body);
    }
    out.write_body(&body);
}

/// Applies the record's injection keys to its body. A body that is not
/// UTF-8 cannot hold a placeholder and is returned unchanged.
fn inject(record: &HandlerRecord, request: &InboundRequest) -> Vec<u8> {
    let Ok(template) = std::str::from_utf8(&record.response.body) else {
        return record.response.body.clone();
    };
    let mut body = template.to_string();
    for key in &record.injection_keys {
        match key {
            InjectionKey::Path => {
                let decoded = unescape(&request.path).unwrap_or_else(|| request.path.clone());
                let path = decoded.strip_prefix('/').unwrap_or(&decoded);
                body = render_template(&body, path);
            }
        }
    }
    body.into_bytes()
}

struct Failure {
    kind: &'static str,
    message: String,
}

fn check_headers(record: &HandlerRecord, request: &InboundRequest) -> Option<Failure> {
    for (name, values) in &record.required_headers {
        let [required] = values.as_slice() else {
            continue;
        };
        if request.header(name) == Some(required.as_str()) {
            continue;
        }
        let mut message = format!("500: Required header {}:{} not found!", name, required);
        if !request.headers.is_empty() {
            message.push_str(&format!("\nHeaders --> {:?}", request.header_map()));
        }
        return Some(Failure {
            kind: "header",
            message,
        });
    }
    None
}

fn check_cookies(record: &HandlerRecord, request: &InboundRequest) -> Option<Failure> {
    record
        .required_cookies
        .iter()
        .find(|cookie| request.cookie(&cookie.name).is_none())
        .map(|missing| Failure {
            kind: "cookie",
            message: format!("500: Required cookie {} not found!", missing.name),
        })
}

/// Substitutes `value` for the first `{}` or `%s` in `template`. `%%` renders
/// as `%`. A template without a placeholder is returned unchanged.
pub fn render_template(template: &str, value: &str) -> String {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut substituted = false;
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '%']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("%%") {
            out.push('%');
            rest = &tail[2..];
        } else if !substituted && (tail.starts_with("{}") || tail.starts_with("%s")) {
            out.push_str(value);
            substituted = true;
            rest = &tail[2..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

const HTML_HEAD: &[u8] = b"<html><head><title>http-stub</title></head><body>";
const HTML_TAIL: &[u8] = b"</body></html>";

/// Minimal HTML document around `body`.
pub fn wrap_html(body: &[u8]) -> Vec<u8> {
    let mut page = Vec::with_capacity(HTML_HEAD.len() + body.len() + HTML_TAIL.len());
    page.extend_from_slice(HTML_HEAD);
    page.extend_from_slice(body);
    page.extend_from_slice(HTML_TAIL);
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Cookie;
    use crate::http::response::OutgoingResponse;
    use crate::http::services::{FetchError, ServiceReply};
    use crate::routing::ResponsePlan;
    use std::sync::Mutex;

    /// Records the last status and body written, like a wire would see them.
    #[derive(Default)]
    struct RecordingWriter {
        status: Option<u16>,
        status_writes: usize,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl ResponseWriter for RecordingWriter {
        fn set_header(&mut self, name: &str, value: &str) {
            self.headers.push((name.to_string(), value.to_string()));
        }

        fn write_status(&mut self, status: u16) {
            self.status = Some(status);
            self.status_writes += 1;
        }

        fn write_body(&mut self, bytes: &[u8]) {
            self.body.push_str(&String::from_utf8_lossy(bytes));
        }
    }

    /// Answers every URI it knows and fails the rest, remembering what was asked.
    #[derive(Default)]
    struct ScriptedFetcher {
        replies: Vec<(&'static str, &'static str)>,
        calls: Mutex<Vec<String>>,
    }

    impl ServiceFetcher for ScriptedFetcher {
        fn fetch(&self, uri: &str) -> Result<ServiceReply, FetchError> {
            self.calls.lock().unwrap().push(uri.to_string());
            match self.replies.iter().find(|(u, _)| *u == uri) {
                Some((_, body)) => Ok(ServiceReply {
                    status_text: "200 OK".to_string(),
                    body: body.to_string(),
                }),
                None => crate::http::services::HttpServiceFetcher::new(
                    std::time::Duration::from_millis(200),
                )
                .fetch("http://127.0.0.1:1/"),
            }
        }
    }

    fn planned(status: u16, body: &str) -> HandlerRecord {
        let mut record = HandlerRecord::new("GET", "/users");
        record.response = ResponsePlan {
            status,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
        };
        record
    }

    fn run(
        record: &HandlerRecord,
        request: &InboundRequest,
        fetcher: &dyn ServiceFetcher,
    ) -> RecordingWriter {
        let mut out = RecordingWriter::default();
        let exchange = Exchange {
            record,
            request,
            fetcher,
        };
        validating_pipeline(&exchange, &mut out);
        out
    }

    #[test]
    fn test_default_pipeline_replays_plan() {
        let record = planned(200, "Body");
        let request = InboundRequest::new("GET", "/anything");
        let fetcher = ScriptedFetcher::default();
        let mut out = RecordingWriter::default();
        default_pipeline(
            &Exchange {
                record: &record,
                request: &request,
                fetcher: &fetcher,
            },
            &mut out,
        );
        assert_eq!(out.status, Some(200));
        assert_eq!(out.body, "Body");
        assert_eq!(out.headers.len(), 1);
    }

    #[test]
    fn test_default_pipeline_leaves_zero_status_unset() {
        let record = planned(0, "");
        let request = InboundRequest::new("GET", "/");
        let fetcher = ScriptedFetcher::default();
        let mut out = RecordingWriter::default();
        default_pipeline(
            &Exchange {
                record: &record,
                request: &request,
                fetcher: &fetcher,
            },
            &mut out,
        );
        assert_eq!(out.status, None);
        assert_eq!(out.status_writes, 0);
        assert!(out.body.is_empty());
    }

    #[test]
    fn test_required_header_present() {
        let mut record = planned(200, "Body");
        record.set_required_header("requiredHeaderKey", "requiredHeaderValue");
        let request =
            InboundRequest::new("GET", "/users").with_header("requiredHeaderKey", "requiredHeaderValue");

        let out = run(&record, &request, &ScriptedFetcher::default());
        assert_eq!(out.status, Some(200));
        assert_eq!(out.body, "Body");
    }

    #[test]
    fn test_required_header_missing() {
        let mut record = planned(200, "Body");
        record.set_required_header("requiredHeaderKey", "requiredHeaderValue");
        let request = InboundRequest::new("GET", "/users");

        let out = run(&record, &request, &ScriptedFetcher::default());
        assert_eq!(out.status, Some(500));
        assert_eq!(
            out.body,
            "500: Required header requiredHeaderKey:requiredHeaderValue not found!"
        );
        assert!(out.headers.is_empty(), "planned headers are dropped on failure");
    }

    #[test]
    fn test_required_header_mismatch_dumps_inbound_headers() {
        let mut record = planned(200, "Body");
        record.set_required_header("Key", "Value");
        let request =
            InboundRequest::new("GET", "/users").with_header("requiredHeaderKey", "requiredHeaderValue");

        let out = run(&record, &request, &ScriptedFetcher::default());
        assert_eq!(
            out.body,
            "500: Required header Key:Value not found!\nHeaders --> {\"requiredheaderkey\": [\"requiredHeaderValue\"]}"
        );
    }

    #[test]
    fn test_header_value_is_case_sensitive() {
        let mut record = planned(200, "Body");
        record.set_required_header("key", "Value");
        let request = InboundRequest::new("GET", "/users").with_header("KEY", "value");

        let out = run(&record, &request, &ScriptedFetcher::default());
        assert_eq!(out.status, Some(500));
    }

    #[test]
    fn test_multi_valued_requirement_is_skipped() {
        let mut record = planned(200, "Body");
        record.add_required_header("accept", "a");
        record.add_required_header("accept", "b");
        let out = run(&record, &InboundRequest::new("GET", "/users"), &ScriptedFetcher::default());
        assert_eq!(out.status, Some(200));
        assert_eq!(out.body, "Body");
    }

    #[test]
    fn test_record_is_untouched_by_failure() {
        let mut record = planned(200, "Body");
        record.set_required_header("Key", "Value");
        let fetcher = ScriptedFetcher::default();

        let out = run(&record, &InboundRequest::new("GET", "/users"), &fetcher);
        assert_eq!(out.body, "500: Required header Key:Value not found!");

        let request = InboundRequest::new("GET", "/users").with_header("Key", "Value");
        let out = run(&record, &request, &fetcher);
        assert_eq!(out.body, "Body");
    }

    #[test]
    fn test_required_cookie_present_by_name() {
        let mut record = planned(200, "Body");
        record.required_cookies.push(Cookie::new("cookie", "111"));
        let request = InboundRequest::new("GET", "/users").with_cookie(Cookie::new("cookie", "other"));

        let out = run(&record, &request, &ScriptedFetcher::default());
        assert_eq!(out.status, Some(200));
        assert_eq!(out.body, "Body");
    }

    #[test]
    fn test_required_cookie_missing() {
        let mut record = planned(200, "Body");
        record.required_cookies.push(Cookie::new("cookie", "111"));

        let out = run(&record, &InboundRequest::new("GET", "/users"), &ScriptedFetcher::default());
        assert_eq!(out.status, Some(500));
        assert_eq!(out.body, "500: Required cookie cookie not found!");
    }

    #[test]
    fn test_header_failure_takes_precedence_over_cookie() {
        let mut record = planned(200, "Body");
        record.set_required_header("Key", "Value");
        record.required_cookies.push(Cookie::new("session", "1"));

        let out = run(&record, &InboundRequest::new("GET", "/users"), &ScriptedFetcher::default());
        assert_eq!(out.body, "500: Required header Key:Value not found!");
        assert_eq!(out.status_writes, 1);
    }

    #[test]
    fn test_path_injection() {
        let mut record = planned(200, "Hello {}!");
        record.injection_keys.push(InjectionKey::Path);
        let request = InboundRequest::new("GET", "/users/dreamer?x=1");

        let out = run(&record, &request, &ScriptedFetcher::default());
        assert_eq!(out.body, "Hello users/dreamer!");
    }

    #[test]
    fn test_services_are_appended_after_injection() {
        let mut record = planned(200, "page %s|");
        record.injection_keys.push(InjectionKey::Path);
        record.service_endpoints = vec![
            "http://svc/a".to_string(),
            "http://svc/down".to_string(),
            "http://svc/b".to_string(),
        ];
        let fetcher = ScriptedFetcher {
            replies: vec![("http://svc/a", "A"), ("http://svc/b", "B")],
            ..Default::default()
        };

        let out = run(&record, &InboundRequest::new("GET", "/home"), &fetcher);
        assert_eq!(out.status, Some(200));
        assert_eq!(
            out.body,
            "page home|http://svc/a: 200 OK: A<br>http://svc/b: 200 OK: B<br>"
        );
        assert_eq!(fetcher.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_failed_precondition_skips_services() {
        let mut record = planned(200, "Body");
        record.required_cookies.push(Cookie::new("session", "1"));
        record.service_endpoints.push("http://svc/a".to_string());
        let fetcher = ScriptedFetcher::default();

        run(&record, &InboundRequest::new("GET", "/"), &fetcher);
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_html_wrapping() {
        let mut record = planned(200, "hi");
        record.render_html = true;
        let out = run(&record, &InboundRequest::new("GET", "/"), &ScriptedFetcher::default());
        assert_eq!(
            out.body,
            "<html><head><title>http-stub</title></head><body>hi</body></html>"
        );
    }

    #[test]
    fn test_binary_body_survives_validation() {
        let mut record = HandlerRecord::new("GET", "/logo");
        record.response = ResponsePlan {
            status: 200,
            headers: Vec::new(),
            body: vec![137, 80, 78, 71, 255, 0],
        };
        record.set_required_header("key", "value");
        let request = InboundRequest::new("GET", "/logo").with_header("key", "value");

        let mut out = OutgoingResponse::new();
        validating_pipeline(
            &Exchange {
                record: &record,
                request: &request,
                fetcher: &ScriptedFetcher::default(),
            },
            &mut out,
        );
        assert_eq!(out.status, 200);
        assert_eq!(out.body, vec![137, 80, 78, 71, 255, 0]);
    }

    #[test]
    fn test_binary_body_with_injection_is_unchanged() {
        let mut record = HandlerRecord::new("GET", "*");
        record.response.body = vec![b'%', b's', 0xff];
        record.injection_keys.push(InjectionKey::Path);
        record.render_html = true;

        let mut out = OutgoingResponse::new();
        validating_pipeline(
            &Exchange {
                record: &record,
                request: &InboundRequest::new("GET", "/x"),
                fetcher: &ScriptedFetcher::default(),
            },
            &mut out,
        );
        let mut expected = b"<html><head><title>http-stub</title></head><body>".to_vec();
        expected.extend_from_slice(&[b'%', b's', 0xff]);
        expected.extend_from_slice(b"</body></html>");
        assert_eq!(out.body, expected);
    }

    #[test]
    fn test_injected_path_is_decoded() {
        let mut record = planned(200, "hi %s");
        record.injection_keys.push(InjectionKey::Path);

        let out = run(&record, &InboundRequest::new("GET", "/a%20b"), &ScriptedFetcher::default());
        assert_eq!(out.body, "hi a b");
    }

    #[test]
    fn test_render_template() {
        assert_eq!(render_template("a {} b", "X"), "a X b");
        assert_eq!(render_template("a %s b %s", "X"), "a X b %s");
        assert_eq!(render_template("100%% of {}", "X"), "100% of X");
        assert_eq!(render_template("no placeholder", "X"), "no placeholder");
        assert_eq!(render_template("{\"user\":\"{}\"}", "bob"), "{\"user\":\"bob\"}");
    }

    #[test]
    fn test_dispatch_not_found() {
        let registry = Registry::new();
        let mut out = RecordingWriter::default();
        let outcome = dispatch(
            &registry,
            &InboundRequest::new("GET", "/path/to/nowhere"),
            &ScriptedFetcher::default(),
            &mut out,
        );
        assert_eq!(outcome, Outcome::NotFound);
        assert_eq!(out.status, Some(404));
        assert_eq!(out.body, "--- 404 Page Not Found");
    }

    #[test]
    fn test_dispatch_selects_pipeline() {
        let registry = Registry::new();
        let plain = registry.register("GET", "/plain");
        registry.set_status(plain, 200);
        registry.set_body(plain, "plain");

        let guarded = registry.register("GET", "/guarded");
        registry.set_status(guarded, 200);
        registry.set_body(guarded, "guarded");
        registry.set_required_header(guarded, "key", "value");

        let custom = registry.register("GET", "/custom");
        registry.set_pipeline(
            custom,
            pipeline(|exchange, out| {
                out.write_status(418);
                out.write_body(exchange.request.method.as_bytes());
            }),
        );

        let fetcher = ScriptedFetcher::default();
        let mut out = RecordingWriter::default();
        dispatch(&registry, &InboundRequest::new("GET", "/plain"), &fetcher, &mut out);
        assert_eq!((out.status, out.body.as_str()), (Some(200), "plain"));

        let mut out = RecordingWriter::default();
        dispatch(&registry, &InboundRequest::new("GET", "/guarded"), &fetcher, &mut out);
        assert_eq!(out.status, Some(500));

        let mut out = RecordingWriter::default();
        dispatch(&registry, &InboundRequest::new("GET", "/custom"), &fetcher, &mut out);
        assert_eq!((out.status, out.body.as_str()), (Some(418), "GET"));
    }

    #[test]
    fn test_explicit_default_pipeline_bypasses_validation() {
        let registry = Registry::new();
        let id = registry.register("GET", "/users");
        registry.set_status(id, 200);
        registry.set_body(id, "Body");
        registry.set_required_header(id, "key", "value");
        registry.set_pipeline(id, pipeline(default_pipeline));

        let mut out = RecordingWriter::default();
        dispatch(
            &registry,
            &InboundRequest::new("GET", "/users"),
            &ScriptedFetcher::default(),
            &mut out,
        );
        assert_eq!(out.status, Some(200));
        assert_eq!(out.body, "Body");
    }
}

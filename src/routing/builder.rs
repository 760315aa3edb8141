//! Fluent registration on top of [`Registry`].

use crate::http::pipeline::Pipeline;
use crate::http::request::Cookie;
use crate::routing::record::{HandlerId, InjectionKey};
use crate::routing::registry::Registry;

/// Builds one handler record in place.
///
/// The record is registered as soon as a method is chosen; later calls refine
/// it through its handle. Calls made before a method is chosen are ignored.
///
/// ```no_run
/// # use http_stub::Registry;
/// # use http_stub::routing::HandlerBuilder;
/// let registry = Registry::new();
/// HandlerBuilder::new(&registry)
///     .get("/users")
///     .header("key", "value")
///     .reply(200)
///     .body(r#"[{"username":"dreamer"}]"#);
/// ```
#[derive(Debug)]
#[must_use = "a builder without a method registers nothing"]
pub struct HandlerBuilder<'a> {
    registry: &'a Registry,
    id: Option<HandlerId>,
}

impl<'a> HandlerBuilder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry, id: None }
    }

    /// Handle of the registered record, once a method has been chosen.
    pub fn id(&self) -> Option<HandlerId> {
        self.id
    }

    pub fn get(self, path: &str) -> Self {
        self.method("GET", path)
    }

    pub fn post(self, path: &str) -> Self {
        self.method("POST", path)
    }

    pub fn put(self, path: &str) -> Self {
        self.method("PUT", path)
    }

    pub fn patch(self, path: &str) -> Self {
        self.method("PATCH", path)
    }

    pub fn delete(self, path: &str) -> Self {
        self.method("DELETE", path)
    }

    pub fn head(self, path: &str) -> Self {
        self.method("HEAD", path)
    }

    /// Registers the record for `method` + `path`.
    pub fn method(mut self, method: &str, path: &str) -> Self {
        if self.id.is_none() {
            self.id = Some(self.registry.register(method, path));
        } else {
            tracing::warn!(method = %method, path = %path, "Builder already registered, ignoring");
        }
        self
    }

    /// Requires header `key` to equal `value` exactly.
    pub fn header(self, key: &str, value: &str) -> Self {
        self.with(|r, id| r.set_required_header(id, key, value))
    }

    /// Accepts another value for `key`. Multi-valued requirements are not enforced.
    pub fn add_header(self, key: &str, value: &str) -> Self {
        self.with(|r, id| r.add_required_header(id, key, value))
    }

    /// Requires a cookie named `name` (its value is not compared).
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.with(|r, id| r.add_required_cookie(id, Cookie::new(name, value)))
    }

    pub fn inject(self, key: InjectionKey) -> Self {
        self.with(|r, id| r.add_injection_key(id, key))
    }

    /// Fetches `uri` on every hit and appends the result to the body.
    pub fn service(self, uri: &str) -> Self {
        self.with(|r, id| r.add_service_endpoint(id, uri))
    }

    pub fn reply(self, status: u16) -> Self {
        self.with(|r, id| r.set_status(id, status))
    }

    pub fn body(self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.with(|r, id| r.set_body(id, body))
    }

    /// Serializes `value` as the body and sets a JSON content type.
    pub fn body_json(self, value: &serde_json::Value) -> Self {
        self.response_header("Content-Type", "application/json")
            .body(value.to_string())
    }

    pub fn response_header(self, name: &str, value: &str) -> Self {
        self.with(|r, id| r.add_response_header(id, name, value))
    }

    pub fn render_html(self) -> Self {
        self.with(|r, id| r.set_render_html(id, true))
    }

    /// Replaces the automatically selected pipeline.
    pub fn handle(self, pipeline: Pipeline) -> Self {
        self.with(|r, id| r.set_pipeline(id, pipeline))
    }

    fn with(self, f: impl FnOnce(&Registry, HandlerId) -> bool) -> Self {
        match self.id {
            Some(id) => {
                f(self.registry, id);
            }
            None => tracing::warn!("Builder has no method yet, ignoring setter"),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::pipeline;

    #[test]
    fn test_builder_populates_record() {
        let registry = Registry::new();
        let id = HandlerBuilder::new(&registry)
            .post("/users")
            .header("key", "value")
            .cookie("session", "abc")
            .inject(InjectionKey::Path)
            .service("http://localhost:9/")
            .reply(201)
            .response_header("X-Stub", "1")
            .body("created {}")
            .render_html()
            .id()
            .unwrap();

        let record = registry.record(id).unwrap();
        assert_eq!(record.method, "POST");
        assert_eq!(record.path_spec, "/users/");
        assert_eq!(record.required_headers, vec![("key".to_string(), vec!["value".to_string()])]);
        assert_eq!(record.required_cookie("session").unwrap().value, "abc");
        assert_eq!(record.injection_keys, vec![InjectionKey::Path]);
        assert_eq!(record.service_endpoints, vec!["http://localhost:9/".to_string()]);
        assert_eq!(record.response.status, 201);
        assert_eq!(record.response.body, b"created {}".to_vec());
        assert!(record.render_html);
    }

    #[test]
    fn test_body_json_sets_content_type() {
        let registry = Registry::new();
        let id = HandlerBuilder::new(&registry)
            .get("/users")
            .body_json(&serde_json::json!([{"username": "dreamer"}]))
            .id()
            .unwrap();

        let record = registry.record(id).unwrap();
        assert_eq!(record.response.body, br#"[{"username":"dreamer"}]"#.to_vec());
        assert_eq!(
            record.response.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn test_setters_before_method_are_ignored() {
        let registry = Registry::new();
        let builder = HandlerBuilder::new(&registry).reply(200).body("x");
        assert!(builder.id().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_method_is_ignored() {
        let registry = Registry::new();
        let _ = HandlerBuilder::new(&registry).get("/a").post("/b");
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("GET", "/a").is_some());
    }

    #[test]
    fn test_custom_pipeline_is_stored() {
        let registry = Registry::new();
        let id = HandlerBuilder::new(&registry)
            .get("/")
            .handle(pipeline::pipeline(pipeline::default_pipeline))
            .id()
            .unwrap();
        assert!(registry.record(id).unwrap().pipeline.is_some());
    }
}

//! Ordered store of handler records.
//!
//! # Responsibilities
//! - Append records in registration order (no uniqueness check)
//! - Mutate a record through its handle during test setup
//! - Hand out immutable snapshots for matching
//! - Clear or replace the whole set
//!
//! # Design Decisions
//! - Reads and writes go through an `RwLock`; registration is allowed while
//!   the server is serving
//! - Records are `Arc`s, copied on write, so a request that already resolved
//!   a record is unaffected by later setters
//! - Setters on a stale or unknown handle are no-ops reporting `false`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::http::pipeline::Pipeline;
use crate::http::request::Cookie;
use crate::routing::matcher::{self, MatchKind};
use crate::routing::record::{HandlerId, HandlerRecord, InjectionKey, ResponsePlan};

/// The handler registry.
#[derive(Debug)]
pub struct Registry {
    records: RwLock<Vec<Arc<HandlerRecord>>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new expectation for `method` + `path_spec`.
    pub fn register(&self, method: &str, path_spec: &str) -> HandlerId {
        self.insert(HandlerRecord::new(method, path_spec))
    }

    /// Append a fully built record, assigning it a fresh handle.
    pub fn insert(&self, mut record: HandlerRecord) -> HandlerId {
        record.id = self.next_id();
        let id = record.id;
        tracing::debug!(handler = %id, method = %record.method, path = %record.path_spec, "Handler registered");
        self.write().push(Arc::new(record));
        id
    }

    /// Atomically swap the whole record set. Returns the new handles in order.
    pub fn replace(&self, records: Vec<HandlerRecord>) -> Vec<HandlerId> {
        let fresh: Vec<Arc<HandlerRecord>> = records
            .into_iter()
            .map(|mut record| {
                record.id = self.next_id();
                Arc::new(record)
            })
            .collect();
        let ids = fresh.iter().map(|r| r.id).collect();
        let count = fresh.len();
        *self.write() = fresh;
        tracing::info!(handlers = count, "Handler set replaced");
        ids
    }

    /// Remove every record. Existing handles become stale.
    pub fn reset(&self) {
        let mut records = self.write();
        let dropped = records.len();
        records.clear();
        tracing::debug!(dropped, "Registry reset");
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Current records in registration order.
    pub fn snapshot(&self) -> Vec<Arc<HandlerRecord>> {
        self.read().clone()
    }

    /// The record behind `id`, if it is still registered.
    pub fn record(&self, id: HandlerId) -> Option<Arc<HandlerRecord>> {
        self.read().iter().find(|r| r.id == id).cloned()
    }

    /// A required cookie of the record behind `id`. Absent cookies and stale
    /// handles both yield `None`.
    pub fn required_cookie(&self, id: HandlerId, name: &str) -> Option<Cookie> {
        self.record(id)
            .and_then(|record| record.required_cookie(name).cloned())
    }

    /// Resolve the record serving `method` + `path_and_query`.
    pub fn resolve(&self, method: &str, path_and_query: &str) -> Option<Arc<HandlerRecord>> {
        self.lookup(method, path_and_query).map(|(record, _)| record)
    }

    /// Like [`Registry::resolve`], also reporting how the record was selected.
    pub fn lookup(
        &self,
        method: &str,
        path_and_query: &str,
    ) -> Option<(Arc<HandlerRecord>, MatchKind)> {
        let records = self.read();
        matcher::resolve(&records, method, path_and_query)
    }

    pub fn set_required_header(&self, id: HandlerId, key: &str, value: &str) -> bool {
        self.update(id, |r| r.set_required_header(key, value))
    }

    /// Adds another accepted value; multi-valued requirements are not enforced.
    pub fn add_required_header(&self, id: HandlerId, key: &str, value: &str) -> bool {
        self.update(id, |r| r.add_required_header(key, value))
    }

    pub fn add_required_cookie(&self, id: HandlerId, cookie: Cookie) -> bool {
        self.update(id, |r| r.required_cookies.push(cookie))
    }

    pub fn add_injection_key(&self, id: HandlerId, key: InjectionKey) -> bool {
        self.update(id, |r| r.injection_keys.push(key))
    }

    pub fn add_service_endpoint(&self, id: HandlerId, uri: &str) -> bool {
        self.update(id, |r| r.service_endpoints.push(uri.to_string()))
    }

    pub fn set_response_plan(&self, id: HandlerId, plan: ResponsePlan) -> bool {
        self.update(id, |r| r.response = plan)
    }

    pub fn set_status(&self, id: HandlerId, status: u16) -> bool {
        self.update(id, |r| r.response.status = status)
    }

    pub fn set_body(&self, id: HandlerId, body: impl Into<Vec<u8>>) -> bool {
        let body = body.into();
        self.update(id, |r| r.response.body = body)
    }

    pub fn add_response_header(&self, id: HandlerId, name: &str, value: &str) -> bool {
        self.update(id, |r| {
            r.response
                .headers
                .push((name.to_string(), value.to_string()))
        })
    }

    pub fn set_render_html(&self, id: HandlerId, render: bool) -> bool {
        self.update(id, |r| r.render_html = render)
    }

    pub fn set_pipeline(&self, id: HandlerId, pipeline: Pipeline) -> bool {
        self.update(id, |r| r.pipeline = Some(pipeline))
    }

    fn update(&self, id: HandlerId, f: impl FnOnce(&mut HandlerRecord)) -> bool {
        let mut records = self.write();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                f(Arc::make_mut(record));
                true
            }
            None => {
                tracing::debug!(handler = %id, "Ignoring update for unknown handler");
                false
            }
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<HandlerRecord>>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<HandlerRecord>>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve("GET", "/").is_none());
    }

    #[test]
    fn test_register_preserves_order() {
        let registry = Registry::new();
        let a = registry.register("get", "/a");
        let b = registry.register("GET", "/b");
        let ids: Vec<_> = registry.snapshot().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(registry.snapshot()[0].method, "GET");
    }

    #[test]
    fn test_resolve_after_setters() {
        let registry = Registry::new();
        let id = registry.register("GET", "/users");
        assert!(registry.set_status(id, 200));
        assert!(registry.set_body(id, "[]"));
        assert!(registry.set_required_header(id, "key", "value"));

        let record = registry.resolve("GET", "/users").unwrap();
        assert_eq!(record.id(), id);
        assert_eq!(record.response.status, 200);
        assert_eq!(record.response.body, b"[]".to_vec());
        assert_eq!(record.required_headers.len(), 1);
    }

    #[test]
    fn test_resolved_snapshot_is_immutable() {
        let registry = Registry::new();
        let id = registry.register("GET", "/users");
        registry.set_body(id, "before");

        let snapshot = registry.resolve("GET", "/users").unwrap();
        registry.set_body(id, "after");

        assert_eq!(snapshot.response.body, b"before".to_vec());
        assert_eq!(registry.record(id).unwrap().response.body, b"after".to_vec());
    }

    #[test]
    fn test_reset_clears_everything() {
        let registry = Registry::new();
        let id = registry.register("GET", "*");
        assert!(registry.resolve("GET", "/x").is_some());

        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.resolve("GET", "/x").is_none());
        assert!(!registry.set_status(id, 200), "stale handle must be a no-op");
    }

    #[test]
    fn test_required_cookie_lookup_never_fails() {
        let registry = Registry::new();
        let id = registry.register("GET", "/");
        assert!(registry.required_cookie(id, "session").is_none());

        registry.add_required_cookie(id, Cookie::new("session", "abc"));
        assert_eq!(registry.required_cookie(id, "session").unwrap().value, "abc");

        registry.reset();
        assert!(registry.required_cookie(id, "session").is_none());
    }

    #[test]
    fn test_replace_swaps_records() {
        let registry = Registry::new();
        let old = registry.register("GET", "/old");
        let ids = registry.replace(vec![
            HandlerRecord::new("GET", "/new"),
            HandlerRecord::new("POST", "/new"),
        ]);
        assert_eq!(ids.len(), 2);
        assert!(registry.record(old).is_none());
        assert!(registry.resolve("GET", "/old").is_none());
        assert_eq!(registry.resolve("POST", "/new").unwrap().id(), ids[1]);
    }
}

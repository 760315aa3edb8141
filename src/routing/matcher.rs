//! Request-to-handler resolution.
//!
//! # Responsibilities
//! - Filter records by method
//! - Short-circuit on an exact path+query match or a wildcard record
//! - Collect path-only candidates (query ignored) and accept exactly one
//!
//! A record registered with a query string wins outright for that query; for
//! any other query it competes as an ordinary path candidate.
//!
//! # Design Decisions
//! - Scan is O(n) in registration order; registries are small
//! - Both sides are percent-decoded before comparison (`+` reads as a space)
//! - Ambiguity is a miss: two records with the same path and no way to tell
//!   them apart resolve to nothing rather than to an arbitrary winner
//! - Matching never mutates a record

use std::borrow::Cow;
use std::sync::Arc;

use crate::routing::record::{ensure_trailing_slash, HandlerRecord};

/// How a record was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Path and query equal the registered spec.
    Exact,
    /// The record is a catch-all.
    Wildcard,
    /// The only record whose path (query ignored) equals the request path.
    Path,
}

/// An inbound target split and normalized for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Decoded path, always ending in `/`.
    pub path: String,
    /// Decoded path followed by `?query` when the request had one.
    pub full: String,
}

impl Target {
    /// Splits `path_and_query` and normalizes the path part.
    pub fn parse(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        let path = ensure_trailing_slash(&unescape(path).unwrap_or_else(|| path.to_string()));
        let full = match query {
            Some(q) => format!("{}?{}", path, unescape(q).unwrap_or_else(|| q.to_string())),
            None => path.clone(),
        };
        Self { path, full }
    }
}

/// Resolves the single record that should serve `method` + `path_and_query`.
pub fn resolve(
    records: &[Arc<HandlerRecord>],
    method: &str,
    path_and_query: &str,
) -> Option<(Arc<HandlerRecord>, MatchKind)> {
    let target = Target::parse(path_and_query);
    let mut candidates: Vec<&Arc<HandlerRecord>> = Vec::new();

    for record in records.iter().filter(|r| r.method == method) {
        let Some(spec) = unescape(&record.path_spec) else {
            tracing::debug!(handler = %record.id, spec = %record.path_spec, "Skipping undecodable path spec");
            continue;
        };

        if spec == target.full && record.path_spec.contains('?') {
            return Some((Arc::clone(record), MatchKind::Exact));
        }

        if record.is_wildcard() {
            return Some((Arc::clone(record), MatchKind::Wildcard));
        }

        let spec_path = spec.split_once('?').map_or(spec.as_str(), |(path, _)| path);
        if spec_path == target.path {
            candidates.push(record);
        }
    }

    match candidates.as_slice() {
        [only] => Some((Arc::clone(only), MatchKind::Path)),
        [] => None,
        many => {
            tracing::debug!(
                method = %method,
                path = %target.path,
                candidates = many.len(),
                "Ambiguous registration, treating as no match"
            );
            None
        }
    }
}

/// Percent-decodes `s`, reading `+` as a space. `None` if the result is not UTF-8.
pub(crate) fn unescape(s: &str) -> Option<String> {
    let spaced: Cow<'_, str> = if s.contains('+') {
        Cow::Owned(s.replace('+', " "))
    } else {
        Cow::Borrowed(s)
    };
    urlencoding::decode(&spaced).ok().map(Cow::into_owned)
}

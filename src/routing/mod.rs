//! Routing subsystem: handler registry and matcher.
//!
//! # Data Flow
//! ```text
//! Registration (test setup):
//!     register(method, path) → HandlerId
//!     → setters refine the record (headers, cookies, plan, pipeline)
//!
//! Incoming Request (method, path+query)
//!     → registry.rs (snapshot under read lock)
//!     → matcher.rs (exact / wildcard / single path candidate)
//!     → Return: matched record or None
//! ```
//!
//! # Design Decisions
//! - Insertion order is the only ordering; there are no priorities
//! - Deterministic: same registry and input always resolve the same way
//! - Ambiguity is resolved at match time, never at registration time

pub mod builder;
pub mod matcher;
pub mod record;
pub mod registry;

pub use builder::HandlerBuilder;
pub use matcher::MatchKind;
pub use record::{HandlerId, HandlerRecord, InjectionKey, ResponsePlan, WILDCARD};
pub use registry::Registry;

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → listener.rs (bind, loopback fallback)
//!     → tokio TcpListener handed to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Plain HTTP only
//! - Connection handling is left to axum/hyper

pub mod listener;

pub use listener::{bind_with_fallback, ListenerError};

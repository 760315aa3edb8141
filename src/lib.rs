//! Programmable HTTP stub server.
//!
//! Tests register handler records (method, path, preconditions, planned
//! response), point their client at the server, and get back exactly what
//! they planned, or a diagnostic when a precondition is not met.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::StubServerConfig;
pub use http::pipeline::{pipeline, Exchange, Pipeline};
pub use http::request::{Cookie, InboundRequest};
pub use http::response::{OutgoingResponse, ResponseWriter};
pub use http::StubServer;
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use routing::{HandlerBuilder, HandlerId, InjectionKey, Registry};

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, blocking dispatch)
//!     → request.rs (InboundRequest: method, path, query, headers, cookies)
//!     → [routing layer resolves the handler record]
//!     → pipeline.rs (default / validating / custom pipeline)
//!         → services.rs (optional downstream calls)
//!     → response.rs (buffered OutgoingResponse → axum Response)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;
pub mod services;

pub use pipeline::{default_pipeline, dispatch, validating_pipeline, Exchange, Outcome, Pipeline};
pub use request::{Cookie, InboundRequest, MakeRequestUuid, X_REQUEST_ID};
pub use response::{OutgoingResponse, ResponseWriter};
pub use server::{ServerError, StubServer};
pub use services::{FetchError, HttpServiceFetcher, ServiceFetcher, ServiceReply};

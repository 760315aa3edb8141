//! HTTP server setup and the stub server life cycle.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all dispatch handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind, serve and stop (`start` / `close`) for in-process use
//! - Serve until shutdown with stub hot reload (`run`) for the binary
//! - Observability (metrics, correlation IDs)
//!
//! # Design Decisions
//! - Matching and pipelines are synchronous and may block on service
//!   calls, so each request runs them on a blocking worker
//! - The registry is shared; registering while serving is allowed

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{StubConfig, StubServerConfig};
use crate::http::pipeline;
use crate::http::request::{InboundRequest, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::OutgoingResponse;
use crate::http::services::{HttpServiceFetcher, ServiceFetcher};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{bind_with_fallback, ListenerError};
use crate::observability::metrics;
use crate::routing::{HandlerBuilder, HandlerRecord, Registry};

/// How long `close` waits for in-flight requests before aborting.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub fetcher: Arc<dyn ServiceFetcher>,
}

/// A programmable HTTP stub server.
///
/// ```no_run
/// # async fn demo() -> Result<(), http_stub::http::server::ServerError> {
/// use http_stub::{StubServer, StubServerConfig};
///
/// let mut server = StubServer::new(StubServerConfig::default());
/// let _ = server.handler().get("/users").reply(200).body("[]");
/// server.start().await?;
/// let url = server.resolve_url("/users");
/// # let _ = url;
/// server.close().await;
/// # Ok(())
/// # }
/// ```
pub struct StubServer {
    config: StubServerConfig,
    registry: Arc<Registry>,
    fetcher: Arc<dyn ServiceFetcher>,
    shutdown: Shutdown,
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<Result<(), std::io::Error>>>,
}

impl StubServer {
    /// Create a stub server with `config.stubs` already registered.
    pub fn new(config: StubServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        registry.replace(records_from(&config.stubs));
        let fetcher: Arc<dyn ServiceFetcher> =
            Arc::new(HttpServiceFetcher::new(config.timeouts.service()));

        Self {
            config,
            registry,
            fetcher,
            shutdown: Shutdown::new(),
            local_addr: None,
            task: None,
        }
    }

    /// Replace the fetcher used for service endpoints.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ServiceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &StubServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start describing a new handler.
    pub fn handler(&self) -> HandlerBuilder<'_> {
        HandlerBuilder::new(&self.registry)
    }

    /// Drop every registered handler.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            fetcher: self.fetcher.clone(),
        };

        Router::new()
            .route("/{*path}", any(stub_handler))
            .route("/", any(stub_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(self.config.timeouts.request()))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Bind the listener and serve in the background.
    ///
    /// Returns the bound address; a second call returns the same address.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if let Some(addr) = self.local_addr {
            return Ok(addr);
        }

        // A closed server starts again with a fresh flag.
        if self.shutdown.is_triggered() {
            self.shutdown = Shutdown::new();
        }

        let listener = bind_with_fallback(&self.config.listener).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let signal = self.shutdown.signal();

        self.task = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal.wait())
                .await
        }));
        self.local_addr = Some(addr);

        tracing::info!(address = %addr, stubs = self.registry.len(), "Stub server started");
        Ok(addr)
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Base URL (`http://host:port`), once started.
    pub fn url(&self) -> Option<String> {
        self.local_addr.map(|addr| format!("http://{}", addr))
    }

    /// Base URL followed by `path` (which may carry a query).
    ///
    /// Before `start` this is just `path`.
    pub fn resolve_url(&self, path: &str) -> String {
        format!("{}{}", self.url().unwrap_or_default(), path)
    }

    /// [`resolve_url`](Self::resolve_url) with the path built from format
    /// arguments, e.g. `server.resolve_url_fmt(format_args!("/users/{}", id))`.
    pub fn resolve_url_fmt(&self, path: std::fmt::Arguments<'_>) -> String {
        self.resolve_url(&path.to_string())
    }

    /// Stop serving and wait for in-flight requests to finish.
    pub async fn close(&mut self) {
        self.shutdown.trigger();
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(CLOSE_GRACE, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "Stub server stopped with error"),
                Ok(Err(e)) => tracing::error!(error = %e, "Stub server task failed"),
                Err(_) => {
                    tracing::warn!("Stub server did not drain in time, aborting");
                    task.abort();
                }
            }
        }
        if let Some(addr) = self.local_addr.take() {
            tracing::info!(address = %addr, "Stub server stopped");
        }
    }

    /// Serve on `listener` until `shutdown` fires, replacing the stub set with
    /// every reloaded one.
    pub async fn run(
        self,
        listener: TcpListener,
        mut stub_updates: mpsc::UnboundedReceiver<Vec<StubConfig>>,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, stubs = self.registry.len(), "HTTP server starting");

        let registry = self.registry.clone();
        let reloader = tokio::spawn(async move {
            while let Some(stubs) = stub_updates.recv().await {
                let ids = registry.replace(records_from(&stubs));
                tracing::info!(stubs = ids.len(), "Stubs reloaded");
            }
        });

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.wait())
            .await;
        reloader.abort();
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

fn records_from(stubs: &[StubConfig]) -> Vec<HandlerRecord> {
    stubs.iter().map(StubConfig::to_record).collect()
}

/// Catch-all handler: resolves the request and runs its pipeline.
async fn stub_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, _body) = request.into_parts();
    let inbound = InboundRequest::from_parts(&parts);
    let method = inbound.method.clone();

    let AppState { registry, fetcher } = state;
    let dispatched = tokio::task::spawn_blocking(move || {
        let mut out = OutgoingResponse::new();
        let outcome = pipeline::dispatch(&registry, &inbound, fetcher.as_ref(), &mut out);
        (outcome, out)
    })
    .await;

    match dispatched {
        Ok((outcome, out)) => {
            let status = out.effective_status();
            tracing::debug!(status, outcome = outcome.as_str(), "Request dispatched");
            metrics::record_request(&method, status, outcome.as_str(), start_time);
            out.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Pipeline worker failed");
            metrics::record_request(&method, 500, "error", start_time);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

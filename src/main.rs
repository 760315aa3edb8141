//! http-stub
//!
//! A programmable HTTP stub server built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                    HTTP STUB                      │
//!                        │                                                   │
//!   Client Request       │  ┌─────────┐    ┌─────────┐    ┌──────────────┐  │
//!   ─────────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │  │
//!                        │  │listener │    │ server  │    │   registry   │  │
//!                        │  └─────────┘    └─────────┘    └──────┬───────┘  │
//!                        │                                       │          │
//!                        │                                       ▼          │
//!   Client Response      │  ┌─────────┐    ┌─────────┐    ┌──────────────┐  │
//!   ◀────────────────────┼──│response │◀───│pipeline │───▶│   services   │──┼──▶ Service
//!                        │  └─────────┘    └─────────┘    └──────────────┘  │    Endpoints
//!                        │                                                   │
//!                        │  ┌─────────────────────────────────────────────┐ │
//!                        │  │ config (+watch) │ observability │ lifecycle │ │
//!                        │  └─────────────────────────────────────────────┘ │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_stub::config::{load_config, ConfigWatcher, StubServerConfig};
use http_stub::lifecycle::Shutdown;
use http_stub::net::bind_with_fallback;
use http_stub::observability::{logging, metrics};
use http_stub::StubServer;

#[derive(Parser)]
#[command(name = "http-stub")]
#[command(about = "Programmable HTTP stub server", long_about = None)]
struct Cli {
    /// TOML file with listener settings and stubs
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload stubs when the config file changes
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => StubServerConfig::default(),
    };
    let file_config = config.clone();
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);

    tracing::info!("http-stub v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        stubs = config.stubs.len(),
        request_timeout_secs = config.timeouts.request_secs,
        service_timeout_secs = config.timeouts.service_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = bind_with_fallback(&config.listener).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server.
    let (_watcher, stub_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path, file_config);
            (Some(watcher.run()?), updates)
        }
        _ => (None, tokio::sync::mpsc::unbounded_channel().1),
    };

    let shutdown = Shutdown::new();
    shutdown.trigger_on_os_signal();

    StubServer::new(config)
        .run(listener, stub_updates, shutdown.signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! TCP listener binding with loopback fallback.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - When that fails and fallback is enabled, bind an ephemeral loopback
//!   port instead (IPv6 first, then IPv4)
//! - Report the address actually bound

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

const FALLBACK_ADDRESSES: [&str; 2] = ["[::1]:0", "127.0.0.1:0"];

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address is not a socket address.
    #[error("Invalid bind address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Binds `config.bind_address`, falling back to loopback when allowed.
///
/// The error returned is the one for the configured address.
pub async fn bind_with_fallback(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let primary = match bind(&config.bind_address).await {
        Ok(listener) => return Ok(listener),
        Err(e) => e,
    };
    if !config.fallback {
        return Err(primary);
    }

    tracing::warn!(error = %primary, "Primary bind failed, trying loopback fallback");
    for address in FALLBACK_ADDRESSES {
        match bind(address).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::debug!(error = %e, "Fallback bind failed"),
        }
    }
    Err(primary)
}

async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = address.parse().map_err(|source| ListenerError::Address {
        address: address.to_string(),
        source,
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
        address: address.to_string(),
        source,
    })?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(address = %local, "Listener bound");
    }
    Ok(listener)
}

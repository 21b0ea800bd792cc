//! TCP listener binding.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
}

/// Parse `address` without binding.
pub fn parse_address(address: &str) -> Result<SocketAddr, ListenerError> {
    address
        .parse()
        .map_err(|source| ListenerError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

/// Bind a listener on `address` (`host:port`, port 0 for ephemeral).
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse_address(address)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind {
            address: addr,
            source,
        })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind {
            address: addr,
            source,
        })?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}

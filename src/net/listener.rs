//! TCP listener implementation.
//!
//! # Responsibilities
//! - Bind to the configured host and port
//! - Accept incoming TCP connections
//! - Report "address already in use" distinctly from other bind failures

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

/// Error returned when binding the listener fails.
#[derive(Debug, Error)]
pub enum BindError {
    /// Another process already listens on the address.
    #[error("Address {address} already in use")]
    AddrInUse {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Error type for operations on a bound listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] io::Error),
}

/// A bound TCP listener.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to `host:port`. Host names are resolved; the first address that
    /// binds wins.
    pub async fn bind(host: &str, port: u16) -> Result<Self, BindError> {
        let address = format!("{}:{}", host, port);
        let inner = TcpListener::bind((host, port)).await.map_err(|source| {
            if source.kind() == io::ErrorKind::AddrInUse {
                tracing::error!(address = %address, "Address already in use");
                BindError::AddrInUse {
                    address: address.clone(),
                    source,
                }
            } else {
                BindError::Io {
                    address: address.clone(),
                    source,
                }
            }
        })?;

        let local_addr = inner.local_addr().map_err(|source| BindError::Io {
            address: address.clone(),
            source,
        })?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_addr_in_use() {
        let first = Listener::bind("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().port();

        let err = Listener::bind("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, BindError::AddrInUse { .. }));
        assert!(err.to_string().contains("already in use"));
    }

    #[tokio::test]
    async fn test_accept() {
        let listener = Listener::bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (_stream, peer) = listener.accept().await.unwrap();
        let client = client.await.unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
    }
}

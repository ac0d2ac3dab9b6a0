//! TCP listener implementation.
//!
//! # Responsibilities
//! - Bind to configured address
//! - Accept incoming TCP connections
//! - Tell transient accept failures apart from fatal ones
//!
//! # Design Decisions
//! - No connection limit: every accepted socket gets its own task
//! - The listener knows which transport it serves so it can name its root URL

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::endpoint::TransportKind;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] io::Error),
}

impl ListenerError {
    /// True when the accept loop may keep going after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            ListenerError::Accept(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ),
            ListenerError::Bind { .. } => false,
        }
    }
}

/// A TCP listener serving one transport kind.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Transport spoken on accepted sockets.
    transport: TransportKind,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to `address` for connections of the given transport.
    pub async fn bind(address: &str, transport: TransportKind) -> Result<Self, ListenerError> {
        let bind_error = |source: io::Error| ListenerError::Bind {
            address: address.to_string(),
            source,
        };

        let addr: SocketAddr = address
            .parse()
            .map_err(|e| bind_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let inner = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = inner.local_addr().map_err(bind_error)?;

        tracing::info!(address = %local_addr, %transport, "Listener bound");

        Ok(Self {
            inner,
            transport,
            local_addr,
        })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, transport = %self.transport, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// `ws://host:port` or `wss://host:port` for this listener.
    ///
    /// `advertised` replaces the bound IP; IPv6 literals are bracketed.
    pub fn root_url(&self, advertised: Option<&str>) -> String {
        let port = self.local_addr.port();
        match advertised {
            Some(host) if host.contains(':') && !host.starts_with('[') => {
                format!("{}://[{host}]:{port}", self.transport.scheme())
            }
            Some(host) => format!("{}://{host}:{port}", self.transport.scheme()),
            None => format!("{}://{}", self.transport.scheme(), self.local_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_bind_reports_root_url() {
        let listener = Listener::bind("127.0.0.1:0", TransportKind::Encrypted).await.unwrap();
        let port = listener.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(listener.root_url(None), format!("wss://127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn advertised_host_replaces_the_bound_ip() {
        let listener = Listener::bind("0.0.0.0:0", TransportKind::Plain).await.unwrap();
        let port = listener.local_addr().port();
        assert_eq!(listener.root_url(Some("localhost")), format!("ws://localhost:{port}"));
        assert_eq!(listener.root_url(Some("::1")), format!("ws://[::1]:{port}"));
    }

    #[tokio::test]
    async fn bad_address_is_a_bind_error() {
        let err = Listener::bind("not-an-address", TransportKind::Plain).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn accepts_connections() {
        let listener = Listener::bind("127.0.0.1:0", TransportKind::Plain).await.unwrap();
        let addr = listener.local_addr();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await });

        let (_stream, peer) = listener.accept().await.unwrap();
        let client = client.await.unwrap().unwrap();
        assert_eq!(client.local_addr().unwrap(), peer);
    }

    #[test]
    fn aborted_accepts_are_transient() {
        let err = ListenerError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(err.is_transient());
        let err = ListenerError::Accept(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_transient());
    }
}

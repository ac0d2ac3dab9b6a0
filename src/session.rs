//! Transport-polymorphic WebSocket session.
//!
//! # Responsibilities
//! - Own exactly one of a plaintext or TLS socket
//! - Run the client upgrade handshake on whichever transport is live
//! - Offer send/receive/close without callers branching on transport
//!
//! # Data Flow
//! ```text
//! TcpStream ──────────────────────┐
//!                                 ├─▶ Transport ──upgrade──▶ Session
//! TcpStream ─▶ TLS handshake ─────┘        │
//!                                          └─ refused ─▶ HandshakeResponse
//! ```
//!
//! # Design Decisions
//! - Both types are closed two-variant enums; every operation matches on
//!   the variant and delegates to a helper generic over the stream
//! - `close` consumes the session, so it can only run once

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use rustls::ClientConnection;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, Response, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{client_async, WebSocketStream};

use crate::endpoint::{Endpoint, TransportKind};
use crate::error::{Error, Result};

/// A connected socket that has not been upgraded yet.
pub enum Transport {
    Plain(TcpStream),
    Encrypted(TlsStream<TcpStream>),
}

/// Outcome of one upgrade attempt.
#[derive(Debug)]
pub enum Handshake {
    /// The peer answered 101 Switching Protocols.
    Accepted(Session),
    /// The peer answered with some other status.
    Refused(HandshakeResponse),
}

/// The parts of a non-101 handshake response the connector acts on.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

impl HandshakeResponse {
    fn from_http(response: &Response<Option<Vec<u8>>>) -> Self {
        Self {
            status: response.status(),
            location: response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body: response
                .body()
                .as_deref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_default(),
        }
    }

    /// True for the statuses that may carry a `Location` to follow.
    pub fn is_redirect(&self) -> bool {
        matches!(
            self.status,
            StatusCode::MULTIPLE_CHOICES
                | StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT
        )
    }
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Plain(_) => TransportKind::Plain,
            Self::Encrypted(_) => TransportKind::Encrypted,
        }
    }

    /// The raw TCP socket under any TLS layer.
    pub fn underlying_socket(&self) -> &TcpStream {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Encrypted(tls) => tls.get_ref().0,
        }
    }

    /// The TLS connection state, if this transport is encrypted.
    pub fn encryption_context(&self) -> Option<&ClientConnection> {
        match self {
            Self::Plain(_) => None,
            Self::Encrypted(tls) => Some(tls.get_ref().1),
        }
    }

    /// Send the upgrade request for `endpoint` and read the response.
    ///
    /// A non-101 answer is returned as [`Handshake::Refused`], not as an
    /// error; only socket and protocol failures are errors here.
    pub async fn upgrade(self, endpoint: &Endpoint) -> Result<Handshake> {
        let request = endpoint
            .handshake_url()
            .into_client_request()
            .map_err(|e| Error::from_ws("building the upgrade request", e))?;

        match self {
            Self::Plain(tcp) => settle(client_async(request, tcp).await, Session::Plain),
            Self::Encrypted(tls) => settle(client_async(request, tls).await, Session::Encrypted),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .field("peer", &self.underlying_socket().peer_addr().ok())
            .finish()
    }
}

fn settle<S>(
    result: std::result::Result<(WebSocketStream<S>, Response<Option<Vec<u8>>>), WsError>,
    wrap: fn(WebSocketStream<S>) -> Session,
) -> Result<Handshake> {
    match result {
        Ok((ws, response)) => {
            tracing::debug!(status = %response.status(), "Upgrade accepted");
            Ok(Handshake::Accepted(wrap(ws)))
        }
        Err(WsError::Http(response)) => Ok(Handshake::Refused(HandshakeResponse::from_http(&response))),
        Err(e) => Err(Error::from_ws("upgrading", e)),
    }
}

/// An upgraded, bidirectional message session.
pub enum Session {
    Plain(WebSocketStream<TcpStream>),
    Encrypted(WebSocketStream<TlsStream<TcpStream>>),
}

impl Session {
    pub fn transport_kind(&self) -> TransportKind {
        match self {
            Self::Plain(_) => TransportKind::Plain,
            Self::Encrypted(_) => TransportKind::Encrypted,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.transport_kind() == TransportKind::Encrypted
    }

    /// The raw TCP socket under the framing and any TLS layer.
    pub fn underlying_socket(&self) -> &TcpStream {
        match self {
            Self::Plain(ws) => ws.get_ref(),
            Self::Encrypted(ws) => ws.get_ref().get_ref().0,
        }
    }

    /// The TLS connection state, if this session is encrypted.
    pub fn encryption_context(&self) -> Option<&ClientConnection> {
        match self {
            Self::Plain(_) => None,
            Self::Encrypted(ws) => Some(ws.get_ref().get_ref().1),
        }
    }

    /// Send `message` as a single text frame. Returns the payload size.
    pub async fn send_text(&mut self, message: &str) -> Result<usize> {
        match self {
            Self::Plain(ws) => send_text(ws, message).await,
            Self::Encrypted(ws) => send_text(ws, message).await,
        }
    }

    /// Wait for the next data frame and return its text.
    pub async fn receive_text(&mut self) -> Result<String> {
        match self {
            Self::Plain(ws) => receive_text(ws).await,
            Self::Encrypted(ws) => receive_text(ws).await,
        }
    }

    /// Run the closing handshake and release the socket.
    pub async fn close(self, code: CloseCode, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        match self {
            Self::Plain(ws) => close(ws, frame).await,
            Self::Encrypted(ws) => close(ws, frame).await,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("kind", &self.transport_kind())
            .field("peer", &self.underlying_socket().peer_addr().ok())
            .finish()
    }
}

async fn send_text<S>(ws: &mut WebSocketStream<S>, message: &str) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.send(Message::text(message.to_string()))
        .await
        .map_err(|e| Error::from_ws("sending", e))?;
    Ok(message.len())
}

async fn receive_text<S>(ws: &mut WebSocketStream<S>) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = match ws.next().await {
            Some(message) => message.map_err(|e| Error::from_ws("receiving", e))?,
            None => return Err(Error::closed("receiving")),
        };

        match message {
            Message::Text(text) => return Ok(text.as_str().to_string()),
            // tungstenite answers pings itself
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(frame) => {
                tracing::debug!(?frame, "Peer closed the session");
                return Err(Error::closed("receiving"));
            }
            Message::Binary(_) | Message::Frame(_) => {
                return Err(Error::Protocol {
                    detail: "expected a text frame, received binary data".to_string(),
                    source: None,
                })
            }
        }
    }
}

async fn close<S>(mut ws: WebSocketStream<S>, frame: CloseFrame) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.close(Some(frame))
        .await
        .map_err(|e| Error::from_ws("closing", e))?;

    // Drain until the peer's close reply ends the stream.
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Close(reply)) => tracing::debug!(?reply, "Close acknowledged"),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Stream ended during close");
                break;
            }
        }
    }

    // For TLS this sends close_notify before shutting down the TCP socket.
    match ws.get_mut().shutdown().await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(Error::transport("shutting down", e)),
    }
}

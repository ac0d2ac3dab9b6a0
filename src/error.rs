//! Error types for connection establishment and the responder.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Socket | [`Error::Transport`], [`Error::Timeout`] |
//! | TLS | [`Error::EncryptionHandshake`], [`Error::Tls`] |
//! | Handshake | [`Error::Protocol`], [`Error::UpgradeRejected`] |
//! | Redirects | [`Error::MalformedRedirect`], [`Error::TooManyRedirects`] |
//! | Addressing | [`Error::InvalidUrl`], [`Error::UnsupportedScheme`], [`Error::MissingHost`] |
//! | Responder | [`Error::Http`] |
//!
//! Every variant that wraps a lower-level failure exposes it through
//! [`std::error::Error::source`]. Use [`Report`] to print the whole chain.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::Url;

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level I/O failure, including a peer that went away.
    #[error("transport failure while {action}")]
    Transport {
        /// What the caller was doing when the socket failed.
        action: &'static str,
        #[source]
        source: io::Error,
    },

    /// TLS negotiation failed. Never treated as a redirect signal.
    #[error("tls handshake with {host} failed")]
    EncryptionHandshake {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Malformed or unexpected frame or handshake response.
    #[error("protocol violation: {detail}")]
    Protocol {
        detail: String,
        #[source]
        source: Option<WsError>,
    },

    /// Redirect status without a usable `Location` header.
    #[error("redirect {status} from {url} carries no usable Location")]
    MalformedRedirect { url: Url, status: StatusCode },

    /// The redirect chain grew past the configured limit.
    #[error("more than {limit} redirects, the last one pointed to {location}")]
    TooManyRedirects { limit: u32, location: Url },

    /// The peer answered the upgrade with neither 101 nor a redirect.
    #[error("upgrade rejected by {url} with status {status}")]
    UpgradeRejected {
        url: Url,
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },

    #[error("invalid url `{input}`")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("url `{0}` has no host")]
    MissingHost(Url),

    /// A connection attempt did not finish before its deadline.
    #[error("connecting to {url} did not complete within {timeout:?}")]
    Timeout { url: Url, timeout: Duration },

    /// TLS material was rejected while building a rustls config.
    #[error("tls configuration rejected")]
    Tls(#[from] rustls::Error),

    /// HTTP serving failed on an accepted connection.
    #[error("serving http connection failed")]
    Http(#[from] hyper::Error),
}

impl Error {
    /// Build a [`Error::Transport`] from an I/O error.
    pub fn transport(action: &'static str, source: io::Error) -> Self {
        Self::Transport { action, source }
    }

    /// Transport error for a peer that closed the session.
    pub fn closed(action: &'static str) -> Self {
        Self::transport(
            action,
            io::Error::new(io::ErrorKind::ConnectionAborted, "session closed by peer"),
        )
    }

    /// Classify a WebSocket error.
    ///
    /// I/O and closed-connection errors are transport failures, everything
    /// else is a protocol violation.
    pub fn from_ws(action: &'static str, err: WsError) -> Self {
        match err {
            WsError::Io(source) => Self::transport(action, source),
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::closed(action),
            other => Self::Protocol {
                detail: format!("websocket failure while {action}"),
                source: Some(other),
            },
        }
    }
}

/// Renders an error and its causes, root cause first, then each wrapping
/// layer outwards.
pub struct Report<'a>(pub &'a (dyn std::error::Error + 'static));

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut layers = vec![self.0];
        let mut cause = self.0.source();
        while let Some(inner) = cause {
            layers.push(inner);
            cause = inner.source();
        }

        for (depth, layer) in layers.iter().rev().enumerate() {
            if depth > 0 {
                f.write_str("\n  while: ")?;
            }
            write!(f, "{layer}")?;
        }
        Ok(())
    }
}

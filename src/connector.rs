//! Redirect-following WebSocket connector.
//!
//! # Responsibilities
//! - Resolve a URL into an endpoint and open a socket to it
//! - Negotiate TLS when the endpoint calls for it
//! - Attempt the upgrade and follow redirects up to a limit
//!
//! # State Machine
//! ```text
//! Resolving → Connecting → Encrypting (wss only) → Upgrading
//!     Upgrading → Connected                     (101)
//!     Upgrading → Redirected → Resolving        (3xx + Location, count <= limit)
//!     Upgrading → Failed                        (everything else)
//! ```
//!
//! # Design Decisions
//! - One hop is a single function call; the redirect loop owns the count
//! - Every hop gets a fresh socket, the previous one is dropped
//! - TLS handshake failures are fatal and never interpreted as redirects
//! - An optional per-hop deadline covers connect, TLS and upgrade together

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::config::ClientSettings;
use crate::endpoint::{parse_start_url, resolve_location, Endpoint, TransportKind};
use crate::error::{Error, Result};
use crate::session::{Handshake, HandshakeResponse, Session, Transport};

/// Redirects followed when the caller does not say otherwise.
pub const DEFAULT_REDIRECT_LIMIT: u32 = 5;

/// Establish a session to `start_url`, following at most `redirect_limit`
/// redirects.
pub async fn connect(tls: Arc<ClientConfig>, start_url: &str, redirect_limit: u32) -> Result<Session> {
    Connector::new(tls)
        .with_redirect_limit(redirect_limit)
        .connect(start_url)
        .await
}

/// Position in a redirect chain.
#[derive(Debug, Clone)]
pub struct RedirectChain {
    current: Url,
    count: u32,
    limit: u32,
}

impl RedirectChain {
    pub fn new(start: Url, limit: u32) -> Self {
        Self {
            current: start,
            count: 0,
            limit,
        }
    }

    pub fn current(&self) -> &Url {
        &self.current
    }

    /// Redirects followed so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Move to `next`, failing once more than `limit` redirects were seen.
    pub fn advance(&mut self, next: Url) -> Result<()> {
        self.count += 1;
        if self.count > self.limit {
            return Err(Error::TooManyRedirects {
                limit: self.limit,
                location: next,
            });
        }
        self.current = next;
        Ok(())
    }
}

/// Result of one hop.
#[derive(Debug)]
enum Hop {
    Connected(Session),
    Redirected(Url),
}

/// Opens WebSocket sessions, following redirects.
#[derive(Clone)]
pub struct Connector {
    tls: TlsConnector,
    redirect_limit: u32,
    hop_timeout: Option<Duration>,
}

impl Connector {
    /// Create a connector using `tls` for every encrypted hop.
    pub fn new(tls: Arc<ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(tls),
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            hop_timeout: None,
        }
    }

    /// Create a connector from the `[client]` configuration section.
    pub fn from_config(tls: Arc<ClientConfig>, settings: &ClientSettings) -> Self {
        Self::new(tls)
            .with_redirect_limit(settings.redirect_limit)
            .with_hop_timeout(settings.hop_timeout_secs.map(Duration::from_secs))
    }

    pub fn with_redirect_limit(mut self, limit: u32) -> Self {
        self.redirect_limit = limit;
        self
    }

    /// Deadline for each hop's connect, TLS and upgrade steps combined.
    pub fn with_hop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hop_timeout = timeout;
        self
    }

    pub fn redirect_limit(&self) -> u32 {
        self.redirect_limit
    }

    /// Connect to `start_url` and follow redirects until a session is
    /// established or the chain fails.
    pub async fn connect(&self, start_url: &str) -> Result<Session> {
        let mut chain = RedirectChain::new(parse_start_url(start_url)?, self.redirect_limit);

        loop {
            tracing::info!(url = %chain.current(), redirects = chain.count(), "Attempting connection");
            match self.attempt(chain.current()).await? {
                Hop::Connected(session) => {
                    tracing::info!(
                        url = %chain.current(),
                        redirects = chain.count(),
                        transport = %session.transport_kind(),
                        "Session established"
                    );
                    return Ok(session);
                }
                Hop::Redirected(next) => {
                    tracing::info!(from = %chain.current(), to = %next, "Following redirect");
                    chain.advance(next)?;
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<Hop> {
        match self.hop_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.hop(url))
                .await
                .map_err(|_| Error::Timeout {
                    url: url.clone(),
                    timeout,
                })?,
            None => self.hop(url).await,
        }
    }

    async fn hop(&self, url: &Url) -> Result<Hop> {
        let endpoint = Endpoint::from_url(url)?;
        let tcp = open_socket(&endpoint).await?;

        let transport = match endpoint.transport {
            TransportKind::Plain => Transport::Plain(tcp),
            TransportKind::Encrypted => Transport::Encrypted(self.encrypt(&endpoint, tcp).await?),
        };
        if let Some(tls) = transport.encryption_context() {
            tracing::debug!(
                host = %endpoint.host,
                version = ?tls.protocol_version(),
                "TLS negotiated"
            );
        }

        tracing::debug!(request_target = %endpoint.target, "Sending upgrade request");
        match transport.upgrade(&endpoint).await? {
            Handshake::Accepted(session) => Ok(Hop::Connected(session)),
            Handshake::Refused(response) => next_hop(url, response).map(Hop::Redirected),
        }
    }

    async fn encrypt(&self, endpoint: &Endpoint, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let handshake_failed = |source: std::io::Error| Error::EncryptionHandshake {
            host: endpoint.host.clone(),
            source,
        };

        // Also the SNI value for virtual-hosted endpoints.
        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|e| handshake_failed(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        self.tls.connect(server_name, tcp).await.map_err(handshake_failed)
    }
}

/// Connect to the first reachable address the host resolves to.
async fn open_socket(endpoint: &Endpoint) -> Result<TcpStream> {
    let candidates = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| Error::transport("resolving", e))?;

    let mut last_error = None;
    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!(peer = %addr, "Socket connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(peer = %addr, error = %e, "Candidate unreachable");
                last_error = Some(e);
            }
        }
    }

    Err(Error::transport(
        "connecting",
        last_error.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", endpoint.host),
            )
        }),
    ))
}

/// Decide where a refused handshake sends us next.
fn next_hop(url: &Url, response: HandshakeResponse) -> Result<Url> {
    tracing::debug!(status = %response.status, location = ?response.location, "Upgrade refused");

    if !response.is_redirect() {
        return Err(Error::UpgradeRejected {
            url: url.clone(),
            status: response.status,
            body: response.body,
        });
    }

    let malformed = || Error::MalformedRedirect {
        url: url.clone(),
        status: response.status,
    };
    let location = response.location.as_deref().ok_or_else(malformed)?;
    resolve_location(url, location).map_err(|_| malformed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::http::StatusCode;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn response(status: u16, location: Option<&str>) -> HandshakeResponse {
        HandshakeResponse {
            status: StatusCode::from_u16(status).unwrap(),
            location: location.map(str::to_string),
            body: "nope".to_string(),
        }
    }

    #[test]
    fn chain_allows_exactly_limit_redirects() {
        let mut chain = RedirectChain::new(url("ws://a/websocket-3"), 2);
        chain.advance(url("ws://a/websocket-2")).unwrap();
        chain.advance(url("ws://a/websocket-1")).unwrap();
        assert_eq!(chain.count(), 2);

        let err = chain.advance(url("ws://a/websocket-0")).unwrap_err();
        assert!(matches!(err, Error::TooManyRedirects { limit: 2, .. }));
        assert_eq!(chain.current().path(), "/websocket-1");
    }

    #[test]
    fn zero_limit_rejects_first_redirect() {
        let mut chain = RedirectChain::new(url("ws://a/"), 0);
        assert!(chain.advance(url("ws://b/")).is_err());
    }

    #[test]
    fn redirect_location_is_resolved() {
        let next = next_hop(&url("ws://127.0.0.1:80/websocket-4"), response(301, Some("wss://127.0.0.1:443/websocket-4")))
            .unwrap();
        assert_eq!(next.scheme(), "wss");

        let relative = next_hop(&url("wss://h:9/websocket-2/x"), response(307, Some("/websocket-1/x"))).unwrap();
        assert_eq!(relative.as_str(), "wss://h:9/websocket-1/x");
    }

    #[test]
    fn redirect_without_location_is_malformed() {
        let err = next_hop(&url("ws://h/"), response(302, None)).unwrap_err();
        assert!(matches!(err, Error::MalformedRedirect { status, .. } if status == StatusCode::FOUND));
    }

    #[test]
    fn other_statuses_are_rejections() {
        let err = next_hop(&url("ws://h/"), response(404, Some("/ignored"))).unwrap_err();
        match err {
            Error::UpgradeRejected { status, body, .. } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn builder_applies_settings() {
        let tls = crate::net::tls::TrustStore::new().client_config().unwrap();
        let settings = ClientSettings {
            redirect_limit: 9,
            hop_timeout_secs: Some(3),
            ..ClientSettings::default()
        };
        let connector = Connector::from_config(tls, &settings);
        assert_eq!(connector.redirect_limit(), 9);
        assert_eq!(connector.hop_timeout, Some(Duration::from_secs(3)));
    }
}

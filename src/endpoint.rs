//! URL resolution helpers.
//!
//! # Responsibilities
//! - Infer a scheme for scheme-less start URLs
//! - Map URL schemes to a transport kind and default port
//! - Extract the request target (path and query) for the upgrade request
//! - Resolve redirect `Location` values against the current URL
//!
//! # Design Decisions
//! - URL grammar is left to the `url` crate; this module only interprets it
//! - `http`/`https` are accepted as aliases of `ws`/`wss` so that ordinary
//!   web redirects can be followed
//! - Fragments never reach the wire

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// Whether bytes go to the socket as-is or through TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Plain,
    Encrypted,
}

impl TransportKind {
    /// Transport implied by a URL scheme.
    pub fn from_scheme(scheme: &str) -> Result<Self> {
        match scheme {
            "ws" | "http" => Ok(Self::Plain),
            "wss" | "https" => Ok(Self::Encrypted),
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }

    /// Port used when the URL does not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Plain => 80,
            Self::Encrypted => 443,
        }
    }

    /// WebSocket scheme spoken on this transport.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "ws",
            Self::Encrypted => "wss",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Encrypted => f.write_str("tls"),
        }
    }
}

/// Everything needed to open one hop's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Request target sent in the upgrade request.
    pub target: String,
}

impl Endpoint {
    /// Derive the endpoint for a (possibly `http(s)`) URL.
    pub fn from_url(url: &Url) -> Result<Self> {
        let transport = TransportKind::from_scheme(url.scheme())?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::MissingHost(url.clone())),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or_else(|| transport.default_port()),
            transport,
            target: request_target(url),
        })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The `ws(s)://` URL handed to the upgrade handshake.
    pub fn handshake_url(&self) -> String {
        format!("{}://{}{}", self.transport.scheme(), self.authority(), self.target)
    }
}

/// Parse the connector's starting URL.
///
/// Input without a leading `scheme://` is treated as `ws://`, or `wss://`
/// when it names port 443.
pub fn parse_start_url(input: &str) -> Result<Url> {
    let invalid = |source| Error::InvalidUrl {
        input: input.to_string(),
        source,
    };

    if has_scheme(input) {
        return Url::parse(input).map_err(invalid);
    }

    let url = Url::parse(&format!("ws://{input}")).map_err(invalid)?;
    if url.port() == Some(443) {
        return Url::parse(&format!("wss://{input}")).map_err(invalid);
    }
    Ok(url)
}

/// True when `input` opens with `scheme://`. A `://` later on, say inside
/// the query, does not count.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Path plus optional query, with scheme, authority and fragment removed.
pub fn request_target(url: &Url) -> String {
    let path = match url.path() {
        "" => "/",
        path => path,
    };
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

/// Resolve a `Location` header value against the URL that produced it.
///
/// Relative references resolve against `base`; absolute ones replace it,
/// scheme and authority included.
pub fn resolve_location(base: &Url, location: &str) -> Result<Url> {
    base.join(location.trim()).map_err(|source| Error::InvalidUrl {
        input: location.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn default_ports_follow_scheme() {
        let plain = Endpoint::from_url(&url("ws://example.com/chat")).unwrap();
        assert_eq!(plain.port, 80);
        assert_eq!(plain.transport, TransportKind::Plain);

        let tls = Endpoint::from_url(&url("https://example.com")).unwrap();
        assert_eq!(tls.port, 443);
        assert_eq!(tls.transport, TransportKind::Encrypted);
        assert_eq!(tls.target, "/");
    }

    #[test]
    fn explicit_port_wins() {
        let ep = Endpoint::from_url(&url("wss://127.0.0.1:8443/websocket-3")).unwrap();
        assert_eq!(ep.authority(), "127.0.0.1:8443");
        assert_eq!(ep.handshake_url(), "wss://127.0.0.1:8443/websocket-3");
    }

    #[test]
    fn target_keeps_query_and_drops_fragment() {
        let ep = Endpoint::from_url(&url("ws://websocket.com/some/part.html?foo=bar#100")).unwrap();
        assert_eq!(ep.target, "/some/part.html?foo=bar");
    }

    #[test]
    fn ipv6_hosts_are_bracketed_only_in_authority() {
        let ep = Endpoint::from_url(&url("ws://[::1]:9000/x")).unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.authority(), "[::1]:9000");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = Endpoint::from_url(&url("ftp://example.com/")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn scheme_inferred_from_port() {
        assert_eq!(parse_start_url("example.com/a").unwrap().scheme(), "ws");
        assert_eq!(parse_start_url("example.com:8080/a").unwrap().scheme(), "ws");

        let tls = parse_start_url("example.com:443/a").unwrap();
        assert_eq!(tls.scheme(), "wss");
        assert_eq!(Endpoint::from_url(&tls).unwrap().port, 443);

        let nested = parse_start_url("example.com/login?next=http://other/").unwrap();
        assert_eq!(nested.as_str(), "ws://example.com/login?next=http://other/");
        let nested = parse_start_url("example.com:443/a#ws://b").unwrap();
        assert_eq!(nested.scheme(), "wss");

        assert_eq!(parse_start_url("wss://example.com/a").unwrap().scheme(), "wss");
        assert!(matches!(
            parse_start_url("ftp://example.com/").map(|u| u.scheme().to_string()),
            Ok(scheme) if scheme == "ftp"
        ));
    }

    #[test]
    fn relative_location_resolves_against_base() {
        let base = url("wss://127.0.0.1:9000/websocket-3/room");
        let next = resolve_location(&base, "/websocket-2/room").unwrap();
        assert_eq!(next.as_str(), "wss://127.0.0.1:9000/websocket-2/room");

        let sibling = resolve_location(&base, "lobby").unwrap();
        assert_eq!(sibling.as_str(), "wss://127.0.0.1:9000/websocket-3/lobby");
    }

    #[test]
    fn absolute_location_replaces_base() {
        let base = url("ws://127.0.0.1:8080/websocket-4");
        let next = resolve_location(&base, "wss://localhost:8443/websocket-4").unwrap();
        assert_eq!(next.scheme(), "wss");
        assert_eq!(next.host_str(), Some("localhost"));
        assert_eq!(next.port(), Some(8443));
    }
}

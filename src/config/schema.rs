//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section is defaulted, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Test responder listeners and path grammar.
    pub responder: ResponderConfig,

    /// Certificate provisioning and client trust.
    pub tls: TlsConfig,

    /// Connector behaviour and the demo exchange.
    pub client: ClientSettings,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Responder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Bind address of the plaintext listener (e.g., "127.0.0.1:0").
    pub plain_address: String,

    /// Bind address of the TLS listener.
    pub secure_address: String,

    /// Literal in front of the redirect index: `/<prefix>-<N>`.
    pub path_prefix: String,

    /// Host written into redirect URLs and the chain start URL. Defaults
    /// to the bound IP; required when binding an unspecified address.
    pub advertised_host: Option<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            plain_address: "127.0.0.1:0".to_string(),
            secure_address: "127.0.0.1:0".to_string(),
            path_prefix: "websocket".to_string(),
            advertised_host: None,
        }
    }
}

/// TLS configuration for both roles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the server certificate chain (PEM).
    pub cert_path: Option<String>,

    /// Path to the server private key (PEM).
    pub key_path: Option<String>,

    /// Extra CA certificates the client trusts (PEM).
    pub ca_path: Option<String>,

    /// Whether the client also trusts the platform's root store.
    pub native_roots: bool,

    /// Subject names for the generated certificate when no files are set.
    pub self_signed_names: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            ca_path: None,
            native_roots: true,
            self_signed_names: vec!["localhost".to_string(), "127.0.0.1".to_string()],
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Starting URL. Derived from the plaintext listener when unset.
    pub url: Option<String>,

    /// Redirect index requested when `url` is derived.
    pub start_index: u32,

    /// Redirects followed before giving up.
    pub redirect_limit: u32,

    /// Deadline per hop in seconds; unset means no deadline.
    pub hop_timeout_secs: Option<u64>,

    /// Messages sent and expected back, in order.
    pub messages: Vec<String>,

    /// Reason given in the close frame.
    pub close_reason: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: None,
            start_index: 4,
            redirect_limit: 6,
            hop_timeout_secs: Some(30),
            messages: vec!["Hello, ".to_string(), "World!\n".to_string()],
            close_reason: "thanks for the chat!".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "ws_redirect=info".to_string(),
        }
    }
}

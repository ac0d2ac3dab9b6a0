//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the path prefix and numeric ranges
//! - Check that TLS certificate and key are configured together
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, address) in [
        ("responder.plain_address", &config.responder.plain_address),
        ("responder.secure_address", &config.responder.secure_address),
    ] {
        match address.parse::<SocketAddr>() {
            Err(_) => {
                errors.push(ValidationError::new(field, format!("`{address}` is not a socket address")));
            }
            // Redirects would point clients at 0.0.0.0 or [::]
            Ok(addr) if addr.ip().is_unspecified() && config.responder.advertised_host.is_none() => {
                errors.push(ValidationError::new(
                    field,
                    format!("`{address}` is unspecified, set responder.advertised_host"),
                ));
            }
            Ok(_) => {}
        }
    }

    let prefix = &config.responder.path_prefix;
    if prefix.is_empty() {
        errors.push(ValidationError::new("responder.path_prefix", "must not be empty"));
    } else if prefix.contains('/') || prefix.contains('?') || prefix.contains('#') {
        errors.push(ValidationError::new(
            "responder.path_prefix",
            "must not contain '/', '?' or '#'",
        ));
    }

    if let Some(host) = &config.responder.advertised_host {
        if host.is_empty() || host.contains(['/', '?', '#', '@']) {
            errors.push(ValidationError::new(
                "responder.advertised_host",
                format!("`{host}` is not a host name or address"),
            ));
        }
    }

    if config.tls.cert_path.is_some() != config.tls.key_path.is_some() {
        errors.push(ValidationError::new(
            "tls",
            "cert_path and key_path must be set together",
        ));
    }
    if config.tls.cert_path.is_none() && config.tls.self_signed_names.is_empty() {
        errors.push(ValidationError::new(
            "tls.self_signed_names",
            "needs at least one name when no certificate is configured",
        ));
    }

    if config.client.hop_timeout_secs == Some(0) {
        errors.push(ValidationError::new("client.hop_timeout_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

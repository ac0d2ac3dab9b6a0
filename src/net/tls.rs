//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load server certificate chains and keys from PEM files
//! - Generate an ephemeral self-signed certificate when none is configured
//! - Build the client trust store (system roots plus extra CA certificates)
//!
//! # Design Decisions
//! - rustls with the ring provider for both roles
//! - Configs are built once and shared behind `Arc`; nothing mutates them
//!   after startup

use std::fs::File;
use std::io::{self, BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::config::TlsConfig;
use crate::error::Result;

/// PEM-encoded certificate chain and private key.
#[derive(Debug, Clone)]
pub struct PemMaterial {
    pub cert_pem: String,
    pub key_pem: String,
}

impl PemMaterial {
    /// Generate a self-signed certificate valid for `names`.
    ///
    /// IP literals among `names` become IP subject alternative names.
    pub fn self_signed(names: &[String]) -> std::result::Result<Self, rcgen::Error> {
        let certified = rcgen::generate_simple_self_signed(names.to_vec())?;
        Ok(Self {
            cert_pem: certified.cert.pem(),
            key_pem: certified.key_pair.serialize_pem(),
        })
    }

    /// Read certificate and key files from disk.
    pub fn from_files(cert_path: &Path, key_path: &Path) -> io::Result<Self> {
        for path in [cert_path, key_path] {
            if !path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("TLS file not found: {:?}", path),
                ));
            }
        }
        Ok(Self {
            cert_pem: std::fs::read_to_string(cert_path)?,
            key_pem: std::fs::read_to_string(key_path)?,
        })
    }

    pub fn certificates(&self) -> io::Result<Vec<CertificateDer<'static>>> {
        rustls_pemfile::certs(&mut Cursor::new(self.cert_pem.as_bytes())).collect()
    }

    pub fn private_key(&self) -> io::Result<PrivateKeyDer<'static>> {
        rustls_pemfile::private_key(&mut Cursor::new(self.key_pem.as_bytes()))?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "no private key found in PEM data")
        })
    }

    /// Server-side config presenting this certificate.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let certs = self.certificates().map_err(invalid_material)?;
        let key = self.private_key().map_err(invalid_material)?;
        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Arc::new(config))
    }
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn invalid_material(e: io::Error) -> rustls::Error {
    rustls::Error::General(format!("unreadable PEM material: {e}"))
}

/// Builds the client trust store.
#[derive(Debug)]
pub struct TrustStore {
    roots: RootCertStore,
}

impl TrustStore {
    pub fn new() -> Self {
        Self {
            roots: RootCertStore::empty(),
        }
    }

    /// Add every certificate the platform trusts. Unparsable entries are
    /// skipped.
    pub fn with_native_roots(mut self) -> Self {
        let loaded = rustls_native_certs::load_native_certs();
        for error in &loaded.errors {
            tracing::warn!(error = %error, "Skipping unreadable native root");
        }
        let (added, ignored) = self.roots.add_parsable_certificates(loaded.certs);
        tracing::debug!(added, ignored, "Native roots loaded");
        self
    }

    /// Trust the given certificates in addition to anything already added.
    pub fn with_certificates(mut self, certs: Vec<CertificateDer<'static>>) -> Self {
        let (added, ignored) = self.roots.add_parsable_certificates(certs);
        tracing::debug!(added, ignored, "Extra roots loaded");
        self
    }

    /// Trust every certificate in a PEM file.
    pub fn with_ca_file(self, path: &Path) -> io::Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let certs = rustls_pemfile::certs(&mut reader).collect::<io::Result<Vec<_>>>()?;
        Ok(self.with_certificates(certs))
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn client_config(self) -> Result<Arc<ClientConfig>> {
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.roots)
            .with_no_client_auth();
        Ok(Arc::new(config))
    }
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Server and client TLS contexts for one process.
#[derive(Debug, Clone)]
pub struct TlsContexts {
    pub server: Arc<ServerConfig>,
    pub client: Arc<ClientConfig>,
}

impl TlsContexts {
    /// Build both contexts from configuration.
    ///
    /// Without configured files a self-signed certificate is generated and
    /// the client is told to trust it.
    pub fn from_config(config: &TlsConfig) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let (material, generated) = match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => (PemMaterial::from_files(Path::new(cert), Path::new(key))?, false),
            _ => {
                tracing::info!(names = ?config.self_signed_names, "Generating self-signed certificate");
                (PemMaterial::self_signed(&config.self_signed_names)?, true)
            }
        };

        let mut trust = TrustStore::new();
        if config.native_roots {
            trust = trust.with_native_roots();
        }
        if let Some(ca) = &config.ca_path {
            trust = trust.with_ca_file(Path::new(ca))?;
        }
        if generated {
            trust = trust.with_certificates(material.certificates()?);
        }
        if trust.is_empty() {
            tracing::warn!("Client trust store is empty, every TLS handshake will fail");
        }

        Ok(Self {
            server: material.server_config()?,
            client: trust.client_config()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["localhost".to_string(), "127.0.0.1".to_string()]
    }

    #[test]
    fn self_signed_material_parses() {
        let material = PemMaterial::self_signed(&names()).unwrap();
        assert_eq!(material.certificates().unwrap().len(), 1);
        assert!(material.private_key().is_ok());
        assert!(material.server_config().is_ok());
    }

    #[test]
    fn key_missing_from_pem_is_an_error() {
        let material = PemMaterial {
            cert_pem: String::new(),
            key_pem: "not pem".to_string(),
        };
        assert!(material.private_key().is_err());
        assert!(material.server_config().is_err());
    }

    #[test]
    fn missing_files_are_reported() {
        let err = PemMaterial::from_files(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn generated_certificate_is_trusted_by_client() {
        let config = TlsConfig {
            native_roots: false,
            ..TlsConfig::default()
        };
        assert!(TlsContexts::from_config(&config).is_ok());
    }

    #[test]
    fn trust_store_collects_extra_roots() {
        let trust = TrustStore::new();
        assert!(trust.is_empty());

        let material = PemMaterial::self_signed(&names()).unwrap();
        let trust = trust.with_certificates(material.certificates().unwrap());
        assert!(!trust.is_empty());
        assert!(trust.client_config().is_ok());
    }
}

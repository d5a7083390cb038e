//! TLS acceptor for the HTTP front-end
//!
//! Builds a rustls server config from PEM certificate and key files.

use crate::error::ProxyError;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

fn open(path: &Path) -> Result<BufReader<File>, ProxyError> {
    let file = File::open(path)
        .map_err(|e| ProxyError::Tls(format!("failed to open {}: {}", path.display(), e)))?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProxyError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            ProxyError::Tls(format!("failed to parse certificates from {}: {}", path.display(), e))
        })?;
    if certs.is_empty() {
        return Err(ProxyError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProxyError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| ProxyError::Tls(format!("failed to parse key from {}: {}", path.display(), e)))?
        .ok_or_else(|| ProxyError::Tls(format!("no private key found in {}", path.display())))
}

/// Build a TLS acceptor from a PEM certificate chain and private key
pub fn load_tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, ProxyError> {
    let certs = load_certs(cert)?;
    let key = load_key(key)?;

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

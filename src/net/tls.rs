//! TLS configuration and certificate loading.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Key/certificate pair for an HTTPS listener.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Path to the private key file (PEM).
    pub key_file_name: PathBuf,
    /// Path to the certificate chain file (PEM).
    pub cert_file_name: PathBuf,
}

/// Errors raised while building a TLS acceptor.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be opened or read.
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The certificate file held no certificates.
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    /// The key file held no private key.
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// rustls rejected the key/certificate pair.
    #[error("TLS configuration rejected")]
    Config(#[from] rustls::Error),
}

/// Load the PEM pair into an acceptor. Runs at bind time, so blocking file
/// reads are fine here.
pub fn load_tls_acceptor(options: &TlsOptions) -> Result<TlsAcceptor, TlsError> {
    let read_err = |path: &PathBuf| {
        let path = path.clone();
        move |source| TlsError::Read { path, source }
    };

    let certs: Vec<CertificateDer<'static>> = {
        let file = fs::File::open(&options.cert_file_name)
            .map_err(read_err(&options.cert_file_name))?;
        let mut reader = io::BufReader::new(file);
        rustls_pemfile::certs(&mut reader)
            .collect::<Result<_, _>>()
            .map_err(read_err(&options.cert_file_name))?
    };
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(options.cert_file_name.clone()));
    }

    let key: PrivateKeyDer<'static> = {
        let file =
            fs::File::open(&options.key_file_name).map_err(read_err(&options.key_file_name))?;
        let mut reader = io::BufReader::new(file);
        rustls_pemfile::private_key(&mut reader)
            .map_err(read_err(&options.key_file_name))?
            .ok_or_else(|| TlsError::NoPrivateKey(options.key_file_name.clone()))?
    };

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

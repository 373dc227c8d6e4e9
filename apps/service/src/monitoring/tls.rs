use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;
use tokio_rustls::TlsConnector;

use super::types::Service;

#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("client certificate configured without a key")]
    MissingKey,
    #[error("invalid server name {0}")]
    ServerName(String),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

pub fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Root store holding the bundled webpki roots
pub fn webpki_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

fn open(path: &str) -> Result<BufReader<File>, TlsSetupError> {
    File::open(Path::new(path))
        .map(BufReader::new)
        .map_err(|source| TlsSetupError::Read { path: path.to_string(), source })
}

pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, std::io::Error>>()
        .map_err(|source| TlsSetupError::Read { path: path.to_string(), source })?;

    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

pub fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, TlsSetupError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsSetupError::Read { path: path.to_string(), source })?
        .ok_or_else(|| TlsSetupError::NoPrivateKey(path.to_string()))
}

/// Client configuration for a service: webpki roots plus the optional extra
/// root CA, optional client certificate, and no verification at all when
/// the service disables it.
pub fn client_config(service: &Service) -> Result<ClientConfig, TlsSetupError> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = if service.verify_ssl {
        let mut roots = webpki_roots();
        if let Some(root_path) = service.tls_cert_root.as_deref().filter(|p| !p.is_empty()) {
            let (added, ignored) = roots.add_parsable_certificates(load_certs(root_path)?);
            tracing::debug!(added, ignored, path = root_path, "Loaded extra root certificates");
        }
        builder.with_root_certificates(roots)
    } else {
        builder.dangerous().with_custom_certificate_verifier(Arc::new(NoVerifier(provider)))
    };

    let config = match service.tls_cert.as_deref().filter(|p| !p.is_empty()) {
        Some(cert_path) => {
            let key_path = service
                .tls_cert_key
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or(TlsSetupError::MissingKey)?;
            builder.with_client_auth_cert(load_certs(cert_path)?, load_key(key_path)?)?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}

pub fn connector(config: ClientConfig) -> TlsConnector {
    TlsConnector::from(Arc::new(config))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsSetupError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string()).map_err(|_| TlsSetupError::ServerName(host.to_string()))
}

/// Accepts any server certificate while still checking handshake
/// signatures with the provider's algorithms.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

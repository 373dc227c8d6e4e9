use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use x509_parser::prelude::{FromDer, X509Certificate};

use super::address::host_port;
use super::tls::{self, TlsSetupError};

/// Bound used when no service timeout applies
pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PORT: u16 = 443;
/// Anything expiring sooner than this is an error regardless of the warn window
const CRITICAL_HOURS: i64 = 48;

#[derive(Debug, Error)]
pub enum CertError {
    #[error(transparent)]
    Setup(#[from] TlsSetupError),
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out inspecting {0}")]
    Timeout(String),
    #[error("no certificates presented by {0}")]
    NoCertificates(String),
    #[error("failed to parse certificate: {0}")]
    Parse(String),
    #[error("certificate expires in {hours} hours")]
    ExpiresWithinHours { days: i64, hours: i64 },
    #[error("certificate expires in {days} days, within the {warn_days} day warning window")]
    ExpiresSoon { days: i64, warn_days: i64 },
}

impl CertError {
    /// Minimum days to expiry, when the chain was read before the error
    pub fn days_remaining(&self) -> Option<i64> {
        match self {
            CertError::ExpiresWithinHours { days, .. } | CertError::ExpiresSoon { days, .. } => {
                Some(*days)
            }
            _ => None,
        }
    }
}

/// The parts of a presented certificate the inspector looks at
#[derive(Debug, Clone)]
pub struct CertSummary {
    pub subject: String,
    pub not_after: DateTime<Utc>,
    pub signature_oid: String,
    pub self_signed: bool,
    pub signature: Vec<u8>,
}

impl CertSummary {
    pub fn from_der(der: &[u8]) -> Result<Self, CertError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| CertError::Parse(e.to_string()))?;
        let not_after = Utc
            .timestamp_opt(cert.validity().not_after.timestamp(), 0)
            .single()
            .ok_or_else(|| CertError::Parse("not_after out of range".into()))?;

        Ok(Self {
            subject: cert.subject().to_string(),
            not_after,
            signature_oid: cert.signature_algorithm.algorithm.to_id_string(),
            self_signed: cert.subject() == cert.issuer(),
            signature: cert.signature_value.data.to_vec(),
        })
    }
}

struct SunsetAlgorithm {
    oid: &'static str,
    name: &'static str,
    sunsets_at: Option<(i32, u32, u32)>,
}

const SUNSET_ALGORITHMS: [SunsetAlgorithm; 5] = [
    SunsetAlgorithm { oid: "1.2.840.113549.1.1.2", name: "MD2-RSA", sunsets_at: None },
    SunsetAlgorithm { oid: "1.2.840.113549.1.1.4", name: "MD5-RSA", sunsets_at: None },
    SunsetAlgorithm { oid: "1.2.840.113549.1.1.5", name: "SHA1-RSA", sunsets_at: Some((2017, 1, 1)) },
    SunsetAlgorithm { oid: "1.2.840.10040.4.3", name: "DSA-SHA1", sunsets_at: Some((2017, 1, 1)) },
    SunsetAlgorithm { oid: "1.2.840.10045.4.1", name: "ECDSA-SHA1", sunsets_at: Some((2017, 1, 1)) },
];

/// Split a target like `https://example.com:8443/path` into host and port
pub fn normalize_target(target: &str) -> (String, u16) {
    let without_scheme = target.split_once("://").map_or(target, |(_, rest)| rest);
    let authority = without_scheme.split(['/', '?', '#']).next().unwrap_or_default();

    if let Some(rest) = authority.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);
            return (host.to_string(), port);
        }
    }

    if authority.matches(':').count() == 1 {
        if let Some((host, port)) = authority.rsplit_once(':') {
            if let Ok(port) = port.parse() {
                return (host.to_string(), port);
            }
        }
    }

    (authority.to_string(), DEFAULT_PORT)
}

/// Names of deprecated signature algorithms used by non-root certificates
/// that remain valid on or after the algorithm's sunset date
pub fn deprecated_signatures(chain: &[CertSummary]) -> Vec<String> {
    chain
        .iter()
        .filter(|cert| !cert.self_signed)
        .filter_map(|cert| {
            let algorithm = SUNSET_ALGORITHMS.iter().find(|alg| alg.oid == cert.signature_oid)?;
            let sunset = match algorithm.sunsets_at {
                None => true,
                Some((year, month, day)) => Utc
                    .with_ymd_and_hms(year, month, day, 0, 0, 0)
                    .single()
                    .is_some_and(|at| cert.not_after >= at),
            };
            sunset.then(|| format!("{} is signed with {}", cert.subject, algorithm.name))
        })
        .collect()
}

/// Minimum days to expiry over the chain, or an error (carrying that
/// minimum) when it falls inside the warning window or the nearest expiry
/// is at most 48 hours away.
pub fn evaluate_chain(chain: &[CertSummary], now: DateTime<Utc>, warn_within_days: i64) -> Result<i64, CertError> {
    let nearest = chain
        .iter()
        .map(|cert| cert.not_after)
        .min()
        .ok_or_else(|| CertError::NoCertificates("chain".into()))?;

    let remaining = nearest.signed_duration_since(now);
    let days = remaining.num_days();
    let hours = remaining.num_hours();

    if hours <= CRITICAL_HOURS {
        return Err(CertError::ExpiresWithinHours { days, hours });
    }
    if days <= warn_within_days {
        return Err(CertError::ExpiresSoon { days, warn_days: warn_within_days });
    }
    Ok(days)
}

async fn fetch_chain(host: &str, port: u16) -> Result<Vec<CertSummary>, CertError> {
    let address = host_port(host, port);
    let config = rustls::ClientConfig::builder_with_provider(tls::provider())
        .with_safe_default_protocol_versions()
        .map_err(TlsSetupError::from)?
        .with_root_certificates(tls::webpki_roots())
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let server_name = tls::server_name(host)?;

    let stream = TcpStream::connect(&address)
        .await
        .map_err(|source| CertError::Connect { address: address.clone(), source })?;
    let stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|source| CertError::Handshake { address: address.clone(), source })?;

    let (_, connection) = stream.get_ref();
    let presented = connection
        .peer_certificates()
        .filter(|certs| !certs.is_empty())
        .ok_or_else(|| CertError::NoCertificates(address.clone()))?;

    let mut seen = HashSet::new();
    let mut chain = Vec::with_capacity(presented.len());
    for der in presented {
        let summary = CertSummary::from_der(der.as_ref())?;
        if seen.insert(summary.signature.clone()) {
            chain.push(summary);
        }
    }
    Ok(chain)
}

/// Connect to `target`, read its certificate chain, and return the minimum
/// number of whole days until any certificate expires. The whole exchange is
/// bounded by `limit`.
pub async fn inspect_expiry(target: &str, warn_within_days: i64, limit: Duration) -> Result<i64, CertError> {
    let (host, port) = normalize_target(target);
    let chain = timeout(limit, fetch_chain(&host, port))
        .await
        .map_err(|_| CertError::Timeout(host_port(&host, port)))??;

    let now = Utc::now();
    for warning in deprecated_signatures(&chain) {
        tracing::warn!(target = %host, "Deprecated certificate signature: {}", warning);
    }

    evaluate_chain(&chain, now, warn_within_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn cert(subject: &str, not_after: DateTime<Utc>, oid: &str, self_signed: bool) -> CertSummary {
        CertSummary {
            subject: subject.into(),
            not_after,
            signature_oid: oid.into(),
            self_signed,
            signature: subject.as_bytes().to_vec(),
        }
    }

    const SHA256_RSA: &str = "1.2.840.113549.1.1.11";

    #[test]
    fn test_exactly_48_hours_is_an_error() {
        let now = Utc::now();
        let chain = [cert("leaf", now + TimeDelta::hours(48), SHA256_RSA, false)];

        let error = evaluate_chain(&chain, now, 0).unwrap_err();
        assert!(matches!(error, CertError::ExpiresWithinHours { hours: 48, .. }));
        assert_eq!(error.days_remaining(), Some(2));
    }

    #[test]
    fn test_one_day_past_warning_window_is_ok() {
        let now = Utc::now();
        let warn = 30;
        let chain = [
            cert("leaf", now + TimeDelta::days(warn + 1), SHA256_RSA, false),
            cert("root", now + TimeDelta::days(3650), SHA256_RSA, true),
        ];

        assert_eq!(evaluate_chain(&chain, now, warn).unwrap(), warn + 1);
    }

    #[test]
    fn test_minimum_inside_warning_window_is_an_error() {
        let now = Utc::now();
        let chain = [
            cert("leaf", now + TimeDelta::days(400), SHA256_RSA, false),
            cert("intermediate", now + TimeDelta::days(20), SHA256_RSA, false),
        ];

        let error = evaluate_chain(&chain, now, 30).unwrap_err();
        assert!(matches!(error, CertError::ExpiresSoon { days: 20, warn_days: 30 }));
        assert_eq!(error.days_remaining(), Some(20));
    }

    #[test]
    fn test_days_are_truncated() {
        let now = Utc::now();
        let chain = [cert("leaf", now + TimeDelta::days(10) + TimeDelta::hours(23), SHA256_RSA, false)];
        assert_eq!(evaluate_chain(&chain, now, 5).unwrap(), 10);
    }

    #[test]
    fn test_deprecated_signatures_skip_roots() {
        let far = Utc::now() + TimeDelta::days(365);
        let chain = [
            cert("leaf", far, "1.2.840.113549.1.1.5", false),
            cert("old root", far, "1.2.840.113549.1.1.4", true),
            cert("modern", far, SHA256_RSA, false),
        ];

        let warnings = deprecated_signatures(&chain);
        assert_eq!(warnings, vec!["leaf is signed with SHA1-RSA".to_string()]);
    }

    #[test]
    fn test_sha1_expiring_before_sunset_is_not_flagged() {
        let before = Utc.with_ymd_and_hms(2016, 6, 1, 0, 0, 0).unwrap();
        let chain = [
            cert("sha1", before, "1.2.840.10045.4.1", false),
            cert("md5", before, "1.2.840.113549.1.1.4", false),
        ];

        let warnings = deprecated_signatures(&chain);
        assert_eq!(warnings, vec!["md5 is signed with MD5-RSA".to_string()]);
    }

    #[test]
    fn test_sha1_sunset_follows_certificate_expiry() {
        let sunset = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let chain = [
            cert("on sunset", sunset, "1.2.840.113549.1.1.5", false),
            cert("day before", sunset - TimeDelta::days(1), "1.2.840.10040.4.3", false),
        ];

        let warnings = deprecated_signatures(&chain);
        assert_eq!(warnings, vec!["on sunset is signed with SHA1-RSA".to_string()]);
    }

    #[tokio::test]
    async fn test_silent_server_is_bounded_by_the_limit() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let started = std::time::Instant::now();
        let error = inspect_expiry(&format!("127.0.0.1:{port}"), 30, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(error, CertError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("example.com"), ("example.com".into(), 443));
        assert_eq!(normalize_target("https://example.com/health"), ("example.com".into(), 443));
        assert_eq!(normalize_target("example.com:8443"), ("example.com".into(), 8443));
        assert_eq!(normalize_target("https://[::1]:9443/x"), ("::1".into(), 9443));
        assert_eq!(normalize_target("[::1]"), ("::1".into(), 443));
    }
}

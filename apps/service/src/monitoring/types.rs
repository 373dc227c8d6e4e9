use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::ProbeError;
use super::headers::HeaderList;
use super::ring::FailureRing;

/// Protocol used to check a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Http,
    Tcp,
    Udp,
    Grpc,
    Icmp,
    Smtp,
    Imap,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 7] = [
        ServiceKind::Http,
        ServiceKind::Tcp,
        ServiceKind::Udp,
        ServiceKind::Grpc,
        ServiceKind::Icmp,
        ServiceKind::Smtp,
        ServiceKind::Imap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Http => "http",
            ServiceKind::Tcp => "tcp",
            ServiceKind::Udp => "udp",
            ServiceKind::Grpc => "grpc",
            ServiceKind::Icmp => "icmp",
            ServiceKind::Smtp => "smtp",
            ServiceKind::Imap => "imap",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown service type '{value}'"))
    }
}

/// A monitored service: its check parameters plus the runtime snapshot
/// maintained by the service's check loop.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub kind: ServiceKind,
    /// URL for HTTP services, bare host (or IP) for everything else
    pub domain: String,
    pub port: u16,

    pub method: String,
    /// Raw `"key=value,key=value"` header string
    pub headers: Option<String>,
    pub post_data: Option<String>,
    /// Regex for HTTP bodies, exact string for gRPC health responses
    pub expected: Option<String>,
    pub expected_status: i32,
    pub timeout_seconds: u64,
    pub interval_seconds: u64,
    /// Client certificate (PEM path)
    pub tls_cert: Option<String>,
    /// Client certificate key (PEM path)
    pub tls_cert_key: Option<String>,
    /// Extra root CA (PEM path)
    pub tls_cert_root: Option<String>,
    pub verify_ssl: bool,
    pub follow_redirects: bool,
    pub grpc_health_check: bool,
    pub show_ssl: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,

    pub online: bool,
    /// Duration of the protocol interaction of the latest check, in µs
    pub latency_us: u64,
    /// Duration of the DNS lookup of the latest check, in µs
    pub ping_time_us: u64,
    pub last_latency_us: u64,
    pub last_lookup_us: u64,
    pub last_response: String,
    pub last_status_code: i32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_online: Option<DateTime<Utc>>,
    pub last_offline: Option<DateTime<Utc>>,
    pub ssl_days: Option<i64>,
    pub down_text: String,
    pub failures: FailureRing,
}

impl Service {
    /// Create a service with default check parameters
    pub fn new(id: i64, name: impl Into<String>, kind: ServiceKind, domain: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            domain: domain.into(),
            port: 0,
            method: "GET".into(),
            headers: None,
            post_data: None,
            expected: None,
            expected_status: 200,
            timeout_seconds: 10,
            interval_seconds: 60,
            tls_cert: None,
            tls_cert_key: None,
            tls_cert_root: None,
            verify_ssl: true,
            follow_redirects: false,
            grpc_health_check: false,
            show_ssl: false,
            enabled: true,
            created_at: Utc::now(),
            online: false,
            latency_us: 0,
            ping_time_us: 0,
            last_latency_us: 0,
            last_lookup_us: 0,
            last_response: String::new(),
            last_status_code: 0,
            last_check: None,
            last_online: None,
            last_offline: None,
            ssl_days: None,
            down_text: String::new(),
            failures: FailureRing::new(FailureRing::DEFAULT_CAPACITY),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Check interval, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    /// Probe timeout, never shorter than one second
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn header_list(&self) -> HeaderList {
        HeaderList::parse(self.headers.as_deref())
    }

    pub fn has_client_cert(&self) -> bool {
        self.tls_cert.as_deref().is_some_and(|cert| !cert.is_empty())
    }

    /// Implicit-TLS ports for the mail protocols
    pub fn requires_tls(&self) -> bool {
        matches!((self.kind, self.port), (ServiceKind::Smtp, 465) | (ServiceKind::Imap, 993))
    }

    /// Human readable time since the service was last seen online
    pub fn downtime_text(&self, now: DateTime<Utc>) -> String {
        let since = self.last_online.unwrap_or(self.created_at);
        super::format::human_duration(now.signed_duration_since(since))
    }
}

/// Result of an on-demand check, detached from the service it ran against
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub service_id: i64,
    pub online: bool,
    pub latency_us: u64,
    pub ping_time_us: u64,
    pub status_code: i32,
    pub ssl_days: Option<i64>,
    pub error: Option<ProbeError>,
}

impl CheckOutcome {
    pub fn from_service(service: &Service, result: Result<(), ProbeError>) -> Self {
        Self {
            service_id: service.id,
            online: service.online,
            latency_us: service.latency_us,
            ping_time_us: service.ping_time_us,
            status_code: service.last_status_code,
            ssl_days: service.ssl_days,
            error: result.err(),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use super::format::human_micros;

        match &self.error {
            None => write!(
                f,
                "service #{} online | latency {} | lookup {}",
                self.service_id,
                human_micros(self.latency_us),
                human_micros(self.ping_time_us)
            )?,
            Some(error) => write!(
                f,
                "service #{} offline | {} ({})",
                self.service_id, error.issue, error.reason
            )?,
        }
        if let Some(days) = self.ssl_days {
            write!(f, " | ssl expires in {days} days")?;
        }
        Ok(())
    }
}

use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::net::lookup_host;
use tokio::time::timeout;
use url::{Host, Url};

use super::error::{ProbeError, Reason};
use super::format::micros;
use super::types::{Service, ServiceKind};

/// A host is treated as IPv6 when it contains at least two colons
pub fn is_ipv6(address: &str) -> bool {
    address.matches(':').count() >= 2
}

/// `host:port` dial string, bracketing IPv6 hosts. A zero port leaves the
/// host untouched.
pub fn host_port(host: &str, port: u16) -> String {
    if port == 0 {
        host.to_string()
    } else if is_ipv6(host) {
        format!("[{}]:{}", host.trim_start_matches('[').trim_end_matches(']'), port)
    } else {
        format!("{host}:{port}")
    }
}

/// Host name used for DNS and TLS: the URL host for HTTP services, the
/// configured domain for everything else.
pub fn lookup_host_name(service: &Service) -> Result<String, ProbeError> {
    if service.kind != ServiceKind::Http {
        return Ok(service.domain.trim_start_matches('[').trim_end_matches(']').to_string());
    }

    let url = Url::parse(&service.domain).map_err(|e| {
        ProbeError::new(
            Reason::ParseDomain,
            format!("Unable to parse domain {}, {}", service.domain, e),
        )
    })?;

    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(ProbeError::new(
            Reason::ParseDomain,
            format!("Domain {} has no host", service.domain),
        )),
    }
}

/// Resolve the service host, returning how long the lookup took in µs
pub async fn resolve(service: &Service) -> Result<u64, ProbeError> {
    resolve_addr(service).await.map(|(_, elapsed)| elapsed)
}

/// Resolve the service host to its first address, with the lookup time in µs
pub async fn resolve_addr(service: &Service) -> Result<(IpAddr, u64), ProbeError> {
    let host = lookup_host_name(service)?;
    resolve_host(service, &host).await
}

/// Resolve `host` on behalf of `service`, bounded by the service timeout
pub async fn resolve_host(service: &Service, host: &str) -> Result<(IpAddr, u64), ProbeError> {
    let started = Instant::now();

    let lookup_failed = |error: String| {
        let issue = match service.kind {
            ServiceKind::Http => {
                format!("Could not get IP address for domain {}, {}", service.domain, error)
            }
            kind => format!(
                "Could not get IP address for {} service {}, {}",
                kind.as_str().to_uppercase(),
                host,
                error
            ),
        };
        ProbeError::new(Reason::Lookup, issue)
    };

    let mut addresses = timeout(service.timeout(), lookup_host((host, 0)))
        .await
        .map_err(|_| lookup_failed("lookup timed out".to_string()))?
        .map_err(|e| lookup_failed(e.to_string()))?;

    let Some(address) = addresses.next() else {
        return Err(lookup_failed("no addresses found".to_string()));
    };

    Ok((address.ip(), micros(started.elapsed())))
}

/// First address of `host`, giving up after `limit`
pub async fn resolve_ip(host: &str, limit: Duration) -> std::io::Result<IpAddr> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addresses = timeout(limit, lookup_host((host, 0)))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, format!("lookup of {host} timed out")))??;
    addresses.next().map(|addr| addr.ip()).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("no addresses for {host}"))
    })
}

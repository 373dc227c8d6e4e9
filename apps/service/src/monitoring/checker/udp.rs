use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::Checker;
use crate::monitoring::address::resolve_addr;
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::types::Service;

/// Upper bound on how long a scan waits for an answer
pub const UDP_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// A datagram came back
    Open,
    /// Nothing came back before the deadline
    OpenFiltered,
    /// ICMP port unreachable
    Closed,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Open => "open",
            PortState::OpenFiltered => "open|filtered",
            PortState::Closed => "closed",
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe a single UDP port with an empty datagram
pub async fn scan_udp_port(ip: IpAddr, port: u16, wait: Duration) -> io::Result<PortState> {
    let local: SocketAddr = match ip {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect((ip, port)).await?;

    match socket.send(&[]).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => return Ok(PortState::Closed),
        Err(e) => return Err(e),
    }

    let mut buf = [0u8; 512];
    match timeout(wait, socket.recv(&mut buf)).await {
        Ok(Ok(_)) => Ok(PortState::Open),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(PortState::Closed),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(PortState::OpenFiltered),
    }
}

/// Port scan of the configured UDP port. Open and open|filtered ports count
/// as online.
pub struct UdpChecker;

#[async_trait]
impl Checker for UdpChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        let (ip, lookup) = resolve_addr(service).await?;
        service.ping_time_us = lookup;
        let started = Instant::now();

        let wait = service.timeout().min(UDP_SCAN_TIMEOUT);
        let state = scan_udp_port(ip, service.port, wait)
            .await
            .map_err(|e| ProbeError::new(Reason::Tls, format!("UDP Scan Error: {e}")))?;

        tracing::debug!(service_id = service.id, port = service.port, state = %state, "UDP scan finished");

        if !state.as_str().contains("open") {
            return Err(ProbeError::new(Reason::Tls, "port is closed"));
        }

        service.latency_us = micros(started.elapsed());
        service.last_response.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ServiceKind;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_answering_port_is_open() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            if let Ok((_, peer)) = server.recv_from(&mut buf).await {
                let _ = server.send_to(b"pong", peer).await;
            }
        });

        let state = scan_udp_port(LOCALHOST, port, Duration::from_secs(2)).await.unwrap();
        assert_eq!(state, PortState::Open);
    }

    #[tokio::test]
    async fn test_silent_port_is_open_filtered() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let state = scan_udp_port(LOCALHOST, port, Duration::from_millis(200)).await.unwrap();
        assert_eq!(state, PortState::OpenFiltered);
        drop(server);
    }

    #[tokio::test]
    async fn test_unbound_port_is_closed() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        drop(server);

        let state = scan_udp_port(LOCALHOST, port, Duration::from_secs(2)).await.unwrap();
        assert_eq!(state, PortState::Closed);
    }

    #[tokio::test]
    async fn test_closed_port_fails_with_tls_reason() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        drop(server);

        let mut service = Service::new(1, "dns", ServiceKind::Udp, "127.0.0.1").with_port(port).with_timeout(2);
        let error = UdpChecker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Tls);
        assert_eq!(error.issue, "port is closed");
    }

    #[test]
    fn test_state_strings() {
        assert!(PortState::Open.as_str().contains("open"));
        assert!(PortState::OpenFiltered.as_str().contains("open"));
        assert!(!PortState::Closed.as_str().contains("open"));
    }
}

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};

use super::Checker;
use crate::monitoring::address::resolve_ip;
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::types::Service;

const PAYLOAD: [u8; 56] = [0; 56];

/// Sends one echo request; the round trip is both latency and ping time
pub struct IcmpChecker;

async fn ping(ip: IpAddr, limit: Duration) -> Result<Duration, String> {
    let config = match ip {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };
    let client = Client::new(&config).map_err(|e| e.to_string())?;
    let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
    pinger.timeout(limit);

    let (_, rtt) = pinger.ping(PingSequence(0), &PAYLOAD).await.map_err(|e| e.to_string())?;
    Ok(rtt)
}

#[async_trait]
impl Checker for IcmpChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        let failed = |error: String| {
            ProbeError::new(
                Reason::Lookup,
                format!("Could not send ICMP to service {}, {}", service.domain, error),
            )
        };

        let ip = resolve_ip(&service.domain, service.timeout()).await.map_err(|e| failed(e.to_string()))?;
        let rtt = ping(ip, service.timeout()).await.map_err(failed)?;

        service.ping_time_us = micros(rtt);
        service.latency_us = service.ping_time_us;
        service.last_response.clear();
        Ok(())
    }
}

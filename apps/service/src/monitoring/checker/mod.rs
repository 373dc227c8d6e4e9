//! One checker per protocol.
//!
//! A checker performs a single attempt against a service: DNS lookup timed
//! into `ping_time_us`, then the protocol interaction timed into
//! `latency_us`, both bounded by the service timeout. Checkers only fill in
//! the service's runtime fields; recording is left to the executor.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::error::ProbeError;
use super::types::Service;

mod grpc;
mod http;
mod icmp;
mod imap;
mod smtp;
mod tcp;
mod udp;

pub use grpc::GrpcChecker;
pub use http::HttpChecker;
pub use icmp::IcmpChecker;
pub use imap::ImapChecker;
pub use smtp::SmtpChecker;
pub use tcp::TcpChecker;
pub use udp::UdpChecker;

/// Checker trait for the different protocols
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError>;
}

/// Run `future` under `limit`, folding a timeout into the same error type
async fn within<T, E, F>(limit: Duration, future: F, timed_out: impl FnOnce() -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(timed_out()),
    }
}

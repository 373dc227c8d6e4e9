use std::io;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{Checker, within};
use crate::monitoring::address::{host_port, resolve};
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::tls;
use crate::monitoring::types::Service;

/// Connects to `host:port`, over TLS when a client certificate is set
pub struct TcpChecker;

fn dial_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Tls, format!("Dial Error: {error}"))
}

async fn close<S: AsyncWrite + Unpin>(mut stream: S) -> Result<(), ProbeError> {
    stream
        .shutdown()
        .await
        .map_err(|e| ProbeError::new(Reason::Close, format!("TCP Socket Close Error {e}")))
}

#[async_trait]
impl Checker for TcpChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        service.ping_time_us = resolve(service).await?;

        let address = host_port(&service.domain, service.port);
        let limit = service.timeout();
        let started = Instant::now();

        let stream = within(limit, TcpStream::connect(&address), || {
            io::Error::new(io::ErrorKind::TimedOut, format!("dial {address} timed out"))
        })
        .await
        .map_err(dial_error)?;

        if service.has_client_cert() {
            let config = tls::client_config(service).map_err(dial_error)?;
            let server_name = tls::server_name(&service.domain).map_err(dial_error)?;
            let stream = within(limit, tls::connector(config).connect(server_name, stream), || {
                io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")
            })
            .await
            .map_err(dial_error)?;

            service.latency_us = micros(started.elapsed());
            close(stream).await?;
        } else {
            service.latency_us = micros(started.elapsed());
            close(stream).await?;
        }

        service.last_response.clear();
        Ok(())
    }
}

use std::fmt::Debug;
use std::io;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;

use super::{Checker, within};
use crate::monitoring::address::{host_port, resolve};
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::tls;
use crate::monitoring::types::Service;

/// Port where authentication is skipped
const PLAIN_PORT: u16 = 143;

/// Reads the server greeting and logs in unless the service is on the
/// plain port.
pub struct ImapChecker;

fn dial_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Tls, format!("Dial Error: {error}"))
}

fn imap_error(stage: &str, error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Imap, format!("IMAP {stage} Error: {error}"))
}

/// Greeting plus optional LOGIN/LOGOUT over an established stream
async fn converse<S>(stream: S, credentials: Option<(&str, &str)>, authenticate: bool) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    let mut reader = BufReader::new(stream);
    let mut greeting = String::new();
    reader
        .read_line(&mut greeting)
        .await
        .map_err(|e| imap_error("Connection", e))?;

    let greeting = greeting.trim_end();
    if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
        return Err(imap_error("Connection", format!("unexpected greeting '{greeting}'")));
    }

    if !authenticate {
        return Ok(());
    }

    let (username, password) = credentials.ok_or_else(|| imap_error("Authentication", "no credentials configured"))?;
    let client = async_imap::Client::new(reader);
    let mut session = client
        .login(username, password)
        .await
        .map_err(|(e, _)| imap_error("Authentication", e))?;

    if let Err(e) = session.logout().await {
        tracing::debug!("IMAP LOGOUT failed: {}", e);
    }
    Ok(())
}

#[async_trait]
impl Checker for ImapChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        service.ping_time_us = resolve(service).await?;

        let limit = service.timeout();
        let address = host_port(&service.domain, service.port);
        let headers = service.header_list();
        let credentials = headers.credentials();
        let authenticate = service.port != PLAIN_PORT;
        let started = Instant::now();

        let stream = within(limit, TcpStream::connect(&address), || {
            io::Error::new(io::ErrorKind::TimedOut, format!("dial {address} timed out"))
        })
        .await
        .map_err(dial_error)?;

        let conversation = async {
            if service.requires_tls() || service.has_client_cert() {
                let config = tls::client_config(service).map_err(dial_error)?;
                let server_name = tls::server_name(&service.domain).map_err(dial_error)?;
                let stream = tls::connector(config).connect(server_name, stream).await.map_err(dial_error)?;
                converse(stream, credentials, authenticate).await
            } else {
                converse(stream, credentials, authenticate).await
            }
        };
        within(limit, conversation, || imap_error("Connection", "session timed out")).await?;

        service.latency_us = micros(started.elapsed());
        service.last_response.clear();
        Ok(())
    }
}

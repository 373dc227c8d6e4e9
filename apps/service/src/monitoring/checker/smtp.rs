use std::time::Instant;

use async_trait::async_trait;
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;

use super::{Checker, within};
use crate::monitoring::address::resolve_addr;
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::types::Service;

/// Port where authentication is skipped
const RELAY_PORT: u16 = 25;

/// Connects, reads the greeting and EHLO reply, then authenticates unless
/// the service is on the relay port.
pub struct SmtpChecker;

fn dial_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Tls, format!("Dial Error: {error}"))
}

fn auth_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Smtp, format!("SMTP Authentication Error: {error}"))
}

/// Server replies are protocol failures, everything else happened while
/// dialing or negotiating TLS.
fn connect_error(error: SmtpError) -> ProbeError {
    if error.is_response() || error.is_transient() || error.is_permanent() {
        ProbeError::new(Reason::Smtp, format!("SMTP Connection Error: {error}"))
    } else {
        dial_error(error)
    }
}

#[async_trait]
impl Checker for SmtpChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        let (ip, lookup) = resolve_addr(service).await?;
        service.ping_time_us = lookup;

        let limit = service.timeout();
        let headers = service.header_list();
        let started = Instant::now();

        let tls = if service.requires_tls() || service.has_client_cert() {
            let parameters = TlsParameters::builder(service.domain.clone())
                .dangerous_accept_invalid_certs(!service.verify_ssl)
                .build_rustls()
                .map_err(dial_error)?;
            Some(parameters)
        } else {
            None
        };

        let hello = ClientId::Domain("localhost".to_string());
        let mut connection = within(
            limit,
            async {
                AsyncSmtpConnection::connect_tokio1((ip, service.port), Some(limit), &hello, tls, None)
                    .await
                    .map_err(connect_error)
            },
            || dial_error("connection timed out"),
        )
        .await?;

        if service.port != RELAY_PORT {
            let Some((username, password)) = headers.credentials() else {
                return Err(auth_error("no credentials configured"));
            };
            let credentials = Credentials::new(username.to_string(), password.to_string());

            within(
                limit,
                async {
                    connection
                        .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
                        .await
                        .map_err(auth_error)
                },
                || auth_error("authentication timed out"),
            )
            .await?;
        }

        service.latency_us = micros(started.elapsed());
        if let Err(e) = connection.quit().await {
            tracing::debug!(service_id = service.id, "SMTP QUIT failed: {}", e);
        }

        service.last_response.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ServiceKind;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal ESMTP server answering one session
    async fn fake_smtp(auth_reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 localhost ESMTP ready\r\n").await.unwrap();

            while let Ok(Some(line)) = lines.next_line().await {
                let command = line.to_uppercase();
                let reply = if command.starts_with("EHLO") || command.starts_with("HELO") {
                    "250-localhost\r\n250 AUTH PLAIN LOGIN\r\n"
                } else if command.starts_with("AUTH") {
                    auth_reply
                } else if command.starts_with("QUIT") {
                    "221 bye\r\n"
                } else {
                    "250 ok\r\n"
                };
                if write.write_all(reply.as_bytes()).await.is_err() || command.starts_with("QUIT") {
                    break;
                }
            }
        });
        port
    }

    fn service(port: u16, headers: Option<&str>) -> Service {
        let mut service = Service::new(1, "mail", ServiceKind::Smtp, "127.0.0.1").with_port(port).with_timeout(5);
        service.headers = headers.map(str::to_string);
        service
    }

    #[tokio::test]
    async fn test_authenticated_session_succeeds() {
        let port = fake_smtp("235 2.7.0 Authentication successful\r\n").await;
        let mut service = service(port, Some("username=monitor,password=hunter2"));

        SmtpChecker.check(&mut service).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_credentials_is_an_smtp_failure() {
        let port = fake_smtp("235 ok\r\n").await;
        let mut service = service(port, None);

        let error = SmtpChecker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Smtp);
        assert_eq!(error.issue, "SMTP Authentication Error: no credentials configured");
    }

    #[tokio::test]
    async fn test_rejected_credentials_is_an_smtp_failure() {
        let port = fake_smtp("535 5.7.8 Authentication credentials invalid\r\n").await;
        let mut service = service(port, Some("username=monitor,password=wrong"));

        let error = SmtpChecker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Smtp);
        assert!(error.issue.starts_with("SMTP Authentication Error"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_tls_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut service = service(port, Some("username=a,password=b"));
        let error = SmtpChecker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Tls);
        assert!(error.issue.starts_with("Dial Error:"));
    }
}

use std::time::Instant;

use async_trait::async_trait;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use url::Url;

use super::{Checker, within};
use crate::monitoring::address::{host_port, resolve_host};
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::types::Service;

/// Dials a gRPC endpoint and optionally calls `grpc.health.v1.Health/Check`
pub struct GrpcChecker;

/// Host part of the domain, with any URL scheme stripped
fn grpc_host(service: &Service) -> Result<String, ProbeError> {
    if !service.domain.contains("://") {
        return Ok(service.domain.trim_start_matches('[').trim_end_matches(']').to_string());
    }

    let parse_error = |detail: String| {
        tracing::warn!(service_id = service.id, "GRPC Service: '{}', Unable to parse URL: '{}'", service.name, service.domain);
        ProbeError::new(
            Reason::ParseDomain,
            format!("Unable to parse GRPC domain {}, {}", service.domain, detail),
        )
    };

    let url = Url::parse(&service.domain).map_err(|e| parse_error(e.to_string()))?;
    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| parse_error("missing host".into()))
}

fn dial_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Connection, format!("Dial Error {error}"))
}

#[async_trait]
impl Checker for GrpcChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        let host = grpc_host(service)?;
        (_, service.ping_time_us) = resolve_host(service, &host).await?;

        let limit = service.timeout();
        let address = host_port(&host, service.port);
        let started = Instant::now();

        let endpoint = if service.verify_ssl {
            Endpoint::from_shared(format!("https://{address}"))
                .and_then(|endpoint| {
                    endpoint.tls_config(ClientTlsConfig::new().domain_name(host.clone()).with_webpki_roots())
                })
                .map_err(dial_error)?
        } else {
            Endpoint::from_shared(format!("http://{address}")).map_err(dial_error)?
        };
        let endpoint = endpoint.connect_timeout(limit).timeout(limit);

        let channel = within(limit, async { endpoint.connect().await.map_err(dial_error) }, || {
            dial_error(format!("connecting to {address} timed out"))
        })
        .await?;

        if service.grpc_health_check {
            let mut client = HealthClient::new(channel);
            let response = within(
                limit,
                async {
                    client
                        .check(HealthCheckRequest { service: String::new() })
                        .await
                        .map_err(|status| ProbeError::new(Reason::Request, format!("GRPC Error {status}")))
                },
                || ProbeError::new(Reason::Request, "GRPC Error health check timed out"),
            )
            .await?
            .into_inner();

            let status = ServingStatus::try_from(response.status).unwrap_or(ServingStatus::Unknown);
            service.last_response = format!("status:{}", status.as_str_name());
            service.last_status_code = response.status;
        }

        service.latency_us = micros(started.elapsed());

        if service.grpc_health_check {
            if service.expected_status != service.last_status_code {
                return Err(ProbeError::new(
                    Reason::ResponseCode,
                    format!(
                        "GRPC Service: '{}', Status Code: expected '{}', got '{}'",
                        service.name, service.expected_status, service.last_status_code
                    ),
                ));
            }

            if let Some(expected) = service.expected.as_deref().filter(|e| !e.is_empty()) {
                if expected != service.last_response {
                    tracing::warn!(
                        service_id = service.id,
                        "GRPC Service: '{}', Response: expected '{}', got '{}'",
                        service.name,
                        expected,
                        service.last_response
                    );
                    return Err(ProbeError::new(
                        Reason::ResponseBody,
                        format!("GRPC Response Body '{}' did not match '{}'", service.last_response, expected),
                    ));
                }
            }
        }

        Ok(())
    }
}

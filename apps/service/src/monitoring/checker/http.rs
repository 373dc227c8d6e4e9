use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, Identity, Method};

use super::Checker;
use crate::monitoring::address::resolve;
use crate::monitoring::error::{ProbeError, Reason};
use crate::monitoring::format::micros;
use crate::monitoring::ssl::inspect_expiry;
use crate::monitoring::types::Service;
use crate::telemetry::MetricsSink;

const DEFAULT_CONTENT_TYPE: &str = "application/json";
const MAX_REDIRECTS: usize = 10;

/// HTTP/HTTPS checker
pub struct HttpChecker {
    metrics: Arc<dyn MetricsSink>,
    ssl_warn_days: i64,
}

impl HttpChecker {
    pub fn new(metrics: Arc<dyn MetricsSink>, ssl_warn_days: i64) -> Self {
        Self { metrics, ssl_warn_days }
    }

    async fn inspect_ssl(&self, service: &mut Service) {
        match inspect_expiry(&service.domain, self.ssl_warn_days, service.timeout()).await {
            Ok(days) => service.ssl_days = Some(days),
            Err(e) => {
                tracing::warn!(service_id = service.id, "SSL check for {} reported: {}", service.domain, e);
                service.ssl_days = e.days_remaining();
            }
        }
    }
}

fn request_error(error: impl std::fmt::Display) -> ProbeError {
    ProbeError::new(Reason::Request, format!("HTTP Error {error}"))
}

fn load_identity(cert_path: &str, key_path: &str) -> std::io::Result<Option<Identity>> {
    let mut pem = std::fs::read(cert_path)?;
    pem.push(b'\n');
    pem.extend(std::fs::read(key_path)?);
    Ok(Identity::from_pem(&pem).ok())
}

/// Client for one check, carrying the service's TLS and redirect settings.
/// Unreadable certificate files are logged and left out.
fn build_client(service: &Service) -> Result<Client, ProbeError> {
    let redirect = if service.follow_redirects { Policy::limited(MAX_REDIRECTS) } else { Policy::none() };
    let mut builder = Client::builder()
        .timeout(service.timeout())
        .danger_accept_invalid_certs(!service.verify_ssl)
        .redirect(redirect);

    if service.has_client_cert() {
        let cert = service.tls_cert.as_deref().unwrap_or_default();
        let key = service.tls_cert_key.as_deref().unwrap_or_default();
        match load_identity(cert, key) {
            Ok(Some(identity)) => builder = builder.identity(identity),
            Ok(None) => tracing::error!(service_id = service.id, "Client certificate {} is not valid PEM", cert),
            Err(e) => tracing::error!(service_id = service.id, "Failed to load client certificate: {}", e),
        }
    }

    if let Some(root) = service.tls_cert_root.as_deref().filter(|p| !p.is_empty()) {
        match std::fs::read(root).map(|pem| Certificate::from_pem(&pem)) {
            Ok(Ok(cert)) => builder = builder.add_root_certificate(cert),
            Ok(Err(e)) => tracing::error!(service_id = service.id, "Root certificate {} is invalid: {}", root, e),
            Err(e) => tracing::error!(service_id = service.id, "Failed to read root certificate {}: {}", root, e),
        }
    }

    builder.build().map_err(request_error)
}

fn body_matches(service: &Service, pattern: &str, body: &str) -> bool {
    match Regex::new(pattern) {
        Ok(regex) => regex.is_match(body),
        Err(e) => {
            tracing::warn!(service_id = service.id, "Service {} expected pattern '{}' is invalid: {}", service.name, pattern, e);
            false
        }
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, service: &mut Service) -> Result<(), ProbeError> {
        service.ping_time_us = resolve(service).await?;

        if service.show_ssl {
            self.inspect_ssl(service).await;
        }

        let headers = service.header_list();
        let method = Method::from_bytes(service.method.to_uppercase().as_bytes()).map_err(request_error)?;
        let content_type = if method == Method::POST {
            DEFAULT_CONTENT_TYPE
        } else {
            headers.get("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE)
        };

        let client = build_client(service)?;
        let mut request = client.request(method, &service.domain).header("Content-Type", content_type);
        for (key, value) in headers.iter().filter(|(key, _)| !key.eq_ignore_ascii_case("Content-Type")) {
            request = request.header(key, value);
        }
        if let Some(body) = service.post_data.as_deref().filter(|body| !body.is_empty()) {
            request = request.body(body.to_string());
        }

        let started = Instant::now();
        let response = request.send().await.map_err(request_error)?;
        let status = i32::from(response.status().as_u16());
        let body = response.text().await.map_err(request_error)?;

        service.latency_us = micros(started.elapsed());
        service.last_status_code = status;
        service.last_response = body;

        self.metrics.gauge("status_code", f64::from(status), &[("service", service.name.clone())]);

        if let Some(expected) = service.expected.as_deref().filter(|expected| !expected.is_empty()) {
            if !body_matches(service, expected, &service.last_response) {
                return Err(ProbeError::new(
                    Reason::Regex,
                    format!("HTTP Response Body did not match '{expected}'"),
                ));
            }
        }

        if status != service.expected_status {
            return Err(ProbeError::new(
                Reason::StatusCode,
                format!("HTTP Status Code {} did not match {}", status, service.expected_status),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ServiceKind;
    use crate::telemetry::recording::RecordingMetrics;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker() -> (Arc<RecordingMetrics>, HttpChecker) {
        let metrics = Arc::new(RecordingMetrics::default());
        (metrics.clone(), HttpChecker::new(metrics, 30))
    }

    fn service(url: String) -> Service {
        Service::new(1, "web", ServiceKind::Http, url).with_timeout(5)
    }

    #[tokio::test]
    async fn test_matching_status_and_body_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("status: ok"))
            .mount(&server)
            .await;

        let (metrics, checker) = checker();
        let mut service = service(format!("{}/health", server.uri()));
        service.expected = Some("status: (ok|degraded)".into());

        checker.check(&mut service).await.unwrap();
        assert_eq!(service.last_status_code, 200);
        assert_eq!(service.last_response, "status: ok");
        assert_eq!(metrics.last_gauge("status_code"), Some(200.0));
    }

    #[tokio::test]
    async fn test_status_mismatch_is_a_status_code_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (metrics, checker) = checker();
        let mut service = service(server.uri());

        let error = checker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::StatusCode);
        assert_eq!(error.issue, "HTTP Status Code 500 did not match 200");
        assert_eq!(service.last_status_code, 500);
        assert_eq!(metrics.last_gauge("status_code"), Some(500.0));
    }

    #[tokio::test]
    async fn test_body_mismatch_is_a_regex_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let (_, checker) = checker();
        let mut service = service(server.uri());
        service.expected = Some("^ok$".into());

        let error = checker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Regex);
        assert_eq!(error.issue, "HTTP Response Body did not match '^ok$'");
    }

    #[tokio::test]
    async fn test_invalid_pattern_counts_as_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let (_, checker) = checker();
        let mut service = service(server.uri());
        service.expected = Some("([".into());

        let error = checker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Regex);
    }

    #[tokio::test]
    async fn test_post_forces_json_content_type_and_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(header("x-token", "secret=value"))
            .and(body_string("{\"ping\":true}"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let (_, checker) = checker();
        let mut service = service(server.uri());
        service.method = "post".into();
        service.expected_status = 201;
        service.headers = Some("Content-Type=text/plain,X-Token=secret=value".into());
        service.post_data = Some("{\"ping\":true}".into());

        checker.check(&mut service).await.unwrap();
    }

    #[tokio::test]
    async fn test_configured_content_type_is_kept_for_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (_, checker) = checker();
        let mut service = service(server.uri());
        service.headers = Some("Content-Type=text/plain".into());

        checker.check(&mut service).await.unwrap();
    }

    #[tokio::test]
    async fn test_redirects_follow_only_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", format!("{}/new", server.uri())))
            .mount(&server)
            .await;
        Mock::given(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (_, checker) = checker();
        let mut service = service(format!("{}/old", server.uri()));

        let error = checker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::StatusCode);
        assert_eq!(service.last_status_code, 302);

        service.follow_redirects = true;
        checker.check(&mut service).await.unwrap();
        assert_eq!(service.last_status_code, 200);
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_request_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (_, checker) = checker();
        let mut service = service(format!("http://127.0.0.1:{port}/"));

        let error = checker.check(&mut service).await.unwrap_err();
        assert_eq!(error.reason, Reason::Request);
        assert!(error.issue.starts_with("HTTP Error"));
    }
}

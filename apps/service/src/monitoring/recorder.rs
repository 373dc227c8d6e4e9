use std::sync::Arc;

use chrono::Utc;

use super::error::ProbeError;
use super::format::human_micros;
use super::types::Service;
use crate::database::Database;
use crate::database::models::{Failure, Hit};
use crate::notify::Dispatcher;
use crate::telemetry::MetricsSink;

/// Applies probe outcomes to a service: in-memory state always, and when
/// persisting, a Hit or Failure row plus metrics and notifications.
#[derive(Clone)]
pub struct Recorder {
    database: Arc<dyn Database>,
    metrics: Arc<dyn MetricsSink>,
    notifier: Dispatcher,
}

impl Recorder {
    pub fn new(database: Arc<dyn Database>, metrics: Arc<dyn MetricsSink>, notifier: Dispatcher) -> Self {
        Self { database, metrics, notifier }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    pub async fn record_success(&self, service: &mut Service, persist: bool) {
        let now = Utc::now();
        service.online = true;
        service.last_online = Some(now);
        service.last_latency_us = service.latency_us;
        service.last_lookup_us = service.ping_time_us;

        tracing::info!(
            service_id = service.id,
            latency_us = service.latency_us,
            ping_time_us = service.ping_time_us,
            "Service #{} '{}' Successful Response: {} | Lookup in: {} | Interval: {}s",
            service.id,
            service.name,
            human_micros(service.latency_us),
            human_micros(service.ping_time_us),
            service.interval_seconds
        );

        if !persist {
            return;
        }

        let hit = Hit::new(service.id, service.latency_us, service.ping_time_us, now);
        if let Err(e) = self.database.create_hit(&hit).await {
            tracing::error!(service_id = service.id, "Failed to save hit: {}", e);
        }

        self.metrics.gauge("online", 1.0, &[("service", service.name.clone()), ("type", service.kind.to_string())]);
        self.metrics.increment("success", &[("service", service.name.clone())]);
        self.notifier.success(service).await;
    }

    pub async fn record_failure(&self, service: &mut Service, error: &ProbeError, persist: bool) {
        let now = Utc::now();
        service.online = false;
        service.last_offline = Some(now);
        service.down_text = service.downtime_text(now);

        let failure = Failure::new(
            service.id,
            error.issue.clone(),
            error.reason,
            service.last_status_code,
            service.ping_time_us,
            now,
        );

        tracing::warn!(
            service_id = service.id,
            reason = %error.reason,
            ping_time_us = service.ping_time_us,
            "Service {} Failing: {} | Lookup in: {}",
            service.name,
            error.issue,
            human_micros(service.ping_time_us)
        );

        if !persist {
            return;
        }

        if let Err(e) = self.database.create_failure(&failure).await {
            tracing::error!(service_id = service.id, "Failed to save failure: {}", e);
        }
        service.failures.push(failure.clone());

        self.metrics.gauge("online", 0.0, &[("service", service.name.clone()), ("type", service.kind.to_string())]);
        self.metrics.increment("failure", &[("service", service.name.clone())]);
        self.notifier.failure(service, &failure).await;
    }
}

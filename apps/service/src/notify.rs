use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::database::models::Failure;
use crate::monitoring::types::Service;

/// Receives recorded check outcomes
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn on_success(&self, service: &Service) -> Result<()>;

    async fn on_failure(&self, service: &Service, failure: &Failure) -> Result<()>;
}

/// Render a `{name}`-style template for a service
pub fn render(template: &str, service: &Service) -> String {
    template
        .replace("{name}", &service.name)
        .replace("{domain}", &service.domain)
        .replace("{id}", &service.id.to_string())
}

pub const SUCCESS_TEMPLATE: &str = "Your service '{name}' is currently online!";
pub const FAILURE_TEMPLATE: &str = "Your service '{name}' is currently offline!";

/// Writes the templated messages to the log
pub struct LogNotifier {
    success: String,
    failure: String,
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self { success: SUCCESS_TEMPLATE.into(), failure: FAILURE_TEMPLATE.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_success(&self, service: &Service) -> Result<()> {
        tracing::info!(service_id = service.id, "{}", render(&self.success, service));
        Ok(())
    }

    async fn on_failure(&self, service: &Service, failure: &Failure) -> Result<()> {
        tracing::warn!(
            service_id = service.id,
            reason = %failure.reason,
            "{} {}",
            render(&self.failure, service),
            failure.issue
        );
        Ok(())
    }
}

/// Fans a notification out to every registered notifier. Notifier errors
/// are logged and never reach the caller.
#[derive(Clone, Default)]
pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub async fn success(&self, service: &Service) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.on_success(service).await {
                tracing::error!(notifier = notifier.name(), service_id = service.id, "Notification failed: {}", e);
            }
        }
    }

    pub async fn failure(&self, service: &Service, failure: &Failure) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.on_failure(service, failure).await {
                tracing::error!(notifier = notifier.name(), service_id = service.id, "Notification failed: {}", e);
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::checker::{
    Checker, GrpcChecker, HttpChecker, IcmpChecker, ImapChecker, SmtpChecker, TcpChecker, UdpChecker,
};
use super::error::{ProbeError, Reason};
use super::recorder::Recorder;
use super::types::{CheckOutcome, Service, ServiceKind};

/// Monitoring executor - runs one check for a service and hands the result
/// to the recorder
#[derive(Clone)]
pub struct MonitoringExecutor {
    checkers: HashMap<ServiceKind, Arc<dyn Checker>>,
    recorder: Recorder,
}

impl MonitoringExecutor {
    /// Create an executor with the built-in checker for every protocol
    pub fn new(recorder: Recorder, ssl_warn_days: i64) -> Self {
        let http: Arc<dyn Checker> = Arc::new(HttpChecker::new(recorder.metrics().clone(), ssl_warn_days));
        let checkers: HashMap<ServiceKind, Arc<dyn Checker>> = HashMap::from([
            (ServiceKind::Http, http),
            (ServiceKind::Tcp, Arc::new(TcpChecker) as Arc<dyn Checker>),
            (ServiceKind::Udp, Arc::new(UdpChecker) as Arc<dyn Checker>),
            (ServiceKind::Grpc, Arc::new(GrpcChecker) as Arc<dyn Checker>),
            (ServiceKind::Icmp, Arc::new(IcmpChecker) as Arc<dyn Checker>),
            (ServiceKind::Smtp, Arc::new(SmtpChecker) as Arc<dyn Checker>),
            (ServiceKind::Imap, Arc::new(ImapChecker) as Arc<dyn Checker>),
        ]);

        Self { checkers, recorder }
    }

    /// Replace the checker used for `kind`
    pub fn with_checker(mut self, kind: ServiceKind, checker: Arc<dyn Checker>) -> Self {
        self.checkers.insert(kind, checker);
        self
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Check `service` once. The outcome is always applied to the service;
    /// rows, recorder metrics and notifications only when `record` is set.
    pub async fn execute(&self, service: &mut Service, record: bool) -> Result<(), ProbeError> {
        let started = Instant::now();
        let result = match self.checkers.get(&service.kind) {
            Some(checker) => checker.check(service).await,
            None => Err(ProbeError::new(
                Reason::Connection,
                format!("no checker registered for {} services", service.kind),
            )),
        };
        service.last_check = Some(Utc::now());

        self.recorder.metrics().histogram(
            "check_duration_seconds",
            started.elapsed().as_secs_f64(),
            &[("service", service.name.clone())],
        );

        match &result {
            Ok(()) => self.recorder.record_success(service, record).await,
            Err(error) => self.recorder.record_failure(service, error, record).await,
        }

        result
    }

    /// Non-recording on-demand check of a detached copy of a service
    pub async fn test_service(&self, mut service: Service) -> CheckOutcome {
        let result = self.execute(&mut service, false).await;
        CheckOutcome::from_service(&service, result)
    }
}

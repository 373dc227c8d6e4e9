use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use super::executor::MonitoringExecutor;
use super::ring::FailureRing;
use super::types::{CheckOutcome, Service};

/// Delay before a service's first check, on top of its start offset
pub fn initial_sleep(service_id: i64, interval: Duration) -> Duration {
    let staggered = Duration::from_millis(100).saturating_mul(service_id.max(0).min(u32::MAX as i64) as u32);
    staggered.min(interval)
}

/// Sleep after a check. Online services pace themselves against the
/// checkpoint so check duration does not accumulate; offline services wait a
/// full interval.
pub fn next_sleep(checkpoint: Instant, now: Instant, interval: Duration, online: bool) -> Duration {
    if online { checkpoint.saturating_duration_since(now) } else { interval }
}

struct ServiceTask {
    stop: oneshot::Sender<()>,
    snapshot: watch::Receiver<Service>,
    handle: JoinHandle<()>,
}

/// Services started and stopped by a `sync`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: Vec<i64>,
    pub stopped: Vec<i64>,
}

/// Monitoring scheduler - owns one check loop per service
pub struct Scheduler {
    executor: Arc<MonitoringExecutor>,
    stagger: Duration,
    failure_history: usize,
    record: bool,
    tasks: HashMap<i64, ServiceTask>,
}

impl Scheduler {
    pub fn new(executor: Arc<MonitoringExecutor>, stagger: Duration, failure_history: usize) -> Self {
        Self { executor, stagger, failure_history, record: true, tasks: HashMap::new() }
    }

    /// Whether loops persist their outcomes. Non-recording loops still
    /// update and publish their snapshots.
    pub fn with_recording(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Start a loop per service, each offset by the stagger from the last
    pub fn start_all(&mut self, services: Vec<Service>) {
        tracing::info!("Starting monitoring process for {} services", services.len());
        let mut offset = Duration::ZERO;
        for service in services {
            if self.spawn(service, offset) {
                offset += self.stagger;
            }
        }
    }

    /// Start a loop for `service`. Returns false if one is already running.
    pub fn start(&mut self, service: Service) -> bool {
        self.spawn(service, Duration::ZERO)
    }

    fn spawn(&mut self, mut service: Service, offset: Duration) -> bool {
        if self.is_running(service.id) {
            tracing::debug!(service_id = service.id, "Service loop already running");
            return false;
        }

        service.failures = FailureRing::new(self.failure_history);
        let id = service.id;
        let (stop_tx, stop_rx) = oneshot::channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(service.clone());
        let handle = tokio::spawn(run_loop(self.executor.clone(), service, self.record, offset, stop_rx, snapshot_tx));

        self.tasks.insert(id, ServiceTask { stop: stop_tx, snapshot: snapshot_rx, handle });
        true
    }

    /// Signal a loop to stop. The returned handle resolves once it has.
    pub fn stop(&mut self, id: i64) -> Option<JoinHandle<()>> {
        let task = self.tasks.remove(&id)?;
        let _ = task.stop.send(());
        Some(task.handle)
    }

    /// Start loops for new services and stop loops for services no longer
    /// listed. Running loops are left alone.
    pub fn sync(&mut self, services: Vec<Service>) -> SyncReport {
        let wanted: HashSet<i64> = services.iter().map(|service| service.id).collect();
        let mut report = SyncReport::default();

        let finished: Vec<i64> =
            self.tasks.iter().filter(|(_, task)| task.handle.is_finished()).map(|(id, _)| *id).collect();
        for id in finished {
            self.tasks.remove(&id);
        }

        let mut gone: Vec<i64> = self.tasks.keys().filter(|id| !wanted.contains(id)).copied().collect();
        gone.sort_unstable();
        for id in gone {
            self.stop(id);
            report.stopped.push(id);
        }

        for service in services {
            let id = service.id;
            if self.start(service) {
                report.started.push(id);
            }
        }

        if !report.started.is_empty() || !report.stopped.is_empty() {
            tracing::info!(started = ?report.started, stopped = ?report.stopped, "Synchronized service loops");
        }
        report
    }

    pub fn is_running(&self, id: i64) -> bool {
        self.tasks.get(&id).is_some_and(|task| !task.handle.is_finished())
    }

    pub fn running(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Latest state published by a service's loop
    pub fn snapshot(&self, id: i64) -> Option<Service> {
        self.tasks.get(&id).map(|task| task.snapshot.borrow().clone())
    }

    /// Check a running service now without recording the outcome
    pub async fn run_once(&self, id: i64) -> Option<CheckOutcome> {
        let service = self.snapshot(id)?;
        Some(self.executor.test_service(service).await)
    }

    /// Stop every loop and wait for them to finish
    pub async fn shutdown(&mut self) {
        let ids: Vec<i64> = self.tasks.keys().copied().collect();
        for id in ids {
            if let Some(handle) = self.stop(id) {
                if let Err(e) = handle.await {
                    tracing::error!(service_id = id, "Service loop ended abnormally: {}", e);
                }
            }
        }
    }
}

/// One service's check loop: WAITING until the sleep elapses, CHECKING,
/// then back to WAITING, until the stop signal fires or its sender drops.
async fn run_loop(
    executor: Arc<MonitoringExecutor>,
    mut service: Service,
    record: bool,
    offset: Duration,
    mut stop: oneshot::Receiver<()>,
    publish: watch::Sender<Service>,
) {
    if record {
        let capacity = service.failures.capacity();
        match executor.recorder().database().get_recent_failures(service.id, capacity).await {
            Ok(failures) => service.failures.seed(failures),
            Err(e) => tracing::error!(service_id = service.id, "Failed to load recent failures: {}", e),
        }
        publish.send_replace(service.clone());
    }

    let mut checkpoint = Instant::now();
    let mut sleep_for = offset + initial_sleep(service.id, service.interval());

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                tracing::info!(service_id = service.id, "Stopping service: {}", service.name);
                break;
            }
            _ = sleep(sleep_for) => {
                let _ = executor.execute(&mut service, record).await;
                publish.send_replace(service.clone());

                let interval = service.interval();
                checkpoint += interval;
                sleep_for = next_sleep(checkpoint, Instant::now(), interval, service.online);
            }
        }
    }
}

/// Monitoring engine module - handles execution of monitoring checks
///
/// This module is responsible for:
/// - Running one protocol check per service (HTTP, TCP, UDP, ICMP, gRPC, SMTP, IMAP)
/// - Scheduling a check loop per service
/// - Recording hits and failures, metrics and notifications
pub mod address;
pub mod checker;
pub mod error;
pub mod executor;
pub mod format;
pub mod headers;
pub mod recorder;
pub mod ring;
pub mod scheduler;
pub mod ssl;
pub mod tls;
pub mod types;


pub use executor::MonitoringExecutor;
pub use recorder::Recorder;
pub use scheduler::Scheduler;

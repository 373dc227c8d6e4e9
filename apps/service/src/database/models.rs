use chrono::{DateTime, TimeZone, Utc};

use crate::monitoring::error::Reason;

/// Persisted record of a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub id: Option<i64>,
    pub service_id: i64,
    /// Protocol interaction time in µs
    pub latency_us: u64,
    /// DNS lookup time in µs
    pub ping_time_us: u64,
    pub created_at: DateTime<Utc>,
}

impl Hit {
    pub fn new(service_id: i64, latency_us: u64, ping_time_us: u64, created_at: DateTime<Utc>) -> Self {
        Self { id: None, service_id, latency_us, ping_time_us, created_at }
    }
}

/// Persisted record of a failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub id: Option<i64>,
    pub service_id: i64,
    pub issue: String,
    pub reason: Reason,
    /// Last HTTP or gRPC status code seen by the service
    pub error_code: i32,
    pub ping_time_us: u64,
    pub created_at: DateTime<Utc>,
}

impl Failure {
    pub fn new(
        service_id: i64,
        issue: impl Into<String>,
        reason: Reason,
        error_code: i32,
        ping_time_us: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { id: None, service_id, issue: issue.into(), reason, error_code, ping_time_us, created_at }
    }
}

/// Convert a timestamp to Unix microseconds for storage
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

/// Convert stored Unix microseconds back to a timestamp
pub fn i64_to_timestamp(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros).single().unwrap_or_default()
}

/// Clamp an unsigned count into a SQLite integer
pub fn u64_to_i64(micros: u64) -> i64 {
    i64::try_from(micros).unwrap_or(i64::MAX)
}

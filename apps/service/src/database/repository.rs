use anyhow::Result;
use async_trait::async_trait;
use libsql::{Row, Value, params};

use super::models::{Failure, Hit, i64_to_timestamp, timestamp_to_i64, u64_to_i64};
use crate::monitoring::error::Reason;
use crate::monitoring::types::{Service, ServiceKind};
use crate::pool::LibsqlPool;

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Get all enabled services
    async fn get_enabled_services(&self) -> Result<Vec<Service>>;

    /// Get a service by id
    async fn get_service(&self, id: i64) -> Result<Option<Service>>;

    /// Insert a service when its id is 0, update it otherwise. Returns the id.
    async fn save_service(&self, service: &Service) -> Result<i64>;

    /// Save a successful check
    async fn create_hit(&self, hit: &Hit) -> Result<i64>;

    /// Save a failed check
    async fn create_failure(&self, failure: &Failure) -> Result<i64>;

    /// Most recent failures of a service, newest first
    async fn get_recent_failures(&self, service_id: i64, limit: usize) -> Result<Vec<Failure>>;
}

const SERVICE_COLUMNS: &str = "id, name, type, domain, port, method, headers, post_data, expected, \
     expected_status, timeout, check_interval, tls_cert, tls_cert_key, tls_cert_root, verify_ssl, \
     follow_redirects, grpc_health_check, show_ssl, enabled, online, last_check, created_at";

fn optional_text(value: &Option<String>) -> Value {
    match value {
        Some(text) => Value::Text(text.clone()),
        None => Value::Null,
    }
}

fn service_from_row(row: &Row) -> Result<Service> {
    let kind_str: String = row.get(2)?;
    let kind: ServiceKind = kind_str.parse().map_err(anyhow::Error::msg)?;

    let mut service = Service::new(row.get(0)?, row.get::<String>(1)?, kind, row.get::<String>(3)?);
    service.port = u16::try_from(row.get::<i64>(4)?).unwrap_or(0);
    service.method = row.get(5)?;
    service.headers = row.get(6)?;
    service.post_data = row.get(7)?;
    service.expected = row.get(8)?;
    service.expected_status = row.get(9)?;
    service.timeout_seconds = row.get::<i64>(10)?.max(0) as u64;
    service.interval_seconds = row.get::<i64>(11)?.max(0) as u64;
    service.tls_cert = row.get(12)?;
    service.tls_cert_key = row.get(13)?;
    service.tls_cert_root = row.get(14)?;
    service.verify_ssl = row.get::<i64>(15)? != 0;
    service.follow_redirects = row.get::<i64>(16)? != 0;
    service.grpc_health_check = row.get::<i64>(17)? != 0;
    service.show_ssl = row.get::<i64>(18)? != 0;
    service.enabled = row.get::<i64>(19)? != 0;
    service.online = row.get::<i64>(20)? != 0;
    service.last_check = row.get::<Option<i64>>(21)?.map(i64_to_timestamp);
    service.created_at = i64_to_timestamp(row.get(22)?);

    Ok(service)
}

fn failure_from_row(row: &Row) -> Result<Failure> {
    let reason_str: String = row.get(3)?;
    let reason: Reason = reason_str.parse().map_err(anyhow::Error::msg)?;

    Ok(Failure {
        id: Some(row.get(0)?),
        service_id: row.get(1)?,
        issue: row.get(2)?,
        reason,
        error_code: row.get(4)?,
        ping_time_us: row.get::<i64>(5)?.max(0) as u64,
        created_at: i64_to_timestamp(row.get(6)?),
    })
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_enabled_services(&self) -> Result<Vec<Service>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE enabled = 1 ORDER BY id"))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut services = Vec::new();

        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }

        Ok(services)
    }

    async fn get_service(&self, id: i64) -> Result<Option<Service>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .await?;

        let mut rows = stmt.query(params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(service_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_service(&self, service: &Service) -> Result<i64> {
        let conn = self.get_conn().await?;
        let last_check = match service.last_check {
            Some(time) => Value::Integer(timestamp_to_i64(time)),
            None => Value::Null,
        };
        let mut values = vec![
            Value::Text(service.name.clone()),
            Value::Text(service.kind.as_str().to_string()),
            Value::Text(service.domain.clone()),
            Value::Integer(i64::from(service.port)),
            Value::Text(service.method.clone()),
            optional_text(&service.headers),
            optional_text(&service.post_data),
            optional_text(&service.expected),
            Value::Integer(i64::from(service.expected_status)),
            Value::Integer(u64_to_i64(service.timeout_seconds)),
            Value::Integer(u64_to_i64(service.interval_seconds)),
            optional_text(&service.tls_cert),
            optional_text(&service.tls_cert_key),
            optional_text(&service.tls_cert_root),
            Value::Integer(service.verify_ssl as i64),
            Value::Integer(service.follow_redirects as i64),
            Value::Integer(service.grpc_health_check as i64),
            Value::Integer(service.show_ssl as i64),
            Value::Integer(service.enabled as i64),
            Value::Integer(service.online as i64),
            last_check,
        ];

        if service.id > 0 {
            values.push(Value::Integer(service.id));
            conn.execute(
                "UPDATE services SET name = ?, type = ?, domain = ?, port = ?, method = ?, headers = ?, \
                 post_data = ?, expected = ?, expected_status = ?, timeout = ?, check_interval = ?, \
                 tls_cert = ?, tls_cert_key = ?, tls_cert_root = ?, verify_ssl = ?, follow_redirects = ?, \
                 grpc_health_check = ?, show_ssl = ?, enabled = ?, online = ?, last_check = ? WHERE id = ?",
                values,
            )
            .await?;
            Ok(service.id)
        } else {
            values.push(Value::Integer(timestamp_to_i64(service.created_at)));
            conn.execute(
                "INSERT INTO services (name, type, domain, port, method, headers, post_data, expected, \
                 expected_status, timeout, check_interval, tls_cert, tls_cert_key, tls_cert_root, verify_ssl, \
                 follow_redirects, grpc_health_check, show_ssl, enabled, online, last_check, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                values,
            )
            .await?;
            Ok(conn.last_insert_rowid())
        }
    }

    async fn create_hit(&self, hit: &Hit) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO hits (service_id, latency, ping_time, created_at) VALUES (?, ?, ?, ?)",
            params![
                hit.service_id,
                u64_to_i64(hit.latency_us),
                u64_to_i64(hit.ping_time_us),
                timestamp_to_i64(hit.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn create_failure(&self, failure: &Failure) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO failures (service_id, issue, reason, error_code, ping_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                failure.service_id,
                failure.issue.clone(),
                failure.reason.as_str(),
                failure.error_code,
                u64_to_i64(failure.ping_time_us),
                timestamp_to_i64(failure.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_recent_failures(&self, service_id: i64, limit: usize) -> Result<Vec<Failure>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT id, service_id, issue, reason, error_code, ping_time, created_at FROM failures \
                 WHERE service_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .await?;

        let mut rows = stmt.query(params![service_id, limit as i64]).await?;
        let mut failures = Vec::new();

        while let Some(row) = rows.next().await? {
            failures.push(failure_from_row(&row)?);
        }

        Ok(failures)
    }
}

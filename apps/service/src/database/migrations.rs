use anyhow::Result;
use chrono::Utc;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// The registry, hit and failure tables all live in one schema; the
/// service only ever adds migrations, never rewrites applied ones.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial services, hits and failures schema").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Add TLS and gRPC columns to services").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().timestamp(), description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: registry plus check history
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            domain TEXT NOT NULL,
            port INTEGER NOT NULL DEFAULT 0,
            method TEXT NOT NULL DEFAULT 'GET',
            headers TEXT,
            post_data TEXT,
            expected TEXT,
            expected_status INTEGER NOT NULL DEFAULT 200,
            timeout INTEGER NOT NULL DEFAULT 10,
            check_interval INTEGER NOT NULL DEFAULT 60,
            verify_ssl INTEGER NOT NULL DEFAULT 1,
            follow_redirects INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            online INTEGER NOT NULL DEFAULT 0,
            last_check INTEGER,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS hits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_id INTEGER NOT NULL,
            latency INTEGER NOT NULL,
            ping_time INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (service_id) REFERENCES services(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_id INTEGER NOT NULL,
            issue TEXT NOT NULL,
            reason TEXT NOT NULL,
            error_code INTEGER NOT NULL DEFAULT 0,
            ping_time INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (service_id) REFERENCES services(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_services_enabled ON services(enabled)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_hits_service_created ON hits(service_id, created_at DESC)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_failures_service_created ON failures(service_id, created_at DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: client certificates, gRPC health checks and SSL display
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    for statement in [
        "ALTER TABLE services ADD COLUMN tls_cert TEXT",
        "ALTER TABLE services ADD COLUMN tls_cert_key TEXT",
        "ALTER TABLE services ADD COLUMN tls_cert_root TEXT",
        "ALTER TABLE services ADD COLUMN grpc_health_check INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE services ADD COLUMN show_ssl INTEGER NOT NULL DEFAULT 0",
    ] {
        conn.execute(statement, ()).await?;
    }

    tracing::info!("Added TLS and gRPC columns to services table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();

        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        assert_eq!(get_current_version(&conn).await.unwrap(), SCHEMA_VERSION);
    }
}

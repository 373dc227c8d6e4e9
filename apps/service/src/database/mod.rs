/// Database abstraction layer
///
/// Services, hits and failures are stored in a local libsql database behind
/// the `Database` trait.
pub mod migrations;
pub mod models;
pub mod repository;

#[cfg(test)]
pub mod memory;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

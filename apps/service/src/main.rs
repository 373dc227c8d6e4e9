use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

mod config;
mod database;
mod monitoring;
mod notify;
mod pool;
mod telemetry;

use database::{Database, DatabaseImpl};
use monitoring::{MonitoringExecutor, Recorder, Scheduler};
use notify::{Dispatcher, LogNotifier, Notifier};
use telemetry::FacadeMetrics;

#[derive(Parser)]
#[command(name = "statwatch")]
#[command(about = "Uptime monitoring scheduler and protocol checks")]
#[command(version)]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/statwatch/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor every enabled service until Ctrl+C
    Run,
    /// Check one service now without recording the result
    Check {
        service_id: i64,
    },
    /// Inspect the TLS certificate chain presented by a host
    Ssl {
        /// host, host:port or https URL
        host: String,
        #[arg(long, default_value_t = 30)]
        warn_days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    logger::init_with(&config.logging.level, config.logging.format);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("A rustls crypto provider is already installed");
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Check { service_id } => check(config, service_id).await,
        Commands::Ssl { host, warn_days } => ssl(&host, warn_days).await,
    }
}

async fn open_database(config: &config::Config) -> Result<Arc<DatabaseImpl>> {
    let pool = pool::open_local(&config.database.path, config.database.max_connections).await?;
    {
        let conn = pool.get().await.context("Failed to get database connection")?;
        database::initialize_database(&conn).await?;
    }
    Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
}

fn executor(config: &config::Config, database: Arc<DatabaseImpl>) -> MonitoringExecutor {
    let notifier = Dispatcher::new(vec![Arc::new(LogNotifier::default()) as Arc<dyn Notifier>]);
    let recorder = Recorder::new(database, Arc::new(FacadeMetrics::default()), notifier);
    MonitoringExecutor::new(recorder, config.monitoring.ssl_warn_days)
}

async fn run(config: config::Config) -> Result<()> {
    info!("{}", config);
    let database = open_database(&config).await?;
    let executor = Arc::new(executor(&config, database.clone()));

    let mut scheduler = Scheduler::new(
        executor,
        Duration::from_millis(config.monitoring.stagger_ms),
        config.monitoring.failure_history,
    );

    let services = database.get_enabled_services().await.context("Failed to load services")?;
    scheduler.start_all(services);

    let mut refresh = tokio::time::interval(Duration::from_secs(config.monitoring.registry_refresh_seconds.max(1)));
    refresh.tick().await;

    info!("Monitoring started. Press Ctrl+C to exit.");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Ctrl+C received, stopping service loops");
                break;
            }
            _ = refresh.tick() => {
                match database.get_enabled_services().await {
                    Ok(services) => {
                        scheduler.sync(services);
                    }
                    Err(e) => error!("Failed to refresh services: {}", e),
                }
            }
        }
    }

    scheduler.shutdown().await;
    info!("Monitoring stopped");
    Ok(())
}

async fn check(config: config::Config, service_id: i64) -> Result<()> {
    let database = open_database(&config).await?;
    let Some(service) = database.get_service(service_id).await? else {
        bail!("Service #{} does not exist", service_id);
    };

    let outcome = executor(&config, database).test_service(service).await;
    println!("{outcome}");
    Ok(())
}

async fn ssl(host: &str, warn_days: i64) -> Result<()> {
    match monitoring::ssl::inspect_expiry(host, warn_days, monitoring::ssl::INSPECT_TIMEOUT).await {
        Ok(days) => {
            println!("{host}: certificate valid for {days} more days");
            Ok(())
        }
        Err(e) => bail!("{host}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitoring::error::Reason;
    use monitoring::types::{Service, ServiceKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_check_runs_a_stored_service_without_recording() {
        let dir = tempdir().unwrap();
        let mut config = config::Config::default();
        config.database.path = dir.path().join("statwatch.db").to_string_lossy().into_owned();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let database = open_database(&config).await.unwrap();
        let stored = Service::new(0, "db", ServiceKind::Tcp, "127.0.0.1").with_port(port).with_timeout(2);
        let id = database.save_service(&stored).await.unwrap();

        let service = database.get_service(id).await.unwrap().unwrap();
        let outcome = executor(&config, database.clone()).test_service(service).await;
        assert!(!outcome.online);
        assert_eq!(outcome.error.unwrap().reason, Reason::Tls);

        check(config.clone(), id).await.unwrap();
        assert!(check(config, id + 1).await.is_err());
        assert!(database.get_recent_failures(id, 5).await.unwrap().is_empty());
    }
}

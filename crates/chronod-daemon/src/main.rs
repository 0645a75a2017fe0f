use std::sync::Arc;

use clap::Parser;
use tracing::info;

use chronod_core::ChronodConfig;
use chronod_executor::{HandlerRegistry, JobExecutor};
use chronod_jobs::JobStore;
use chronod_scheduler::SchedulerEngine;

/// Background job scheduling daemon.
#[derive(Parser, Debug)]
#[command(name = "chronod", version, about)]
struct Cli {
    /// Path to the TOML config file (default: ~/.chronod/chronod.toml).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chronod=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: explicit path > CHRONOD_CONFIG env > ~/.chronod/chronod.toml
    let config_path = cli.config.or_else(|| std::env::var("CHRONOD_CONFIG").ok());
    let config = ChronodConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        ChronodConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    chronod_jobs::db::init_db(&db)?;
    info!("database migrations complete");

    // each subsystem gets its own connection for thread safety
    let open = || -> anyhow::Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    };
    let executor_store = Arc::new(JobStore::new(open()?));
    let engine_store = Arc::new(JobStore::new(open()?));

    let registry = Arc::new(HandlerRegistry::builtin());
    let executor = Arc::new(JobExecutor::new(executor_store, registry));
    let engine = SchedulerEngine::new(engine_store, executor, &config.scheduler);

    info!(
        tick_secs = config.scheduler.tick_interval_secs,
        pool = config.scheduler.max_concurrent_executions,
        "starting scheduler engine"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining in-flight executions");
    let _ = shutdown_tx.send(true);
    engine_task.await?;

    info!("chronod stopped");
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

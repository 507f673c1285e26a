//! Catalog import worker - Main entry point
//!
//! Limitation: this build wires the in-memory catalog backend, so imported
//! products live only as long as the process. Job records, queue state, and
//! row errors are still durable in Postgres. A SQL-backed catalog lands once
//! the products service exposes its schema to this worker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use catalog_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::info;

use catalog_server::catalog::memory::MemoryCatalog;
use catalog_server::config::Config;
use catalog_server::jobs::queue::PgJobQueue;
use catalog_server::jobs::store::PgJobStore;
use catalog_server::processors::{InventoryProcessor, ProcessorRegistry, ProductProcessor};
use catalog_server::worker::WorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("catalog-server".to_string())
        .filter_directives("catalog_server=debug,sqlx=info".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    info!("Starting catalog import worker");

    // Load configuration
    let config = Config::load()?;
    info!(
        slots = config.worker.slots,
        "Configuration loaded"
    );

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let store = Arc::new(PgJobStore::new(db_pool.clone()));
    let queue = Arc::new(PgJobQueue::new(db_pool, config.worker.max_attempts));

    // In-memory catalog backend; see the module doc for what that implies.
    let catalog = Arc::new(MemoryCatalog::new());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(ProductProcessor::new(catalog.clone())));
    registry.register(Arc::new(InventoryProcessor::new(catalog)));

    let pool = WorkerPool::new(store, queue, Arc::new(registry), config.worker_config());
    pool.start().await;
    info!(slots = config.worker.slots, "Worker pool started");

    shutdown_signal().await;
    info!("Shutdown signal received, draining workers");
    pool.shutdown().await;
    info!("Worker pool stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

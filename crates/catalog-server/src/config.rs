//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/catalog";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent worker slots.
pub const DEFAULT_WORKER_SLOTS: usize = 4;

/// Default idle wait between empty queue polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default rows between progress flushes.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 5;

/// Default pause between batches, in milliseconds.
pub const DEFAULT_INTER_BATCH_DELAY_MS: u64 = 200;

/// Default delay before an enqueued job becomes visible, in milliseconds.
pub const DEFAULT_ENQUEUE_DELAY_MS: u64 = 1000;

/// Default delivery attempts before a queue entry is parked.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default wall-clock cap per job, in seconds (30 minutes).
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 1800;

/// Default cap on row errors returned to callers.
pub const DEFAULT_ROW_ERROR_DISPLAY_LIMIT: i64 = 100;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub worker: WorkerSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub slots: usize,
    pub poll_interval_ms: u64,
    pub progress_interval: usize,
    pub inter_batch_delay_ms: u64,
    pub enqueue_delay_ms: u64,
    pub max_attempts: i32,
    pub job_timeout_secs: u64,
    pub row_error_display_limit: i64,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parsed(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_parsed(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            worker: WorkerSettings {
                slots: env_parsed("IMPORT_WORKER_SLOTS", DEFAULT_WORKER_SLOTS),
                poll_interval_ms: env_parsed("IMPORT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
                progress_interval: env_parsed(
                    "IMPORT_PROGRESS_INTERVAL",
                    DEFAULT_PROGRESS_INTERVAL,
                ),
                inter_batch_delay_ms: env_parsed(
                    "IMPORT_INTER_BATCH_DELAY_MS",
                    DEFAULT_INTER_BATCH_DELAY_MS,
                ),
                enqueue_delay_ms: env_parsed("IMPORT_ENQUEUE_DELAY_MS", DEFAULT_ENQUEUE_DELAY_MS),
                max_attempts: env_parsed("IMPORT_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                job_timeout_secs: env_parsed("IMPORT_JOB_TIMEOUT", DEFAULT_JOB_TIMEOUT_SECS),
                row_error_display_limit: env_parsed(
                    "IMPORT_ROW_ERROR_LIMIT",
                    DEFAULT_ROW_ERROR_DISPLAY_LIMIT,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.worker.slots == 0 {
            anyhow::bail!("Worker slots must be greater than 0");
        }

        if self.worker.progress_interval == 0 {
            anyhow::bail!("Progress interval must be greater than 0");
        }

        if self.worker.max_attempts <= 0 {
            anyhow::bail!("Max attempts must be greater than 0");
        }

        if self.worker.job_timeout_secs == 0 {
            anyhow::bail!("Job timeout must be greater than 0");
        }

        Ok(())
    }

    /// Worker pool tuning derived from these settings.
    pub fn worker_config(&self) -> crate::worker::WorkerConfig {
        use std::time::Duration;
        crate::worker::WorkerConfig {
            slots: self.worker.slots,
            poll_interval: Duration::from_millis(self.worker.poll_interval_ms),
            // The lease must outlive the job timeout, or a live job gets
            // redelivered mid-run.
            lease: Duration::from_secs(self.worker.job_timeout_secs + 300),
            progress_interval: self.worker.progress_interval,
            inter_batch_delay: Duration::from_millis(self.worker.inter_batch_delay_ms),
            job_timeout: Duration::from_secs(self.worker.job_timeout_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            worker: WorkerSettings {
                slots: DEFAULT_WORKER_SLOTS,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
                progress_interval: DEFAULT_PROGRESS_INTERVAL,
                inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY_MS,
                enqueue_delay_ms: DEFAULT_ENQUEUE_DELAY_MS,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
                row_error_display_limit: DEFAULT_ROW_ERROR_DISPLAY_LIMIT,
            },
        }
    }
}

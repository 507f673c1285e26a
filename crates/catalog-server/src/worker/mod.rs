//! Import worker pool
//!
//! A fixed number of worker slots poll the queue, claim one job each, and
//! drive it through parse, batch apply, and the terminal status write. The
//! pool is an explicit object owned by the binary; shutting it down stops
//! the polls and waits for in-flight jobs to record their outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, RowError};
use crate::jobs::models::{ImportJob, JobProgress, RowFailure};
use crate::jobs::queue::{JobQueue, QueuedJob};
use crate::jobs::store::JobStore;
use crate::processors::ProcessorRegistry;
use crate::spreadsheet;

/// Tuning knobs for the pool
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent worker slots.
    pub slots: usize,
    /// Idle wait between empty polls.
    pub poll_interval: Duration,
    /// Queue lease per delivery; must exceed `job_timeout`.
    pub lease: Duration,
    /// Flush progress after this many attempted rows.
    pub progress_interval: usize,
    /// Pause between batches to keep the catalog responsive.
    pub inter_batch_delay: Duration,
    /// Hard wall-clock cap per job.
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            slots: 4,
            poll_interval: Duration::from_secs(1),
            lease: Duration::from_secs(2100),
            progress_interval: 5,
            inter_batch_delay: Duration::from_millis(200),
            job_timeout: Duration::from_secs(1800),
        }
    }
}

/// How a delivery ended, for ack/nack purposes
enum DeliveryOutcome {
    /// A terminal job state was durably recorded (or nothing was to do).
    Recorded,
    /// Infrastructure fault before an outcome could be recorded.
    Retry,
}

/// Fixed-size pool of import workers
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<ProcessorRegistry>,
    config: WorkerConfig,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<ProcessorRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            queue,
            registry,
            config,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker slots.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for slot in 0..self.config.slots {
            let store = Arc::clone(&self.store);
            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                info!(slot, "worker slot started");
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }

                    match queue.dequeue(config.lease).await {
                        Ok(Some(delivery)) => {
                            run_delivery(&*store, &*queue, &registry, &config, delivery).await;
                        },
                        Ok(None) => {
                            // Idle; wait for work or shutdown.
                            tokio::select! {
                                _ = tokio::time::sleep(config.poll_interval) => {},
                                _ = shutdown_rx.changed() => {},
                            }
                        },
                        Err(e) => {
                            error!(slot, error = %e, "queue poll failed");
                            tokio::time::sleep(config.poll_interval).await;
                        },
                    }
                }
                info!(slot, "worker slot stopped");
            }));
        }
    }

    /// Signal shutdown and wait for slots to finish their current job.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "worker slot panicked");
            }
        }
    }
}

async fn run_delivery(
    store: &dyn JobStore,
    queue: &dyn JobQueue,
    registry: &ProcessorRegistry,
    config: &WorkerConfig,
    delivery: QueuedJob,
) {
    let outcome = process_delivery(store, registry, config, &delivery).await;
    let result = match outcome {
        DeliveryOutcome::Recorded => queue.ack(delivery.delivery_id).await,
        DeliveryOutcome::Retry => queue.nack(delivery.delivery_id).await,
    };
    if let Err(e) = result {
        error!(job_id = %delivery.job_id, error = %e, "failed to settle delivery");
    }
}

async fn process_delivery(
    store: &dyn JobStore,
    registry: &ProcessorRegistry,
    config: &WorkerConfig,
    delivery: &QueuedJob,
) -> DeliveryOutcome {
    let job = match store.get(delivery.job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!(job_id = %delivery.job_id, "queued job has no record, dropping");
            return DeliveryOutcome::Recorded;
        },
        Err(e) => {
            error!(job_id = %delivery.job_id, error = %e, "store unavailable");
            return DeliveryOutcome::Retry;
        },
    };

    // Redelivery after the outcome was already recorded.
    if job.is_terminal() {
        debug!(job_id = %job.id, status = %job.status, "job already terminal, acking redelivery");
        return DeliveryOutcome::Recorded;
    }

    if let Err(e) = store.mark_processing(job.id).await {
        error!(job_id = %job.id, error = %e, "could not mark job processing");
        return DeliveryOutcome::Retry;
    }

    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = delivery.attempts,
        "processing import job"
    );

    let outcome = match tokio::time::timeout(
        config.job_timeout,
        run_import(store, registry, config, &job),
    )
    .await
    {
        Ok(result) => settle(store, &job, result).await,
        Err(_) => {
            let timeout = PipelineError::Timeout(config.job_timeout.as_secs());
            settle(store, &job, Err(timeout)).await
        },
    };

    // The upload is consumed whatever the outcome; a redelivery must never
    // reprocess a deleted file.
    if matches!(outcome, DeliveryOutcome::Recorded) {
        if let Err(e) = tokio::fs::remove_file(&job.file_path).await {
            warn!(job_id = %job.id, path = %job.file_path, error = %e, "upload cleanup failed");
        }
    }

    outcome
}

/// Record the terminal state for a finished (or failed) run.
async fn settle(
    store: &dyn JobStore,
    job: &ImportJob,
    result: Result<ImportRun, PipelineError>,
) -> DeliveryOutcome {
    match result {
        Ok(run) => {
            let summary = if run.progress.failed_count > 0 {
                Some(format!(
                    "{} of {} rows failed",
                    run.progress.failed_count,
                    run.progress.processed_count + run.progress.failed_count
                ))
            } else {
                None
            };
            match store.complete(job.id, run.progress, summary).await {
                Ok(()) => {
                    info!(
                        job_id = %job.id,
                        processed = run.progress.processed_count,
                        failed = run.progress.failed_count,
                        "import completed"
                    );
                    DeliveryOutcome::Recorded
                },
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to record completion");
                    DeliveryOutcome::Retry
                },
            }
        },
        // Store and queue faults are retryable; everything else is a
        // terminal job failure.
        Err(PipelineError::Store(e)) => {
            error!(job_id = %job.id, error = %e, "store fault mid-run");
            DeliveryOutcome::Retry
        },
        Err(PipelineError::Queue(e)) => {
            error!(job_id = %job.id, error = %e, "queue fault mid-run");
            DeliveryOutcome::Retry
        },
        Err(e) => {
            let message = e.to_string();
            warn!(job_id = %job.id, error = %message, "import failed");
            let progress = JobProgress {
                processed_count: job.processed_count,
                failed_count: job.failed_count,
            };
            match store.fail(job.id, progress, &message).await {
                Ok(()) => DeliveryOutcome::Recorded,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to record failure");
                    DeliveryOutcome::Retry
                },
            }
        },
    }
}

struct ImportRun {
    progress: JobProgress,
}

async fn run_import(
    store: &dyn JobStore,
    registry: &ProcessorRegistry,
    config: &WorkerConfig,
    job: &ImportJob,
) -> Result<ImportRun, PipelineError> {
    let rows = spreadsheet::parse(std::path::Path::new(&job.file_path), &job.declared_filename)?;
    let processor = registry.get(job.job_type)?;
    let mut handler = processor.begin(job).await?;

    let batch_size = processor.batch_size().max(1);
    let total = rows.len();
    let mut progress = JobProgress { processed_count: 0, failed_count: 0 };
    let mut pending_errors: Vec<RowFailure> = Vec::new();
    let mut since_flush = 0usize;

    for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(config.inter_batch_delay).await;
        }

        for row in batch {
            match handler.handle(row).await {
                Ok(()) => progress.processed_count += 1,
                Err(row_error) => {
                    progress.failed_count += 1;
                    pending_errors.push(RowFailure {
                        row_number: row.row_number() as i64,
                        message: row_error.to_string(),
                        row_data: row.to_json(),
                    });
                    log_row_error(job, row.row_number(), &row_error);
                },
            }
            since_flush += 1;

            if since_flush >= config.progress_interval {
                flush_progress(store, job, progress, &mut pending_errors).await?;
                since_flush = 0;
                debug!(
                    job_id = %job.id,
                    percent = progress.percent_of(total as i64),
                    "import progress"
                );
            }
        }
    }

    flush_progress(store, job, progress, &mut pending_errors).await?;
    Ok(ImportRun { progress })
}

async fn flush_progress(
    store: &dyn JobStore,
    job: &ImportJob,
    progress: JobProgress,
    pending_errors: &mut Vec<RowFailure>,
) -> Result<(), PipelineError> {
    store.record_row_errors(job.id, pending_errors).await?;
    pending_errors.clear();
    store.update_progress(job.id, progress).await
}

fn log_row_error(job: &ImportJob, row_number: usize, error: &RowError) {
    debug!(
        job_id = %job.id,
        row = row_number,
        error = %error,
        "row rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::jobs::models::{JobStatus, JobType, Requester};
    use crate::jobs::queue::MemoryJobQueue;
    use crate::jobs::store::MemoryJobStore;
    use crate::jobs::submit::{submit_import, SubmitRequest};
    use crate::processors::{InventoryProcessor, ProductProcessor};
    use std::io::Write;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            slots: 1,
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_secs(60),
            progress_interval: 5,
            inter_batch_delay: Duration::ZERO,
            job_timeout: Duration::from_secs(30),
        }
    }

    fn registry(catalog: Arc<MemoryCatalog>) -> Arc<ProcessorRegistry> {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(ProductProcessor::new(catalog.clone())));
        registry.register(Arc::new(InventoryProcessor::new(catalog)));
        Arc::new(registry)
    }

    fn write_upload(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    async fn submit(
        store: &MemoryJobStore,
        queue: &MemoryJobQueue,
        job_type: JobType,
        path: &std::path::Path,
    ) -> uuid::Uuid {
        let job = submit_import(
            store,
            queue,
            SubmitRequest {
                job_type,
                file_path: path.to_string_lossy().into_owned(),
                declared_filename: "upload.csv".to_string(),
                requester: Requester {
                    account_id: 1,
                    is_privileged: true,
                    entitlements: vec![],
                },
                job_id: None,
            },
            Duration::ZERO,
        )
        .await
        .unwrap();
        job.id
    }

    async fn drain_one(
        store: &MemoryJobStore,
        queue: &MemoryJobQueue,
        registry: &ProcessorRegistry,
    ) {
        let config = test_config();
        let delivery = queue.dequeue(config.lease).await.unwrap().unwrap();
        run_delivery(store, queue, registry, &config, delivery).await;
    }

    #[tokio::test]
    async fn test_partial_failure_still_completes() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = registry(catalog.clone());

        // Row 2 is missing its name and must fail without stopping the rest.
        let file = write_upload(
            "sku,name,price,quantity\n\
             SKU1,Widget,9.99,10\n\
             SKU2,,4.99,5\n\
             SKU3,Gadget,1.00,1\n\
             SKU4,Gizmo,2.00,2\n\
             SKU5,Doodad,3.00,3\n",
        );
        let job_id = submit(&store, &queue, JobType::Product, file.path()).await;
        drain_one(&store, &queue, &registry).await;

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_count, 4);
        assert_eq!(job.failed_count, 1);
        assert_eq!(job.error_summary.as_deref(), Some("1 of 5 rows failed"));

        let errors = store.list_row_errors(job_id, 100).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_number, 2);
        assert_eq!(errors[0].message, "Product name is required");
        assert_eq!(errors[0].row_data["sku"], "SKU2");

        assert_eq!(catalog.product_count().await, 4);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_file_fails_job_without_row_errors() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = registry(catalog.clone());

        let file = write_upload("sku,name,price\n");
        let job_id = submit(&store, &queue, JobType::Product, file.path()).await;
        drain_one(&store, &queue, &registry).await;

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_summary.is_some());
        assert!(store.list_row_errors(job_id, 100).await.unwrap().is_empty());
        assert_eq!(catalog.product_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_deleted_after_terminal_state() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = registry(catalog);

        let file = write_upload("sku,name\nA-1,Widget\n");
        // Detach so the worker owns deletion.
        let path = file.into_temp_path().keep().unwrap();

        let job_id = submit(&store, &queue, JobType::Product, &path).await;
        drain_one(&store, &queue, &registry).await;

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_redelivered_terminal_job_is_acked_without_rerun() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = registry(catalog.clone());

        let file = write_upload("sku,name\nA-1,Widget\n");
        let job_id = submit(&store, &queue, JobType::Product, file.path()).await;

        // Duplicate delivery for the same job.
        queue.enqueue(job_id, Duration::ZERO).await.unwrap();

        drain_one(&store, &queue, &registry).await;
        drain_one(&store, &queue, &registry).await;

        assert_eq!(catalog.product_count().await, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_pool_processes_jobs_and_shuts_down() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryJobQueue::new(3));
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = registry(catalog.clone());

        let file = write_upload("sku,quantity\nA-1,7\n");
        // Seed the product the inventory upload targets.
        {
            use crate::catalog::{CatalogStore, NewProduct, ProductFields};
            catalog
                .create_product(NewProduct {
                    sku: "A-1".to_string(),
                    owner_id: 1,
                    fields: ProductFields {
                        name: "Stocked".to_string(),
                        ..Default::default()
                    },
                    quantity: 0,
                })
                .await
                .unwrap();
        }
        let job_id = submit(&store, &queue, JobType::Inventory, file.path()).await;

        let pool = WorkerPool::new(store.clone(), queue.clone(), registry, test_config());
        pool.start().await;

        // Wait for the job to reach a terminal state.
        for _ in 0..100 {
            if let Some(job) = store.get(job_id).await.unwrap() {
                if job.is_terminal() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown().await;

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(catalog.product(1).await.unwrap().quantity, 7);
    }
}

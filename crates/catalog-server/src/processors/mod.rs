//! Row processors
//!
//! Each import kind registers a [`RowProcessor`]. The worker asks the
//! processor to `begin` a job, which prefetches reference data once and
//! returns a stateful [`RowHandler`] that applies one row at a time. Row
//! failures are values ([`RowError`]), never control flow for the job.

pub mod inventory;
pub mod product;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PipelineError, RowError};
use crate::jobs::models::{ImportJob, JobType};
use crate::spreadsheet::RowRecord;

pub use inventory::InventoryProcessor;
pub use product::ProductProcessor;

/// Factory for per-job row handlers
#[async_trait]
pub trait RowProcessor: Send + Sync {
    /// The job type this processor handles.
    fn job_type(&self) -> JobType;

    /// Rows per batch; tuned per import kind.
    fn batch_size(&self) -> usize;

    /// Prefetch reference data and build the stateful handler for one job.
    async fn begin(&self, job: &ImportJob) -> Result<Box<dyn RowHandler>, PipelineError>;
}

/// Applies one spreadsheet row
///
/// Handlers are stateful within a job (prefetched lookup maps, SKUs already
/// seen) and are dropped when the job ends.
#[async_trait]
pub trait RowHandler: Send {
    async fn handle(&mut self, row: &RowRecord) -> Result<(), RowError>;
}

/// Registry mapping job types to processors
///
/// Dispatch fails closed: a job type without a registered processor fails
/// the job instead of guessing a handler.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<JobType, Arc<dyn RowProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn RowProcessor>) {
        self.processors.insert(processor.job_type(), processor);
    }

    pub fn get(&self, job_type: JobType) -> Result<Arc<dyn RowProcessor>, PipelineError> {
        self.processors
            .get(&job_type)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownJobType(job_type.to_string()))
    }
}

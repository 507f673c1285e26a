//! Import job lifecycle
//!
//! Durable job records, the at-least-once work queue, and submission.
//! Everything a worker needs to resume reporting after a crash lives in the
//! job row, never in process memory.

pub mod models;
pub mod queue;
pub mod store;
pub mod submit;

pub use models::{
    ImportJob, JobProgress, JobRowError, JobStatus, JobType, NewImportJob, Requester, RowFailure,
};
pub use queue::{JobQueue, MemoryJobQueue, PgJobQueue, QueuedJob};
pub use store::{JobStore, MemoryJobStore, PgJobStore};
pub use submit::{submit_import, SubmitRequest};

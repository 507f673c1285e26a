//! Import submission
//!
//! Creates the durable job record first, then enqueues it. The enqueue delay
//! gives the upload's surrounding transaction time to commit before a worker
//! can pick the job up.

use std::path::Path;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::jobs::models::{ImportJob, JobType, NewImportJob, Requester};
use crate::jobs::queue::JobQueue;
use crate::jobs::store::JobStore;
use crate::spreadsheet;

/// A submitted upload ready to become a job
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub job_type: JobType,
    /// Server-side path of the stored upload.
    pub file_path: String,
    /// Filename as the uploader named it.
    pub declared_filename: String,
    pub requester: Requester,
    /// Caller-supplied id, for callers that hand out the id before upload.
    pub job_id: Option<Uuid>,
}

/// Record a pending job and schedule it for pickup
///
/// The row-count pre-scan is a progress estimate only; a file that cannot be
/// opened or has an unsupported extension is rejected here, before a job
/// record exists.
pub async fn submit_import(
    store: &dyn JobStore,
    queue: &dyn JobQueue,
    request: SubmitRequest,
    enqueue_delay: Duration,
) -> Result<ImportJob, PipelineError> {
    let total_rows =
        spreadsheet::count_rows(Path::new(&request.file_path), &request.declared_filename)?;

    let job_id = request.job_id.unwrap_or_else(Uuid::new_v4);
    let job = store
        .create(NewImportJob {
            id: job_id,
            job_type: request.job_type,
            file_path: request.file_path,
            declared_filename: request.declared_filename,
            requester: request.requester,
            total_rows,
        })
        .await?;

    queue.enqueue(job.id, enqueue_delay).await?;

    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        total_rows = job.total_rows,
        "import submitted"
    );
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::models::JobStatus;
    use crate::jobs::queue::MemoryJobQueue;
    use crate::jobs::store::MemoryJobStore;
    use std::io::Write;

    fn requester() -> Requester {
        Requester {
            account_id: 1,
            is_privileged: true,
            entitlements: vec![],
        }
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job_and_enqueues() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let file = write_csv("sku,name\nA-1,Widget\nA-2,Gadget\n");

        let job = submit_import(
            &store,
            &queue,
            SubmitRequest {
                job_type: JobType::Product,
                file_path: file.path().to_string_lossy().into_owned(),
                declared_filename: "products.csv".to_string(),
                requester: requester(),
                job_id: None,
            },
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_rows, 2);
        assert_eq!(queue.len().await, 1);
        assert!(store.get(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_honors_caller_job_id() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let file = write_csv("sku,quantity\nA-1,5\n");
        let wanted = Uuid::new_v4();

        let job = submit_import(
            &store,
            &queue,
            SubmitRequest {
                job_type: JobType::Inventory,
                file_path: file.path().to_string_lossy().into_owned(),
                declared_filename: "inventory.csv".to_string(),
                requester: requester(),
                job_id: Some(wanted),
            },
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(job.id, wanted);
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected_before_job_exists() {
        let store = MemoryJobStore::new();
        let queue = MemoryJobQueue::new(3);
        let file = write_csv("sku,name\nA-1,Widget\n");

        let result = submit_import(
            &store,
            &queue,
            SubmitRequest {
                job_type: JobType::Product,
                file_path: file.path().to_string_lossy().into_owned(),
                declared_filename: "products.pdf".to_string(),
                requester: requester(),
                job_id: None,
            },
            Duration::ZERO,
        )
        .await;

        assert!(result.is_err());
        assert!(queue.is_empty().await);
    }
}

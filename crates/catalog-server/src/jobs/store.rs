//! Durable job storage
//!
//! The worker reports all progress through [`JobStore`]; a restarted reader
//! sees exactly what was last flushed. `PgJobStore` is the production
//! backend, `MemoryJobStore` backs tests.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::jobs::models::{
    ImportJob, JobProgress, JobRowError, JobStatus, JobType, NewImportJob, Requester, RowFailure,
};

/// Persistence seam for job records and row errors
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job record.
    async fn create(&self, job: NewImportJob) -> Result<ImportJob, PipelineError>;

    async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, PipelineError>;

    /// Transition to processing and stamp `started_at`.
    async fn mark_processing(&self, id: Uuid) -> Result<(), PipelineError>;

    /// Flush monotonic progress counters mid-run.
    async fn update_progress(&self, id: Uuid, progress: JobProgress) -> Result<(), PipelineError>;

    /// Final counters plus an optional summary of row-level failures.
    async fn complete(
        &self,
        id: Uuid,
        progress: JobProgress,
        error_summary: Option<String>,
    ) -> Result<(), PipelineError>;

    /// Terminal failure before or during processing.
    async fn fail(
        &self,
        id: Uuid,
        progress: JobProgress,
        message: &str,
    ) -> Result<(), PipelineError>;

    /// Append per-row failures for later display.
    async fn record_row_errors(
        &self,
        job_id: Uuid,
        errors: &[RowFailure],
    ) -> Result<(), PipelineError>;

    /// Most recent row errors, capped at `limit`.
    async fn list_row_errors(
        &self,
        job_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JobRowError>, PipelineError>;

    /// Delete a job and its row errors. Only the submitting account or a
    /// privileged caller may delete; returns `false` when no such job exists.
    async fn delete(&self, id: Uuid, requester: &Requester) -> Result<bool, PipelineError>;
}

fn check_delete_allowed(job: &ImportJob, requester: &Requester) -> Result<(), PipelineError> {
    if requester.is_privileged || requester.account_id == job.requester.account_id {
        Ok(())
    } else {
        Err(PipelineError::Forbidden(
            "Only the submitting account may delete this job".to_string(),
        ))
    }
}

// ============================================================================
// Postgres backend
// ============================================================================

/// Job store backed by `catalog_import_jobs` / `catalog_import_row_errors`
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<ImportJob, PipelineError> {
        let status: String = row.try_get("status").map_err(store_err)?;
        let job_type: String = row.try_get("job_type").map_err(store_err)?;
        let requester: serde_json::Value = row.try_get("requester").map_err(store_err)?;

        Ok(ImportJob {
            id: row.try_get("id").map_err(store_err)?,
            job_type: JobType::from_str(&job_type).map_err(|e| PipelineError::Store(e.to_string()))?,
            status: JobStatus::from_str(&status).map_err(|e| PipelineError::Store(e.to_string()))?,
            file_path: row.try_get("file_path").map_err(store_err)?,
            declared_filename: row.try_get("declared_filename").map_err(store_err)?,
            requester: serde_json::from_value::<Requester>(requester)
                .map_err(|e| PipelineError::Store(e.to_string()))?,
            total_rows: row.try_get("total_rows").map_err(store_err)?,
            processed_count: row.try_get("processed_count").map_err(store_err)?,
            failed_count: row.try_get("failed_count").map_err(store_err)?,
            error_summary: row.try_get("error_summary").map_err(store_err)?,
            created_at: row.try_get("created_at").map_err(store_err)?,
            updated_at: row.try_get("updated_at").map_err(store_err)?,
            started_at: row.try_get("started_at").map_err(store_err)?,
            completed_at: row.try_get("completed_at").map_err(store_err)?,
        })
    }
}

fn store_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Store(e.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: NewImportJob) -> Result<ImportJob, PipelineError> {
        let requester = serde_json::to_value(&job.requester)
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO catalog_import_jobs
                (id, job_type, status, file_path, declared_filename, requester, total_rows)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6)
            RETURNING id, job_type, status, file_path, declared_filename, requester,
                      total_rows, processed_count, failed_count, error_summary,
                      created_at, updated_at, started_at, completed_at
            "#,
        )
        .bind(job.id)
        .bind(job.job_type.to_string())
        .bind(&job.file_path)
        .bind(&job.declared_filename)
        .bind(requester)
        .bind(job.total_rows)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        debug!(job_id = %job.id, job_type = %job.job_type, "created import job");
        Self::job_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, PipelineError> {
        let row = sqlx::query(
            r#"
            SELECT id, job_type, status, file_path, declared_filename, requester,
                   total_rows, processed_count, failed_count, error_summary,
                   created_at, updated_at, started_at, completed_at
            FROM catalog_import_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE catalog_import_jobs
            SET status = 'processing', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: JobProgress) -> Result<(), PipelineError> {
        // GREATEST keeps counters monotonic under redelivery.
        sqlx::query(
            r#"
            UPDATE catalog_import_jobs
            SET processed_count = GREATEST(processed_count, $2),
                failed_count = GREATEST(failed_count, $3),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(progress.processed_count)
        .bind(progress.failed_count)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        progress: JobProgress,
        error_summary: Option<String>,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE catalog_import_jobs
            SET status = 'completed',
                processed_count = GREATEST(processed_count, $2),
                failed_count = GREATEST(failed_count, $3),
                error_summary = $4,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(progress.processed_count)
        .bind(progress.failed_count)
        .bind(error_summary)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn fail(
        &self,
        id: Uuid,
        progress: JobProgress,
        message: &str,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE catalog_import_jobs
            SET status = 'failed',
                processed_count = GREATEST(processed_count, $2),
                failed_count = GREATEST(failed_count, $3),
                error_summary = $4,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(progress.processed_count)
        .bind(progress.failed_count)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn record_row_errors(
        &self,
        job_id: Uuid,
        errors: &[RowFailure],
    ) -> Result<(), PipelineError> {
        if errors.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for failure in errors {
            sqlx::query(
                r#"
                INSERT INTO catalog_import_row_errors (job_id, row_number, message, row_data)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(job_id)
            .bind(failure.row_number)
            .bind(&failure.message)
            .bind(&failure.row_data)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn list_row_errors(
        &self,
        job_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JobRowError>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, row_number, message, row_data, created_at
            FROM catalog_import_row_errors
            WHERE job_id = $1
            ORDER BY row_number ASC
            LIMIT $2
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(JobRowError {
                    job_id: row.try_get("job_id").map_err(store_err)?,
                    row_number: row.try_get("row_number").map_err(store_err)?,
                    message: row.try_get("message").map_err(store_err)?,
                    row_data: row.try_get("row_data").map_err(store_err)?,
                    created_at: row.try_get("created_at").map_err(store_err)?,
                })
            })
            .collect()
    }

    async fn delete(&self, id: Uuid, requester: &Requester) -> Result<bool, PipelineError> {
        let Some(job) = self.get(id).await? else {
            return Ok(false);
        };
        check_delete_allowed(&job, requester)?;

        // Row errors and queue entries go with the job via ON DELETE CASCADE.
        sqlx::query("DELETE FROM catalog_import_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        debug!(job_id = %id, account_id = requester.account_id, "deleted import job");
        Ok(true)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, ImportJob>,
    row_errors: Vec<JobRowError>,
}

/// In-memory job store for tests
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn touch(job: &mut ImportJob, progress: JobProgress, now: DateTime<Utc>) {
    job.processed_count = job.processed_count.max(progress.processed_count);
    job.failed_count = job.failed_count.max(progress.failed_count);
    job.updated_at = now;
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: NewImportJob) -> Result<ImportJob, PipelineError> {
        let now = Utc::now();
        let record = ImportJob {
            id: job.id,
            job_type: job.job_type,
            status: JobStatus::Pending,
            file_path: job.file_path,
            declared_filename: job.declared_filename,
            requester: job.requester,
            total_rows: job.total_rows,
            processed_count: 0,
            failed_count: 0,
            error_summary: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        self.state.lock().await.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, PipelineError> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Processing;
                let now = Utc::now();
                job.started_at = Some(now);
                job.updated_at = now;
            }
        }
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: JobProgress) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            touch(job, progress, Utc::now());
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        progress: JobProgress,
        error_summary: Option<String>,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                let now = Utc::now();
                touch(job, progress, now);
                job.status = JobStatus::Completed;
                job.error_summary = error_summary;
                job.completed_at = Some(now);
            }
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: Uuid,
        progress: JobProgress,
        message: &str,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                let now = Utc::now();
                touch(job, progress, now);
                job.status = JobStatus::Failed;
                job.error_summary = Some(message.to_string());
                job.completed_at = Some(now);
            }
        }
        Ok(())
    }

    async fn record_row_errors(
        &self,
        job_id: Uuid,
        errors: &[RowFailure],
    ) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        for failure in errors {
            state.row_errors.push(JobRowError {
                job_id,
                row_number: failure.row_number,
                message: failure.message.clone(),
                row_data: failure.row_data.clone(),
                created_at: now,
            });
        }
        Ok(())
    }

    async fn list_row_errors(
        &self,
        job_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JobRowError>, PipelineError> {
        let state = self.state.lock().await;
        let mut errors: Vec<JobRowError> = state
            .row_errors
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        errors.sort_by_key(|e| e.row_number);
        errors.truncate(limit.max(0) as usize);
        Ok(errors)
    }

    async fn delete(&self, id: Uuid, requester: &Requester) -> Result<bool, PipelineError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get(&id) else {
            return Ok(false);
        };
        check_delete_allowed(job, requester)?;

        state.jobs.remove(&id);
        state.row_errors.retain(|e| e.job_id != id);
        Ok(true)
    }
}

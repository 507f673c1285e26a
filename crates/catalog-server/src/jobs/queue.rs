//! At-least-once work queue
//!
//! Delivery is lease-based: a claimed entry becomes invisible for the lease
//! duration and reappears if the worker dies without acking. Entries whose
//! attempts exceed the cap are parked rather than deleted, so an operator
//! can inspect what kept failing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::PipelineError;

/// A claimed queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Identifies this delivery for ack/nack.
    pub delivery_id: i64,
    pub job_id: Uuid,
    /// Delivery attempts so far, including this one.
    pub attempts: i32,
}

/// Queue seam between submission and the worker pool
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Make a job available for pickup after `visibility_delay`.
    async fn enqueue(&self, job_id: Uuid, visibility_delay: Duration)
        -> Result<(), PipelineError>;

    /// Claim the next visible entry, holding it for `lease`.
    async fn dequeue(&self, lease: Duration) -> Result<Option<QueuedJob>, PipelineError>;

    /// Remove a delivered entry after its outcome was durably recorded.
    async fn ack(&self, delivery_id: i64) -> Result<(), PipelineError>;

    /// Release a delivery for immediate redelivery.
    async fn nack(&self, delivery_id: i64) -> Result<(), PipelineError>;
}

// ============================================================================
// Postgres backend
// ============================================================================

/// Queue backed by `catalog_import_queue`
///
/// Claims use `FOR UPDATE SKIP LOCKED` so concurrent workers never block on
/// or double-claim the same entry.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    max_attempts: i32,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }
}

fn queue_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Queue(e.to_string())
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        job_id: Uuid,
        visibility_delay: Duration,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO catalog_import_queue (job_id, visible_at)
            VALUES ($1, NOW() + $2 * INTERVAL '1 millisecond')
            "#,
        )
        .bind(job_id)
        .bind(visibility_delay.as_millis() as i64)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;

        debug!(job_id = %job_id, delay_ms = visibility_delay.as_millis() as u64, "enqueued job");
        Ok(())
    }

    async fn dequeue(&self, lease: Duration) -> Result<Option<QueuedJob>, PipelineError> {
        // Park entries whose lease expired after the final allowed attempt.
        let parked = sqlx::query(
            r#"
            UPDATE catalog_import_queue
            SET parked = TRUE
            WHERE NOT parked
              AND attempts >= $1
              AND (locked_until IS NULL OR locked_until < NOW())
            "#,
        )
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        if parked.rows_affected() > 0 {
            warn!(count = parked.rows_affected(), "parked exhausted queue entries");
        }

        let row = sqlx::query(
            r#"
            UPDATE catalog_import_queue
            SET attempts = attempts + 1,
                locked_until = NOW() + $2 * INTERVAL '1 millisecond'
            WHERE id = (
                SELECT id FROM catalog_import_queue
                WHERE NOT parked
                  AND visible_at <= NOW()
                  AND (locked_until IS NULL OR locked_until < NOW())
                  AND attempts < $1
                ORDER BY visible_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, job_id, attempts
            "#,
        )
        .bind(self.max_attempts)
        .bind(lease.as_millis() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_err)?;

        match row {
            Some(row) => Ok(Some(QueuedJob {
                delivery_id: row.try_get("id").map_err(queue_err)?,
                job_id: row.try_get("job_id").map_err(queue_err)?,
                attempts: row.try_get("attempts").map_err(queue_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM catalog_import_queue WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn nack(&self, delivery_id: i64) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE catalog_import_queue
            SET locked_until = NULL, visible_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery_id)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryEntry {
    delivery_id: i64,
    job_id: Uuid,
    visible_at: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    attempts: i32,
    parked: bool,
}

#[derive(Default)]
struct MemoryQueueState {
    entries: VecDeque<MemoryEntry>,
    next_id: i64,
}

/// In-memory queue for tests
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    state: Arc<Mutex<MemoryQueueState>>,
    max_attempts: i32,
}

impl MemoryJobQueue {
    pub fn new(max_attempts: i32) -> Self {
        Self {
            state: Arc::default(),
            max_attempts,
        }
    }

    /// Entries parked after exhausting their attempts.
    pub async fn parked_jobs(&self) -> Vec<Uuid> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.parked)
            .map(|e| e.job_id)
            .collect()
    }

    /// Number of live (unparked) entries, delivered or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.iter().filter(|e| !e.parked).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        job_id: Uuid,
        visibility_delay: Duration,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let delivery_id = state.next_id;
        let delay = chrono::Duration::from_std(visibility_delay)
            .map_err(|e| PipelineError::Queue(e.to_string()))?;
        state.entries.push_back(MemoryEntry {
            delivery_id,
            job_id,
            visible_at: Utc::now() + delay,
            locked_until: None,
            attempts: 0,
            parked: false,
        });
        Ok(())
    }

    async fn dequeue(&self, lease: Duration) -> Result<Option<QueuedJob>, PipelineError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| PipelineError::Queue(e.to_string()))?;
        let mut state = self.state.lock().await;

        for entry in state.entries.iter_mut() {
            let unlocked = entry.locked_until.map_or(true, |t| t < now);
            if entry.parked || !unlocked {
                continue;
            }
            if entry.attempts >= self.max_attempts {
                entry.parked = true;
                continue;
            }
            if entry.visible_at > now {
                continue;
            }
            entry.attempts += 1;
            entry.locked_until = Some(now + lease);
            return Ok(Some(QueuedJob {
                delivery_id: entry.delivery_id,
                job_id: entry.job_id,
                attempts: entry.attempts,
            }));
        }
        Ok(None)
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        state.entries.retain(|e| e.delivery_id != delivery_id);
        Ok(())
    }

    async fn nack(&self, delivery_id: i64) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.iter_mut().find(|e| e.delivery_id == delivery_id) {
            entry.locked_until = None;
            entry.visible_at = now;
        }
        Ok(())
    }
}

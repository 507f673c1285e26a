//! Data models for import jobs
//!
//! Models for tracking job status, progress counters, and per-row failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Import job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Kind of import a job performs
///
/// Dispatch fails closed: a job type with no registered processor fails the
/// job rather than guessing, so parsing is strict here too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Product,
    Inventory,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::Product => write!(f, "product"),
            JobType::Inventory => write!(f, "inventory"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(JobType::Product),
            "inventory" => Ok(JobType::Inventory),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

/// The identity on whose behalf a job runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub account_id: i64,
    /// Privileged callers may act across owners and see gated fields.
    pub is_privileged: bool,
    /// Feature entitlements such as "wholesale".
    #[serde(default)]
    pub entitlements: Vec<String>,
}

impl Requester {
    pub fn has_entitlement(&self, name: &str) -> bool {
        self.entitlements.iter().any(|e| e == name)
    }
}

/// A durable import job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Server-side path of the uploaded file.
    pub file_path: String,
    /// Filename as the uploader named it; drives format detection.
    pub declared_filename: String,
    pub requester: Requester,
    /// Pre-scan estimate; the authoritative counts are processed + failed.
    pub total_rows: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub error_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Rows accounted for so far, successful or not.
    pub fn attempted_rows(&self) -> i64 {
        self.processed_count + self.failed_count
    }
}

/// Request to create a new job record
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub file_path: String,
    pub declared_filename: String,
    pub requester: Requester,
    pub total_rows: i64,
}

/// A monotonic progress snapshot flushed mid-run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    pub processed_count: i64,
    pub failed_count: i64,
}

impl JobProgress {
    /// Percentage against the pre-scan estimate, clamped to 100.
    pub fn percent_of(&self, total_rows: i64) -> u8 {
        if total_rows <= 0 {
            return 0;
        }
        let attempted = self.processed_count + self.failed_count;
        (((attempted * 100) / total_rows).clamp(0, 100)) as u8
    }
}

/// A row failure captured mid-run, before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row_number: i64,
    pub message: String,
    /// The offending row as submitted, for display next to the message.
    pub row_data: serde_json::Value,
}

/// A recorded per-row failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRowError {
    pub job_id: Uuid,
    /// 1-based position among data rows, as the uploader would count them.
    pub row_number: i64,
    pub message: String,
    pub row_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

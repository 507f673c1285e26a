//! Catalog bulk import/export pipeline
//!
//! Background processing for spreadsheet-driven catalog maintenance:
//!
//! - **Upload path**: a submitted CSV/workbook file becomes a durable import
//!   job, queued for a worker slot; the worker parses the file and applies it
//!   row by row against the catalog store with per-row failure isolation.
//! - **Export path**: field-selected, filtered extraction of catalog records
//!   into a downloadable spreadsheet.
//! - **Templates**: blank spreadsheets documenting the expected import shape
//!   per job type.
//!
//! # Architecture
//!
//! The pipeline is built around three seams, each an object-safe async trait:
//!
//! - [`jobs::JobStore`] — durable job lifecycle records and per-row error log
//! - [`jobs::JobQueue`] — at-least-once delivery queue decoupling submission
//!   from processing (Postgres `SKIP LOCKED` claim in production)
//! - [`catalog::CatalogStore`] — the external product/inventory collaborator
//!
//! A [`worker::WorkerPool`] owns all three plus a
//! [`processors::ProcessorRegistry`] mapping job types to row processors. Row
//! failures are values ([`error::RowError`]), recorded and skipped; only
//! pipeline-level errors ([`error::PipelineError`]) fail a job.

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod jobs;
pub mod processors;
pub mod spreadsheet;
pub mod template;
pub mod worker;

// Re-export commonly used types
pub use error::{PipelineError, RowError};

//! Catalog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the catalog pipeline workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all workspace members:
//!
//! - **Error Handling**: the base [`CatalogError`] type and result alias
//! - **Logging**: centralized `tracing` initialization with env overrides

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CatalogError, Result};

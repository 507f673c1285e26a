//! Inventory import processor
//!
//! Sets absolute stock levels by SKU. Rows are cheaper than product rows,
//! so batches are larger.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::catalog::{CatalogStore, InventoryLevel, OwnerScope};
use crate::error::{PipelineError, RowError};
use crate::jobs::models::{ImportJob, JobType};
use crate::processors::{RowHandler, RowProcessor};
use crate::spreadsheet::coerce;
use crate::spreadsheet::RowRecord;

const BATCH_SIZE: usize = 50;

pub struct InventoryProcessor {
    catalog: Arc<dyn CatalogStore>,
}

impl InventoryProcessor {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RowProcessor for InventoryProcessor {
    fn job_type(&self) -> JobType {
        JobType::Inventory
    }

    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    async fn begin(&self, job: &ImportJob) -> Result<Box<dyn RowHandler>, PipelineError> {
        let scope = if job.requester.is_privileged {
            OwnerScope::All
        } else {
            OwnerScope::Owner(job.requester.account_id)
        };
        Ok(Box::new(InventoryRowHandler {
            catalog: Arc::clone(&self.catalog),
            scope,
        }))
    }
}

struct InventoryRowHandler {
    catalog: Arc<dyn CatalogStore>,
    scope: OwnerScope,
}

#[async_trait]
impl RowHandler for InventoryRowHandler {
    async fn handle(&mut self, row: &RowRecord) -> Result<(), RowError> {
        let sku = row.field("sku");
        if sku.is_empty() {
            return Err(RowError::validation("SKU is required"));
        }
        let Some(quantity) = coerce::parse_quantity(row.field("quantity")) else {
            return Err(RowError::validation("Quantity must be a whole number"));
        };
        let reorder_quantity = if row.has_value("reorder_qty") {
            match coerce::parse_quantity(row.field("reorder_qty")) {
                Some(q) => Some(q),
                None => {
                    return Err(RowError::validation(
                        "Reorder quantity must be a whole number",
                    ))
                },
            }
        } else {
            None
        };

        let found = self
            .catalog
            .find_by_sku(&sku.to_lowercase(), self.scope)
            .await
            .map_err(|e| RowError::apply(e.to_string()))?
            .ok_or_else(|| RowError::lookup(format!("SKU '{}' not found", sku)))?;

        let reason = row.field("reason");
        if !reason.is_empty() {
            debug!(sku, reason, "inventory adjustment noted");
        }

        self.catalog
            .set_inventory(InventoryLevel {
                product_id: found.product_id,
                quantity,
                reorder_quantity,
            })
            .await
            .map_err(|e| RowError::apply(e.to_string()))
    }
}

//! Product import processor
//!
//! Upserts products by SKU, matched case-insensitively. Reference data
//! (categories, vendor accounts) and the caller's existing SKUs are
//! prefetched once per job; rows then resolve against the in-memory maps
//! with no per-row catalog lookup. SKUs created earlier in the same job
//! join the map so a repeated SKU updates the new record instead of
//! failing as a duplicate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::{
    CatalogStore, InventoryLevel, NewProduct, OwnerScope, ProductFields,
};
use crate::error::{PipelineError, RowError};
use crate::jobs::models::{ImportJob, JobType, Requester};
use crate::processors::{RowHandler, RowProcessor};
use crate::spreadsheet::coerce;
use crate::spreadsheet::RowRecord;

const BATCH_SIZE: usize = 10;

pub struct ProductProcessor {
    catalog: Arc<dyn CatalogStore>,
}

impl ProductProcessor {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RowProcessor for ProductProcessor {
    fn job_type(&self) -> JobType {
        JobType::Product
    }

    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    async fn begin(&self, job: &ImportJob) -> Result<Box<dyn RowHandler>, PipelineError> {
        let categories: HashMap<String, i64> = self
            .catalog
            .list_categories()
            .await?
            .into_iter()
            .map(|c| (c.name.to_lowercase(), c.id))
            .collect();
        let accounts: HashMap<String, i64> = self
            .catalog
            .list_accounts()
            .await?
            .into_iter()
            .map(|a| (a.username.to_lowercase(), a.id))
            .collect();

        let requester = job.requester.clone();
        let scope = if requester.is_privileged {
            OwnerScope::All
        } else {
            OwnerScope::Owner(requester.account_id)
        };

        // One scoped scan up front; rows then resolve existing SKUs without
        // a catalog round trip each.
        let seen_skus: HashMap<String, i64> = self
            .catalog
            .list_owned_skus(scope)
            .await?
            .into_iter()
            .map(|s| (s.sku.to_lowercase(), s.product_id))
            .collect();

        Ok(Box::new(ProductRowHandler {
            catalog: Arc::clone(&self.catalog),
            requester,
            categories,
            accounts,
            seen_skus,
        }))
    }
}

struct ProductRowHandler {
    catalog: Arc<dyn CatalogStore>,
    requester: Requester,
    categories: HashMap<String, i64>,
    accounts: HashMap<String, i64>,
    /// Lowercase SKU -> product id: the scoped prefetch plus every SKU this
    /// job has created so far.
    seen_skus: HashMap<String, i64>,
}

impl ProductRowHandler {
    fn resolve_owner(&self, row: &RowRecord) -> Result<i64, RowError> {
        let vendor = row.field("vendor_username");
        if vendor.is_empty() {
            return Ok(self.requester.account_id);
        }
        if !self.requester.is_privileged {
            return Err(RowError::ownership(
                "Only administrators may assign products to a vendor",
            ));
        }
        self.accounts
            .get(&vendor.to_lowercase())
            .copied()
            .ok_or_else(|| RowError::lookup(format!("Vendor username '{}' not found", vendor)))
    }

    fn build_fields(&self, row: &RowRecord, name: String) -> ProductFields {
        // Wholesale pricing is entitlement-gated; ungated callers' cells are
        // ignored rather than rejected.
        let wholesale_allowed =
            self.requester.is_privileged || self.requester.has_entitlement("wholesale");
        let wholesale_price = if wholesale_allowed && row.has_value("wholesale_price") {
            Some(coerce::parse_price(row.field("wholesale_price")))
        } else {
            None
        };

        // Unknown category names fall back to uncategorized.
        let category_id = self
            .categories
            .get(&row.field("category").to_lowercase())
            .copied();

        ProductFields {
            name,
            description: row.has_value("description").then(|| row.field("description").to_string()),
            price: coerce::parse_price(row.field("price")),
            wholesale_price,
            category_id,
            status: coerce::parse_product_status(row.field("status")),
            product_type: coerce::parse_product_type(row.field("product_type")),
            returnable: coerce::parse_return_policy(row.field("returnable")),
            weight: coerce::parse_dimension(row.field("weight")),
            length: coerce::parse_dimension(row.field("length")),
            width: coerce::parse_dimension(row.field("width")),
            height: coerce::parse_dimension(row.field("height")),
        }
    }
}

#[async_trait]
impl RowHandler for ProductRowHandler {
    async fn handle(&mut self, row: &RowRecord) -> Result<(), RowError> {
        let sku = row.field("sku").to_string();
        let name = row.field("name").to_string();
        if name.is_empty() {
            return Err(RowError::validation("Product name is required"));
        }

        let owner_id = self.resolve_owner(row)?;
        let fields = self.build_fields(row, name);
        let quantity = coerce::parse_quantity(row.field("quantity"));

        // A blank SKU can never match an existing product, so it always
        // creates and is never tracked for later rows.
        if sku.is_empty() {
            self.catalog
                .create_product(NewProduct {
                    sku,
                    owner_id,
                    fields,
                    quantity: quantity.unwrap_or(0),
                })
                .await
                .map_err(|e| RowError::apply(e.to_string()))?;
            return Ok(());
        }

        let sku_lower = sku.to_lowercase();
        let product_id = match self.seen_skus.get(&sku_lower).copied() {
            Some(id) => {
                self.catalog
                    .update_product(id, fields)
                    .await
                    .map_err(|e| RowError::apply(e.to_string()))?;
                if let Some(quantity) = quantity {
                    self.catalog
                        .set_inventory(InventoryLevel {
                            product_id: id,
                            quantity,
                            reorder_quantity: None,
                        })
                        .await
                        .map_err(|e| RowError::apply(e.to_string()))?;
                }
                id
            },
            None => {
                let created = self
                    .catalog
                    .create_product(NewProduct {
                        sku,
                        owner_id,
                        fields,
                        quantity: quantity.unwrap_or(0),
                    })
                    .await
                    .map_err(|e| RowError::apply(e.to_string()))?;
                created.product_id
            },
        };

        self.seen_skus.insert(sku_lower, product_id);
        Ok(())
    }
}

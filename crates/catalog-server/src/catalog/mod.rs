//! Catalog access seam
//!
//! The pipeline never talks to catalog tables directly; processors and the
//! export builder go through [`CatalogStore`]. Ownership scoping is enforced
//! at this seam so no caller can widen its own visibility.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub use memory::MemoryCatalog;

/// Visibility scope for catalog reads and writes
///
/// Privileged callers operate across all owners; everyone else is pinned to
/// their own account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    All,
    Owner(i64),
}

impl OwnerScope {
    pub fn allows(self, owner_id: i64) -> bool {
        match self {
            OwnerScope::All => true,
            OwnerScope::Owner(id) => id == owner_id,
        }
    }
}

/// Lightweight SKU lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuRef {
    pub product_id: i64,
    pub sku: String,
    pub owner_id: i64,
}

/// A product category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A seller account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
}

/// Mutable product attributes shared by create and update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductFields {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub wholesale_price: Option<f64>,
    pub category_id: Option<i64>,
    pub status: String,
    pub product_type: String,
    pub returnable: bool,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// A product to insert
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub owner_id: i64,
    pub fields: ProductFields,
    pub quantity: i64,
}

/// Absolute stock level for one product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryLevel {
    pub product_id: i64,
    pub quantity: i64,
    /// Restock threshold; `None` leaves the current value untouched.
    pub reorder_quantity: Option<i64>,
}

/// Filter for export queries; all clauses are conjunctive
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub status: Option<String>,
    pub category_id: Option<i64>,
    /// Restrict to these owners; intersected with the caller's scope.
    pub owner_ids: Option<Vec<i64>>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
}

/// A full product record as exports see it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub sku: String,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub wholesale_price: Option<f64>,
    pub quantity: i64,
    pub category: Option<String>,
    pub status: String,
    pub product_type: String,
    pub returnable: bool,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub reorder_quantity: Option<i64>,
    pub vendor_username: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Catalog reads and writes the pipeline needs
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Look up a product by lowercase SKU within the given scope.
    async fn find_by_sku(&self, sku_lower: &str, scope: OwnerScope)
        -> Result<Option<SkuRef>, PipelineError>;

    /// Every SKU reference visible in the scope, for per-job prefetching.
    async fn list_owned_skus(&self, scope: OwnerScope) -> Result<Vec<SkuRef>, PipelineError>;

    async fn create_product(&self, product: NewProduct) -> Result<SkuRef, PipelineError>;

    /// Overwrite the mutable attributes of an existing product.
    async fn update_product(
        &self,
        product_id: i64,
        fields: ProductFields,
    ) -> Result<(), PipelineError>;

    /// Set the absolute stock quantity.
    async fn set_inventory(&self, level: InventoryLevel) -> Result<(), PipelineError>;

    async fn list_categories(&self) -> Result<Vec<Category>, PipelineError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, PipelineError>;

    /// Products matching the filter, restricted to the scope.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        scope: OwnerScope,
    ) -> Result<Vec<ProductRecord>, PipelineError>;
}

//! In-memory catalog for tests and demos

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    Account, CatalogStore, Category, InventoryLevel, NewProduct, OwnerScope, ProductFields,
    ProductFilter, ProductRecord, SkuRef,
};
use crate::error::PipelineError;

#[derive(Default)]
struct CatalogState {
    products: Vec<ProductRecord>,
    sku_index: HashMap<String, i64>,
    next_id: i64,
    categories: Vec<Category>,
    accounts: Vec<Account>,
}

/// In-memory [`CatalogStore`] with the same scoping rules as production
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed reference data the processors prefetch.
    pub async fn seed(&self, categories: Vec<Category>, accounts: Vec<Account>) {
        let mut state = self.state.lock().await;
        state.categories = categories;
        state.accounts = accounts;
    }

    pub async fn product(&self, product_id: i64) -> Option<ProductRecord> {
        self.state
            .lock()
            .await
            .products
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
    }

    pub async fn product_count(&self) -> usize {
        self.state.lock().await.products.len()
    }
}

fn apply_fields(record: &mut ProductRecord, fields: ProductFields, categories: &[Category]) {
    record.category = fields
        .category_id
        .and_then(|id| categories.iter().find(|c| c.id == id))
        .map(|c| c.name.clone());
    record.name = fields.name;
    record.description = fields.description;
    record.price = fields.price;
    record.wholesale_price = fields.wholesale_price;
    record.status = fields.status;
    record.product_type = fields.product_type;
    record.returnable = fields.returnable;
    record.weight = fields.weight;
    record.length = fields.length;
    record.width = fields.width;
    record.height = fields.height;
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_by_sku(
        &self,
        sku_lower: &str,
        scope: OwnerScope,
    ) -> Result<Option<SkuRef>, PipelineError> {
        let state = self.state.lock().await;
        let Some(product_id) = state.sku_index.get(sku_lower).copied() else {
            return Ok(None);
        };
        let found = state
            .products
            .iter()
            .find(|p| p.id == product_id && scope.allows(p.owner_id))
            .map(|p| SkuRef {
                product_id: p.id,
                sku: p.sku.clone(),
                owner_id: p.owner_id,
            });
        Ok(found)
    }

    async fn list_owned_skus(&self, scope: OwnerScope) -> Result<Vec<SkuRef>, PipelineError> {
        let state = self.state.lock().await;
        let refs = state
            .products
            .iter()
            .filter(|p| scope.allows(p.owner_id))
            .filter(|p| !p.sku.is_empty())
            .map(|p| SkuRef {
                product_id: p.id,
                sku: p.sku.clone(),
                owner_id: p.owner_id,
            })
            .collect();
        Ok(refs)
    }

    async fn create_product(&self, product: NewProduct) -> Result<SkuRef, PipelineError> {
        let mut state = self.state.lock().await;
        let sku_lower = product.sku.to_lowercase();
        // Blank SKUs are never indexed, so they can never collide.
        if !sku_lower.is_empty() && state.sku_index.contains_key(&sku_lower) {
            return Err(PipelineError::Store(format!(
                "duplicate SKU: {}",
                product.sku
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        let vendor_username = state
            .accounts
            .iter()
            .find(|a| a.id == product.owner_id)
            .map(|a| a.username.clone());

        let mut record = ProductRecord {
            id,
            sku: product.sku.clone(),
            owner_id: product.owner_id,
            name: String::new(),
            description: None,
            price: 0.0,
            wholesale_price: None,
            quantity: product.quantity,
            category: None,
            status: String::new(),
            product_type: String::new(),
            returnable: true,
            weight: None,
            length: None,
            width: None,
            height: None,
            reorder_quantity: None,
            vendor_username,
            created_at: Utc::now(),
        };
        let categories = state.categories.clone();
        apply_fields(&mut record, product.fields, &categories);

        if !sku_lower.is_empty() {
            state.sku_index.insert(sku_lower, id);
        }
        state.products.push(record);

        Ok(SkuRef {
            product_id: id,
            sku: product.sku,
            owner_id: product.owner_id,
        })
    }

    async fn update_product(
        &self,
        product_id: i64,
        fields: ProductFields,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        let categories = state.categories.clone();
        let record = state
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| PipelineError::Store(format!("no product with id {}", product_id)))?;
        apply_fields(record, fields, &categories);
        Ok(())
    }

    async fn set_inventory(&self, level: InventoryLevel) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        let record = state
            .products
            .iter_mut()
            .find(|p| p.id == level.product_id)
            .ok_or_else(|| {
                PipelineError::Store(format!("no product with id {}", level.product_id))
            })?;
        record.quantity = level.quantity;
        if level.reorder_quantity.is_some() {
            record.reorder_quantity = level.reorder_quantity;
        }
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, PipelineError> {
        Ok(self.state.lock().await.categories.clone())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, PipelineError> {
        Ok(self.state.lock().await.accounts.clone())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        scope: OwnerScope,
    ) -> Result<Vec<ProductRecord>, PipelineError> {
        let state = self.state.lock().await;
        let matches = state
            .products
            .iter()
            .filter(|p| scope.allows(p.owner_id))
            .filter(|p| {
                filter
                    .owner_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&p.owner_id))
            })
            .filter(|p| filter.status.as_deref().map_or(true, |s| p.status == s))
            .filter(|p| {
                filter.category_id.map_or(true, |id| {
                    state
                        .categories
                        .iter()
                        .find(|c| Some(c.name.as_str()) == p.category.as_deref())
                        .map_or(false, |c| c.id == id)
                })
            })
            .filter(|p| filter.price_min.map_or(true, |min| p.price >= min))
            .filter(|p| filter.price_max.map_or(true, |max| p.price <= max))
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str, price: f64) -> ProductFields {
        ProductFields {
            name: name.to_string(),
            price,
            status: "published".to_string(),
            product_type: "simple".to_string(),
            returnable: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sku_lookup_is_scoped() {
        let catalog = MemoryCatalog::new();
        catalog
            .create_product(NewProduct {
                sku: "A-1".to_string(),
                owner_id: 1,
                fields: fields("Widget", 9.99),
                quantity: 5,
            })
            .await
            .unwrap();

        assert!(catalog
            .find_by_sku("a-1", OwnerScope::All)
            .await
            .unwrap()
            .is_some());
        assert!(catalog
            .find_by_sku("a-1", OwnerScope::Owner(1))
            .await
            .unwrap()
            .is_some());
        // Another owner cannot see it.
        assert!(catalog
            .find_by_sku("a-1", OwnerScope::Owner(2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected_case_insensitively() {
        let catalog = MemoryCatalog::new();
        catalog
            .create_product(NewProduct {
                sku: "sku-9".to_string(),
                owner_id: 1,
                fields: fields("One", 1.0),
                quantity: 0,
            })
            .await
            .unwrap();

        let dup = catalog
            .create_product(NewProduct {
                sku: "SKU-9".to_string(),
                owner_id: 1,
                fields: fields("Two", 2.0),
                quantity: 0,
            })
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_update_and_inventory() {
        let catalog = MemoryCatalog::new();
        catalog
            .seed(vec![Category { id: 10, name: "Tools".to_string() }], vec![])
            .await;
        let sku = catalog
            .create_product(NewProduct {
                sku: "B-2".to_string(),
                owner_id: 1,
                fields: fields("Old name", 4.0),
                quantity: 1,
            })
            .await
            .unwrap();

        let mut updated = fields("New name", 6.5);
        updated.category_id = Some(10);
        catalog.update_product(sku.product_id, updated).await.unwrap();
        catalog
            .set_inventory(InventoryLevel {
                product_id: sku.product_id,
                quantity: 42,
                reorder_quantity: Some(6),
            })
            .await
            .unwrap();

        let record = catalog.product(sku.product_id).await.unwrap();
        assert_eq!(record.name, "New name");
        assert_eq!(record.category.as_deref(), Some("Tools"));
        assert_eq!(record.quantity, 42);
        assert_eq!(record.reorder_quantity, Some(6));

        // Omitting the reorder threshold leaves the stored value alone.
        catalog
            .set_inventory(InventoryLevel {
                product_id: sku.product_id,
                quantity: 40,
                reorder_quantity: None,
            })
            .await
            .unwrap();
        let record = catalog.product(sku.product_id).await.unwrap();
        assert_eq!(record.quantity, 40);
        assert_eq!(record.reorder_quantity, Some(6));
    }

    #[tokio::test]
    async fn test_blank_skus_create_without_colliding() {
        let catalog = MemoryCatalog::new();
        for name in ["First", "Second"] {
            catalog
                .create_product(NewProduct {
                    sku: String::new(),
                    owner_id: 1,
                    fields: fields(name, 1.0),
                    quantity: 0,
                })
                .await
                .unwrap();
        }

        assert_eq!(catalog.product_count().await, 2);
        // Blank SKUs never enter the index, so nothing resolves to them.
        assert!(catalog
            .find_by_sku("", OwnerScope::All)
            .await
            .unwrap()
            .is_none());
        assert!(catalog
            .list_owned_skus(OwnerScope::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_owned_skus_is_scoped() {
        let catalog = MemoryCatalog::new();
        for (sku, owner) in [("A-1", 1), ("B-1", 2)] {
            catalog
                .create_product(NewProduct {
                    sku: sku.to_string(),
                    owner_id: owner,
                    fields: fields(sku, 1.0),
                    quantity: 0,
                })
                .await
                .unwrap();
        }

        let all = catalog.list_owned_skus(OwnerScope::All).await.unwrap();
        assert_eq!(all.len(), 2);

        let owned = catalog.list_owned_skus(OwnerScope::Owner(2)).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].sku, "B-1");
    }

    #[tokio::test]
    async fn test_list_products_filters() {
        let catalog = MemoryCatalog::new();
        for (sku, price, status, owner) in [
            ("A-1", 5.0, "published", 1),
            ("A-2", 15.0, "published", 1),
            ("A-3", 8.0, "draft", 2),
        ] {
            let mut f = fields(sku, price);
            f.status = status.to_string();
            catalog
                .create_product(NewProduct {
                    sku: sku.to_string(),
                    owner_id: owner,
                    fields: f,
                    quantity: 0,
                })
                .await
                .unwrap();
        }

        let filter = ProductFilter {
            status: Some("published".to_string()),
            price_max: Some(10.0),
            ..Default::default()
        };
        let all = catalog.list_products(&filter, OwnerScope::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sku, "A-1");

        let scoped = catalog
            .list_products(&ProductFilter::default(), OwnerScope::Owner(2))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].sku, "A-3");
    }

    #[tokio::test]
    async fn test_owner_filter_intersects_with_scope() {
        let catalog = MemoryCatalog::new();
        for (sku, owner) in [("A-1", 1), ("B-1", 2)] {
            catalog
                .create_product(NewProduct {
                    sku: sku.to_string(),
                    owner_id: owner,
                    fields: fields(sku, 1.0),
                    quantity: 0,
                })
                .await
                .unwrap();
        }

        let filter = ProductFilter { owner_ids: Some(vec![2]), ..Default::default() };
        let all = catalog.list_products(&filter, OwnerScope::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sku, "B-1");

        // A caller cannot widen visibility by naming another owner.
        let none = catalog
            .list_products(&filter, OwnerScope::Owner(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}

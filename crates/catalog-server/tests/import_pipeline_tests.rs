//! End-to-end pipeline tests over the in-memory backends
//!
//! Each test submits an upload, drains the queue with a real worker pool,
//! and asserts on the durable job record and catalog side effects.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use catalog_server::catalog::{
    CatalogStore, MemoryCatalog, NewProduct, OwnerScope, ProductFields, ProductFilter,
};
use catalog_server::export::{build_export, ExportRequest};
use catalog_server::jobs::models::{JobStatus, JobType, Requester};
use catalog_server::jobs::queue::MemoryJobQueue;
use catalog_server::jobs::store::{JobStore, MemoryJobStore};
use catalog_server::jobs::submit::{submit_import, SubmitRequest};
use catalog_server::processors::{InventoryProcessor, ProcessorRegistry, ProductProcessor};
use catalog_server::worker::{WorkerConfig, WorkerPool};

struct Harness {
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryJobQueue>,
    catalog: Arc<MemoryCatalog>,
    registry: Arc<ProcessorRegistry>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryJobQueue::new(3));
    let catalog = Arc::new(MemoryCatalog::new());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(ProductProcessor::new(catalog.clone())));
    registry.register(Arc::new(InventoryProcessor::new(catalog.clone())));

    Harness { store, queue, catalog, registry: Arc::new(registry) }
}

fn pool_for(harness: &Harness) -> WorkerPool {
    WorkerPool::new(
        harness.store.clone(),
        harness.queue.clone(),
        harness.registry.clone(),
        WorkerConfig {
            slots: 2,
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_secs(60),
            progress_interval: 5,
            inter_batch_delay: Duration::ZERO,
            job_timeout: Duration::from_secs(30),
        },
    )
}

fn admin() -> Requester {
    Requester { account_id: 1, is_privileged: true, entitlements: vec![] }
}

fn vendor(account_id: i64) -> Requester {
    Requester { account_id, is_privileged: false, entitlements: vec![] }
}

fn write_upload(content: &str) -> std::path::PathBuf {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    // The worker deletes the upload; detach it from tempfile's cleanup.
    file.into_temp_path().keep().unwrap()
}

async fn run_to_terminal(harness: &Harness, content: &str, job_type: JobType, requester: Requester) -> catalog_server::jobs::models::ImportJob {
    let path = write_upload(content);
    let job = submit_import(
        &*harness.store,
        &*harness.queue,
        SubmitRequest {
            job_type,
            file_path: path.to_string_lossy().into_owned(),
            declared_filename: "upload.csv".to_string(),
            requester,
            job_id: None,
        },
        Duration::ZERO,
    )
    .await
    .unwrap();

    let pool = pool_for(harness);
    pool.start().await;
    for _ in 0..200 {
        if let Some(current) = harness.store.get(job.id).await.unwrap() {
            if current.is_terminal() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pool.shutdown().await;

    harness.store.get(job.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn import_with_one_bad_row_completes_and_records_the_failure() {
    let harness = harness();
    let job = run_to_terminal(
        &harness,
        "sku,name,price,quantity\n\
         SKU1,Widget,9.99,10\n\
         SKU2,,4.99,5\n",
        JobType::Product,
        admin(),
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_count, 1);
    assert_eq!(job.failed_count, 1);

    let errors = harness.store.list_row_errors(job.id, 100).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].row_number, 2);
    assert_eq!(errors[0].message, "Product name is required");

    // The good row landed.
    assert!(harness
        .catalog
        .find_by_sku("sku1", OwnerScope::All)
        .await
        .unwrap()
        .is_some());
    assert!(harness.queue.is_empty().await);
}

#[tokio::test]
async fn reimporting_the_same_file_updates_instead_of_duplicating() {
    let harness = harness();
    let content = "sku,name,price\nR-1,First name,5.00\n";

    let first = run_to_terminal(&harness, content, JobType::Product, admin()).await;
    assert_eq!(first.status, JobStatus::Completed);

    let content2 = "sku,name,price\nr-1,Second name,6.00\n";
    let second = run_to_terminal(&harness, content2, JobType::Product, admin()).await;
    assert_eq!(second.status, JobStatus::Completed);

    assert_eq!(harness.catalog.product_count().await, 1);
    let record = harness.catalog.product(1).await.unwrap();
    assert_eq!(record.name, "Second name");
    assert_eq!(record.price, 6.00);
}

#[tokio::test]
async fn repeated_sku_within_one_file_is_an_update_not_a_duplicate() {
    let harness = harness();
    let job = run_to_terminal(
        &harness,
        "sku,name,price\n\
         D-1,First,1.00\n\
         D-1,Second,2.00\n",
        JobType::Product,
        admin(),
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_count, 2);
    assert_eq!(job.failed_count, 0);
    assert_eq!(harness.catalog.product_count().await, 1);
    assert_eq!(harness.catalog.product(1).await.unwrap().name, "Second");
}

#[tokio::test]
async fn vendor_rows_assigning_an_owner_are_rejected_per_row() {
    let harness = harness();
    let job = run_to_terminal(
        &harness,
        "sku,name,vendor_username\n\
         V-1,Own product,\n\
         V-2,Someone else's,other_vendor\n",
        JobType::Product,
        vendor(2),
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_count, 1);
    assert_eq!(job.failed_count, 1);

    let record = harness.catalog.product(1).await.unwrap();
    assert_eq!(record.owner_id, 2);
    assert_eq!(harness.catalog.product_count().await, 1);
}

#[tokio::test]
async fn file_with_headers_only_fails_without_side_effects() {
    let harness = harness();
    let job = run_to_terminal(
        &harness,
        "sku,name,price\n",
        JobType::Product,
        admin(),
    )
    .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_summary.is_some());
    assert_eq!(harness.catalog.product_count().await, 0);
    assert!(harness
        .store
        .list_row_errors(job.id, 100)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn inventory_import_sets_levels_for_visible_skus_only() {
    let harness = harness();
    for (sku, owner) in [("I-1", 2), ("I-2", 3)] {
        harness
            .catalog
            .create_product(NewProduct {
                sku: sku.to_string(),
                owner_id: owner,
                fields: ProductFields {
                    name: format!("Product {}", sku),
                    status: "published".to_string(),
                    product_type: "simple".to_string(),
                    returnable: true,
                    ..Default::default()
                },
                quantity: 0,
            })
            .await
            .unwrap();
    }

    let job = run_to_terminal(
        &harness,
        "sku,quantity\n\
         I-1,40\n\
         I-2,50\n",
        JobType::Inventory,
        vendor(2),
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_count, 1);
    assert_eq!(job.failed_count, 1);
    assert_eq!(harness.catalog.product(1).await.unwrap().quantity, 40);
    // The other owner's stock is untouched.
    assert_eq!(harness.catalog.product(2).await.unwrap().quantity, 0);
}

#[tokio::test]
async fn exported_catalog_respects_caller_gates() {
    let harness = harness();
    let job = run_to_terminal(
        &harness,
        "sku,name,price,wholesale_price\nE-1,Exported,10.00,6.00\n",
        JobType::Product,
        admin(),
    )
    .await;
    assert_eq!(job.status, JobStatus::Completed);

    let admin_file = build_export(
        &*harness.catalog,
        &admin(),
        ExportRequest { filter: ProductFilter::default(), ..Default::default() },
    )
    .await
    .unwrap();
    let admin_text = String::from_utf8(admin_file.bytes).unwrap();
    assert!(admin_text.lines().next().unwrap().contains("wholesale_price"));
    assert!(admin_text.contains("6.00"));

    let vendor_file = build_export(&*harness.catalog, &vendor(5), ExportRequest::default())
        .await
        .unwrap();
    let vendor_text = String::from_utf8(vendor_file.bytes).unwrap();
    assert!(!vendor_text.lines().next().unwrap().contains("wholesale_price"));
    // Owner scoping: vendor 5 owns nothing.
    assert_eq!(vendor_text.lines().count(), 1);
}

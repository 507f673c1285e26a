//! Import template generator
//!
//! Produces a downloadable blank spreadsheet whose headers match what the
//! import parser expects, with one sample row showing the expected shape.
//! Gated columns appear only for callers who could import them.

use tracing::info;

use crate::error::PipelineError;
use crate::export::fields::{ExportField, PRODUCT_FIELDS};
use crate::export::write_err;
use crate::jobs::models::{JobType, Requester};
use crate::spreadsheet::writer::{self, SpreadsheetFile, SpreadsheetFormat};

fn sample_value(key: &str) -> &'static str {
    match key {
        "sku" => "SKU-001",
        "name" => "Sample product",
        "description" => "Describe the product here",
        "price" => "19.99",
        "wholesale_price" => "12.50",
        "quantity" => "10",
        "category" => "Uncategorized",
        "status" => "draft",
        "product_type" => "simple",
        "returnable" => "yes",
        "weight" => "1.5",
        "vendor_username" => "",
        _ => "",
    }
}

fn product_columns(caller: &Requester) -> Vec<&'static ExportField> {
    PRODUCT_FIELDS
        .iter()
        .filter(|f| f.importable)
        .filter(|f| f.gate.allows(caller))
        .collect()
}

/// Build an import template for one job type
pub fn build_template(
    job_type: JobType,
    caller: &Requester,
    format: SpreadsheetFormat,
) -> Result<SpreadsheetFile, PipelineError> {
    let (headers, sample, stem): (Vec<String>, Vec<String>, &str) = match job_type {
        JobType::Product => {
            let columns = product_columns(caller);
            (
                columns.iter().map(|f| f.label.to_string()).collect(),
                columns.iter().map(|f| sample_value(f.key).to_string()).collect(),
                "product_import_template",
            )
        },
        JobType::Inventory => (
            ["sku", "quantity", "reorder_qty", "reason"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            ["SKU-001", "10", "5", "Annual recount"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            "inventory_import_template",
        ),
    };

    let file = writer::write(format, "Import", &headers, &[sample], &[], stem)
        .map_err(write_err)?;

    info!(job_type = %job_type, columns = headers.len(), "template built");
    Ok(file)
}

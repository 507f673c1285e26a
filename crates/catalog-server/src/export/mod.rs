//! Export builder
//!
//! Turns a filtered catalog query into a downloadable spreadsheet. Column
//! visibility is gate-checked per caller; requested columns the caller may
//! not see are dropped silently so a saved column preset keeps working when
//! an entitlement lapses.

pub mod fields;

use tracing::info;

use crate::catalog::{CatalogStore, OwnerScope, ProductFilter};
use crate::error::PipelineError;
use crate::jobs::models::Requester;
use crate::spreadsheet::writer::{self, SpreadsheetFile, SpreadsheetFormat, WriteError};

use fields::{ExportField, PRODUCT_FIELDS};

/// A product export request
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub format: SpreadsheetFormat,
    pub filter: ProductFilter,
    /// Column keys to include, in order. `None` means every column the
    /// caller may see.
    pub columns: Option<Vec<String>>,
}

/// Columns this caller's export will contain, identifying columns first.
fn select_columns(caller: &Requester, requested: Option<&[String]>) -> Vec<&'static ExportField> {
    let visible = |f: &&'static ExportField| f.gate.allows(caller);

    let mut selected: Vec<&'static ExportField> = PRODUCT_FIELDS
        .iter()
        .filter(|f| f.readonly)
        .filter(visible)
        .collect();

    match requested {
        Some(keys) => {
            for key in keys {
                if let Some(field) = fields::field(key) {
                    if field.gate.allows(caller) && !selected.iter().any(|f| f.key == field.key) {
                        selected.push(field);
                    }
                }
            }
        },
        None => {
            for field in PRODUCT_FIELDS.iter().filter(|f| !f.readonly) {
                if field.gate.allows(caller) {
                    selected.push(field);
                }
            }
        },
    }
    selected
}

/// Build a spreadsheet of the caller's visible products
pub async fn build_export(
    catalog: &dyn CatalogStore,
    caller: &Requester,
    request: ExportRequest,
) -> Result<SpreadsheetFile, PipelineError> {
    let scope = if caller.is_privileged {
        OwnerScope::All
    } else {
        OwnerScope::Owner(caller.account_id)
    };

    let columns = select_columns(caller, request.columns.as_deref());
    let records = catalog.list_products(&request.filter, scope).await?;

    let headers: Vec<String> = columns.iter().map(|f| f.label.to_string()).collect();
    let readonly: Vec<&str> = columns.iter().filter(|f| f.readonly).map(|f| f.label).collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| columns.iter().map(|f| fields::render(record, f.key)).collect())
        .collect();

    let file = writer::write(
        request.format,
        "Products",
        &headers,
        &rows,
        &readonly,
        "products_export",
    )
    .map_err(write_err)?;

    info!(
        rows = records.len(),
        columns = headers.len(),
        format = ?request.format,
        "export built"
    );
    Ok(file)
}

pub(crate) fn write_err(e: WriteError) -> PipelineError {
    PipelineError::Store(e.to_string())
}

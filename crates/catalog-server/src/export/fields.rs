//! Exportable product fields
//!
//! The single authority on which columns exist, what they are labeled, and
//! who may see them. Exports, templates, and the import header vocabulary
//! all derive from this table.

use crate::catalog::ProductRecord;
use crate::jobs::models::Requester;

/// Who may see a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGate {
    Open,
    /// Administrators only.
    Privileged,
    /// Requires the named entitlement (administrators always qualify).
    Entitlement(&'static str),
}

impl FieldGate {
    pub fn allows(self, caller: &Requester) -> bool {
        match self {
            FieldGate::Open => true,
            FieldGate::Privileged => caller.is_privileged,
            FieldGate::Entitlement(name) => caller.is_privileged || caller.has_entitlement(name),
        }
    }
}

/// One exportable column
pub struct ExportField {
    /// Normalized header key, as the import side parses it.
    pub key: &'static str,
    pub label: &'static str,
    pub gate: FieldGate,
    /// Identifies the record; annotated in workbook exports and ignored as
    /// input on re-upload.
    pub readonly: bool,
    /// Included in import templates.
    pub importable: bool,
}

/// All exportable fields; `id` and `sku` stay first so every export keeps
/// its identifying columns in front.
pub const PRODUCT_FIELDS: &[ExportField] = &[
    ExportField { key: "id", label: "id", gate: FieldGate::Open, readonly: true, importable: false },
    ExportField { key: "sku", label: "sku", gate: FieldGate::Open, readonly: true, importable: true },
    ExportField { key: "name", label: "name", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "description", label: "description", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "price", label: "price", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "wholesale_price", label: "wholesale_price", gate: FieldGate::Entitlement("wholesale"), readonly: false, importable: true },
    ExportField { key: "quantity", label: "quantity", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "category", label: "category", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "status", label: "status", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "product_type", label: "product_type", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "returnable", label: "returnable", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "weight", label: "weight", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "length", label: "length", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "width", label: "width", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "height", label: "height", gate: FieldGate::Open, readonly: false, importable: true },
    ExportField { key: "vendor_username", label: "vendor_username", gate: FieldGate::Privileged, readonly: false, importable: true },
];

pub fn field(key: &str) -> Option<&'static ExportField> {
    PRODUCT_FIELDS.iter().find(|f| f.key == key)
}

fn render_f64(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.2}", value)
    } else {
        value.to_string()
    }
}

fn render_opt_f64(value: Option<f64>) -> String {
    value.map(render_f64).unwrap_or_default()
}

/// Render one field of a record as a cell value.
pub fn render(record: &ProductRecord, key: &str) -> String {
    match key {
        "id" => record.id.to_string(),
        "sku" => record.sku.clone(),
        "name" => record.name.clone(),
        "description" => record.description.clone().unwrap_or_default(),
        "price" => render_f64(record.price),
        "wholesale_price" => render_opt_f64(record.wholesale_price),
        "quantity" => record.quantity.to_string(),
        "category" => record.category.clone().unwrap_or_default(),
        "status" => record.status.clone(),
        "product_type" => record.product_type.clone(),
        "returnable" => if record.returnable { "yes" } else { "no" }.to_string(),
        "weight" => render_opt_f64(record.weight),
        "length" => render_opt_f64(record.length),
        "width" => render_opt_f64(record.width),
        "height" => render_opt_f64(record.height),
        "vendor_username" => record.vendor_username.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

//! Spreadsheet parsing and serialization
//!
//! Normalizes uploaded delimited-text and binary workbook files into a common
//! row-record shape, and serializes export/template data back out. The two
//! decoders produce identical row records so row processors never see the
//! source format.

pub mod coerce;
pub mod reader;
pub mod writer;

pub use reader::{count_rows, parse};
pub use writer::{SpreadsheetFile, SpreadsheetFormat};

use serde_json::{Map, Value};
use thiserror::Error;

/// Error raised by the file parser
///
/// Any of these is a pipeline-level failure: the whole job fails, because the
/// parser cannot establish reliable row boundaries.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("file contains no data rows")]
    NoDataRows,

    #[error("delimited-text structure error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One parsed spreadsheet row
///
/// A mapping from normalized header (trimmed, lowercased, trailing
/// parenthesized annotations stripped) to raw string cell value, plus the
/// row's 1-based position within the parsed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    row_number: usize,
    cells: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new(row_number: usize, cells: Vec<(String, String)>) -> Self {
        Self { row_number, cells }
    }

    /// 1-based position within the parsed data (not the source file line)
    pub fn row_number(&self) -> usize {
        self.row_number
    }

    /// Raw cell value for a normalized header, if the column exists
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed cell value, empty string when the column is absent
    pub fn field(&self, name: &str) -> &str {
        self.get(name).map(str::trim).unwrap_or("")
    }

    /// Whether the column exists and holds a non-blank value
    pub fn has_value(&self, name: &str) -> bool {
        !self.field(name).is_empty()
    }

    /// Whether every cell in the row is blank
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }

    /// Header/value pairs in column order
    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    /// Serialize the original row for the per-row error log
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.cells.len());
        for (header, value) in &self.cells {
            map.insert(header.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// Normalize a header cell: trim, lowercase, strip a trailing parenthesized
/// annotation such as `" (read-only)"` that the export writer emits.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = match (trimmed.rfind('('), trimmed.ends_with(')')) {
        (Some(open), true) if open > 0 => trimmed[..open].trim_end(),
        _ => trimmed,
    };
    base.to_lowercase()
}

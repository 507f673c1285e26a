//! Spreadsheet serialization for exports and templates
//!
//! Row building happens upstream; this module only turns a header row plus
//! string rows into bytes. Format selection changes serialization, never the
//! row content.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output format for exports and templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    #[default]
    Csv,
    Xlsx,
}

impl SpreadsheetFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            SpreadsheetFormat::Csv => "text/csv",
            SpreadsheetFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            },
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SpreadsheetFormat::Csv => "csv",
            SpreadsheetFormat::Xlsx => "xlsx",
        }
    }
}

impl std::str::FromStr for SpreadsheetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SpreadsheetFormat::Csv),
            "xlsx" | "excel" => Ok(SpreadsheetFormat::Xlsx),
            _ => Err(anyhow::anyhow!("Invalid spreadsheet format: {}", s)),
        }
    }
}

/// A serialized spreadsheet ready for download
#[derive(Debug, Clone)]
pub struct SpreadsheetFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

/// Serialization error
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("CSV serialization error: {0}")]
    Csv(String),

    #[error("workbook serialization error: {0}")]
    Workbook(String),
}

/// Serialize headers + rows into the requested format
///
/// `readonly_headers` lists header labels that identify records rather than
/// accept edits; workbook output annotates them with `(read-only)` so a
/// re-uploaded export still parses back to the bare column name.
pub fn write(
    format: SpreadsheetFormat,
    sheet_name: &str,
    headers: &[String],
    rows: &[Vec<String>],
    readonly_headers: &[&str],
    file_stem: &str,
) -> Result<SpreadsheetFile, WriteError> {
    let bytes = match format {
        SpreadsheetFormat::Csv => write_csv(headers, rows)?,
        SpreadsheetFormat::Xlsx => write_workbook(sheet_name, headers, rows, readonly_headers)?,
    };

    let date = Utc::now().format("%Y-%m-%d");
    Ok(SpreadsheetFile {
        bytes,
        filename: format!("{}_{}.{}", file_stem, date, format.extension()),
        content_type: format.content_type(),
    })
}

fn write_csv(headers: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, WriteError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(headers)
        .map_err(|e| WriteError::Csv(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| WriteError::Csv(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| WriteError::Csv(e.to_string()))
}

fn write_workbook(
    sheet_name: &str,
    headers: &[String],
    rows: &[Vec<String>],
    readonly_headers: &[&str],
) -> Result<Vec<u8>, WriteError> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .map_err(|e| WriteError::Workbook(e.to_string()))?;

    let header_format = rust_xlsxwriter::Format::new().set_bold();
    for (col, header) in headers.iter().enumerate() {
        let label = if readonly_headers.contains(&header.as_str()) {
            format!("{} (read-only)", header)
        } else {
            header.clone()
        };
        worksheet
            .write_string_with_format(0, col as u16, &label, &header_format)
            .map_err(|e| WriteError::Workbook(e.to_string()))?;
    }

    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            worksheet
                .write_string((r + 1) as u32, c as u16, value)
                .map_err(|e| WriteError::Workbook(e.to_string()))?;
        }
    }

    worksheet.autofit();

    workbook
        .save_to_buffer()
        .map_err(|e| WriteError::Workbook(e.to_string()))
}

//! Uploaded file decoding
//!
//! Dispatches on file extension: delimited text goes through the `csv` crate,
//! binary workbooks through `calamine`. Both paths yield the same
//! [`RowRecord`] shape. A separate count-only fast path estimates row counts
//! for the informational `total_rows` field without materializing cells.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use super::{normalize_header, ParseError, RowRecord};

/// File kind derived from the declared file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Delimited,
    Workbook,
}

/// Uploads land under a temp name, so the kind comes from the name the
/// caller declared at submission, not the on-disk path.
fn file_kind(declared_name: &str) -> Result<FileKind, ParseError> {
    let ext = Path::new(declared_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" | "txt" | "tsv" => Ok(FileKind::Delimited),
        "xlsx" | "xls" | "xlsm" | "xlsb" => Ok(FileKind::Workbook),
        _ => Err(ParseError::UnsupportedExtension(ext)),
    }
}

fn delimiter_for(declared_name: &str) -> u8 {
    if declared_name.to_lowercase().ends_with(".tsv") {
        b'\t'
    } else {
        b','
    }
}

/// Parse an uploaded spreadsheet into ordered row records
///
/// The header row defines the column set; rows with no non-empty cell are
/// dropped (workbook phantom rows left behind by visual formatting). Fails
/// when the file yields zero data rows or the delimited-text structure is
/// inconsistent (field count mismatch) — in both cases the whole job fails,
/// because no reliable row boundary exists.
pub fn parse(path: &Path, declared_name: &str) -> Result<Vec<RowRecord>, ParseError> {
    let rows = match file_kind(declared_name)? {
        FileKind::Delimited => parse_delimited(path, delimiter_for(declared_name))?,
        FileKind::Workbook => parse_workbook(path)?,
    };

    if rows.is_empty() {
        return Err(ParseError::NoDataRows);
    }

    debug!(file = %declared_name, rows = rows.len(), "parsed upload");
    Ok(rows)
}

fn parse_delimited(path: &Path, delimiter: u8) -> Result<Vec<RowRecord>, ParseError> {
    // Non-flexible mode: a record with the wrong field count is a structural
    // error that aborts the parse.
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_header)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cells: Vec<(String, String)> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();

        let row = RowRecord::new(rows.len() + 1, cells);
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(renumber(rows))
}

fn parse_workbook(path: &Path) -> Result<Vec<RowRecord>, ParseError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ParseError::Workbook(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ParseError::NoDataRows)?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ParseError::Workbook(e.to_string()))?;

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| normalize_header(&render_cell(cell)))
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for data_row in row_iter {
        let cells: Vec<(String, String)> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = data_row.get(i).map(render_cell).unwrap_or_default();
                (header.clone(), value)
            })
            .collect();

        let row = RowRecord::new(rows.len() + 1, cells);
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(renumber(rows))
}

/// Row numbers are positions within the parsed data, assigned after blank
/// rows are dropped.
fn renumber(rows: Vec<RowRecord>) -> Vec<RowRecord> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| RowRecord::new(i + 1, row.cells().to_vec()))
        .collect()
}

/// Resolve a workbook cell to a plain string
///
/// Floats that carry no fraction render without the trailing `.0` (a
/// quantity column typed as a number round-trips as `10`, not `10.0`);
/// date cells normalize to `YYYY-MM-DD`; error cells render empty.
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        },
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| naive.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.chars().take(10).collect(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Fast row-count estimate used only for the informational `total_rows`
/// field at submission time.
///
/// Counts physical records: for workbooks this includes trailing phantom
/// rows the full parse would drop, so the estimate may overcount. The
/// authoritative count is whatever [`parse`] actually yields; nothing
/// reconciles the two.
pub fn count_rows(path: &Path, declared_name: &str) -> Result<i64, ParseError> {
    match file_kind(declared_name)? {
        FileKind::Delimited => {
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(delimiter_for(declared_name))
                .has_headers(true)
                .flexible(true)
                .from_path(path)?;

            let mut count: i64 = 0;
            for record in reader.byte_records() {
                record?;
                count += 1;
            }
            Ok(count)
        },
        FileKind::Workbook => {
            let mut workbook =
                open_workbook_auto(path).map_err(|e| ParseError::Workbook(e.to_string()))?;
            let sheet_name = workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or(ParseError::NoDataRows)?;
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| ParseError::Workbook(e.to_string()))?;

            let (rows, _cols) = range.get_size();
            Ok((rows as i64 - 1).max(0))
        },
    }
}

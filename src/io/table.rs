//! Shared CSV plumbing for reference tables and run outputs.
//!
//! Every table this tool reads (isochrones, spectra, filter curves, ASTs,
//! grids, fake datasets) goes through the same header handling:
//! - header names are trimmed, lower-cased and stripped of a UTF-8 BOM
//! - columns are located by a list of accepted aliases
//! - numeric cells must parse as finite `f64`, otherwise the line is reported

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::error::AppError;

/// Header lookup for one CSV file.
#[derive(Debug, Clone)]
pub struct Header {
    /// Original header names (trimmed, BOM stripped, case preserved).
    pub names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn from_record(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(clean_header_name).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_ascii_lowercase(), idx))
            .collect();
        Self { names, index }
    }

    /// Column index of the first alias present.
    pub fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|a| self.index.get(&a.to_ascii_lowercase()).copied())
    }

    /// Like `find`, but a missing column is a fatal schema error.
    pub fn require(&self, aliases: &[&str], path: &Path) -> Result<usize, AppError> {
        self.find(aliases).ok_or_else(|| {
            AppError::config(format!(
                "Missing required column `{}` in '{}'.",
                aliases[0],
                path.display()
            ))
        })
    }
}

fn clean_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, schema validation will incorrectly
    // report missing columns.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

/// Open a CSV file and read its header.
pub fn open_csv(path: &Path, what: &str) -> Result<(csv::Reader<File>, Header), AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::config(format!("Failed to open {what} '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Failed to read {what} headers: {e}")))?
        .clone();

    Ok((reader, Header::from_record(&headers)))
}

/// Read every record, attaching 1-based file line numbers.
pub fn read_records(
    reader: &mut csv::Reader<File>,
    path: &Path,
) -> Result<Vec<(usize, StringRecord)>, AppError> {
    let mut out = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::config(format!("CSV parse error in '{}': {e}", path.display()))
        })?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 2);
        out.push((line, record));
    }
    Ok(out)
}

/// Parse a finite float cell.
pub fn parse_f64(record: &StringRecord, idx: usize, line: usize, path: &Path) -> Result<f64, AppError> {
    let raw = record.get(idx).unwrap_or("");
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            AppError::config(format!(
                "Invalid number '{raw}' at line {line} of '{}'.",
                path.display()
            ))
        })
}

/// Parse an optional float cell (empty means `None`).
pub fn parse_opt_f64(
    record: &StringRecord,
    idx: usize,
    line: usize,
    path: &Path,
) -> Result<Option<f64>, AppError> {
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(_) => parse_f64(record, idx, line, path).map(Some),
    }
}

/// Parse an unsigned integer cell.
pub fn parse_usize(record: &StringRecord, idx: usize, line: usize, path: &Path) -> Result<usize, AppError> {
    let raw = record.get(idx).unwrap_or("");
    raw.parse::<usize>().map_err(|_| {
        AppError::config(format!(
            "Invalid integer '{raw}' at line {line} of '{}'.",
            path.display()
        ))
    })
}

/// Create (or truncate) a CSV output file.
pub fn create_csv(path: &Path, what: &str) -> Result<csv::Writer<File>, AppError> {
    log::debug!("writing {what} to {}", path.display());
    csv::Writer::from_path(path).map_err(|e| {
        AppError::config(format!("Failed to create {what} '{}': {e}", path.display()))
    })
}

/// Write one row, mapping failures to a fatal error.
pub fn write_row<I, T>(writer: &mut csv::Writer<File>, row: I, what: &str) -> Result<(), AppError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    writer
        .write_record(row)
        .map_err(|e| AppError::config(format!("Failed to write {what} row: {e}")))
}

pub fn finish(mut writer: csv::Writer<File>, what: &str) -> Result<(), AppError> {
    writer
        .flush()
        .map_err(|e| AppError::config(format!("Failed to flush {what}: {e}")))
}

/// Format a float for CSV output; non-finite values become an empty cell.
pub fn fmt_f64(v: f64) -> String {
    if v.is_finite() { format!("{v}") } else { String::new() }
}

pub fn fmt_opt_f64(v: Option<f64>) -> String {
    v.map(fmt_f64).unwrap_or_default()
}

//! Raw table loading
//!
//! Every input of the pipeline is a flat table: CSV for most sources,
//! XLS/XLSX for the occasional spreadsheet export. This module turns either
//! format into one in-memory `Table` with cleaned headers, then deserializes
//! rows into typed records.
//!
//! Cleaning contract:
//! - UTF-8 BOM stripped, fields trimmed
//! - header names trimmed, embedded `\n` / `\r` removed
//! - numeric fields parsed leniently (see [`lenient`])

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Extensions tried, in order, when locating a table by stem.
const TABLE_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("required table '{}' not found in {} (tried .csv, .xlsx, .xls)", .stem, .dir.display())]
    MissingFile { stem: String, dir: PathBuf },

    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV in {}: {}", .path.display(), .source)]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open workbook {}: {}", .path.display(), .source)]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("workbook {} has no sheets", .path.display())]
    EmptyWorkbook { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, TableError>;

/// A loaded table: normalized headers plus string records.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    /// Find `<stem>.csv`, `<stem>.xlsx` or `<stem>.xls` under `dir` and load it.
    pub fn load(dir: &Path, stem: &str) -> Result<Self> {
        let path = locate(dir, stem)?;
        let table = Self::from_path(&path)?;
        info!(table = stem, rows = table.len(), path = %path.display(), "loaded table");
        Ok(table)
    }

    /// Load a table from an explicit path, dispatching on the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if is_workbook(path) {
            return Self::from_workbook(&name, path);
        }

        let content = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_str(&name, &content).map_err(|e| match e {
            TableError::Csv { source, .. } => TableError::Csv {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse CSV content. Record lengths may vary; short rows read as blanks.
    pub fn from_csv_str(name: &str, content: &str) -> Result<Self> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let csv_err = |source| TableError::Csv {
            path: PathBuf::from(name),
            source,
        };

        let headers = reader.headers().map_err(csv_err)?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.map_err(csv_err)?);
        }

        Ok(Self::new(name, headers, rows))
    }

    /// Read the first sheet of an XLS/XLSX/ODS workbook. First row is the header.
    fn from_workbook(name: &str, path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path).map_err(|source| TableError::Workbook {
            path: path.to_path_buf(),
            source,
        })?;

        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| TableError::EmptyWorkbook {
                path: path.to_path_buf(),
            })?;

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|source| TableError::Workbook {
                path: path.to_path_buf(),
                source,
            })?;

        let mut cells = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<StringRecord>());

        let headers = cells.next().unwrap_or_default();
        let rows = cells.collect();

        Ok(Self::new(name, headers, rows))
    }

    fn new(name: &str, headers: StringRecord, rows: Vec<StringRecord>) -> Self {
        let headers = headers.iter().map(normalize_header).collect();
        Self {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }

    /// True if a (normalized) header with this exact name exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Deserialize every row into `T`.
    ///
    /// Rows that fail (e.g. a required id that is not a number) are skipped
    /// with a warning; the table as a whole never fails here.
    pub fn records<T: DeserializeOwned>(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.rows.len());
        let mut skipped = 0usize;

        for (idx, row) in self.rows.iter().enumerate() {
            match row.deserialize::<T>(Some(&self.headers)) {
                Ok(record) => out.push(record),
                Err(e) => {
                    skipped += 1;
                    if skipped <= 5 {
                        // +2: 1-indexed plus header line
                        warn!(table = %self.name, line = idx + 2, error = %e, "skipping row");
                    }
                }
            }
        }

        if skipped > 5 {
            warn!(table = %self.name, skipped, "rows skipped in total");
        }
        out
    }
}

/// Strip surrounding whitespace and embedded line breaks from a header.
pub fn normalize_header(header: &str) -> String {
    header.trim().replace(['\n', '\r'], "")
}

/// Resolve a table stem to an existing file, trying each known extension.
pub fn locate(dir: &Path, stem: &str) -> Result<PathBuf> {
    TABLE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
        .ok_or_else(|| TableError::MissingFile {
            stem: stem.to_string(),
            dir: dir.to_path_buf(),
        })
}

fn is_workbook(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ext) if ext == "xls" || ext == "xlsx" || ext == "xlsb" || ext == "ods"
    )
}

/// Render a workbook cell the way it would appear in a CSV export.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // Integral floats are ids more often than not: 11.0 -> "11"
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    }
}

// =============================================================================
// Lenient field parsing
// =============================================================================

/// Parse a number, mapping blanks, garbage, NaN and infinities to 0.
pub fn parse_f64_or_zero(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Parse an integer id, accepting float spellings of whole numbers ("12.0").
pub fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

/// Parse a timestamp in any of the shapes the source exports use.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// `deserialize_with` helpers for source records.
///
/// Pair each with `#[serde(default)]` so a missing column reads as the
/// field's default instead of failing the row.
pub mod lenient {
    use serde::{de::Error, Deserialize, Deserializer};

    /// Trimmed text; blank becomes `None`.
    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    /// Any number; unparseable values become 0.
    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().map(super::parse_f64_or_zero).unwrap_or(0.0))
    }

    /// Optional integer id.
    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_id))
    }

    /// Optional timestamp; unparseable values become `None`.
    pub fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<chrono::NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }

    /// Required integer id; the row is rejected when it is missing.
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        super::parse_id(&raw).ok_or_else(|| D::Error::custom(format!("invalid id '{raw}'")))
    }
}

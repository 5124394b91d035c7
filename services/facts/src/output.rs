//! Fact output - precision, column order, versioned persistence
//!
//! The CSV is rendered completely in memory before anything touches the
//! result directory, so a failed run never leaves a partial fact file.
//! Each run gets the next free `<prefix><NNN>.csv` plus a JSON manifest.

use crate::engine::{EngineReport, FactRow};
use crate::kpi::Measure;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Key columns preceding the measures.
pub const KEY_COLUMNS: [&str; 6] = [
    "date_key",
    "geo_key",
    "outlet_id",
    "business_partner_service_id",
    "upkdk_id",
    "klu_id",
];

/// Numeric contract of a measure column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Whole number, fraction truncated.
    Count,
    /// Two decimals.
    Amount,
    /// Clamped to 0..=100, four decimals.
    Percentage,
}

impl Precision {
    /// Apply the contract. Non-finite input becomes 0.
    pub fn apply(self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        let v = match self {
            Precision::Count => value.trunc(),
            Precision::Amount => round_to(value, 2),
            Precision::Percentage => round_to(value.clamp(0.0, 100.0), 4),
        };
        // no "-0" in the output
        v + 0.0
    }

    pub fn format(self, value: f64) -> String {
        let v = self.apply(value);
        match self {
            Precision::Count => format!("{}", v as i64),
            Precision::Amount | Precision::Percentage => format!("{v}"),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn header() -> Vec<&'static str> {
    KEY_COLUMNS
        .iter()
        .copied()
        .chain(Measure::ALL.iter().map(|m| m.column()))
        .collect()
}

/// Render the whole fact table.
pub fn render_csv(rows: &[FactRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header())?;

    for row in rows {
        let mut record: Vec<String> = vec![
            row.date_key.to_string(),
            row.geo_key.to_string(),
            row.outlet_id.to_string(),
            row.business_partner_service_id.to_string(),
            row.upkdk_id.to_string(),
            row.klu_id.to_string(),
        ];
        record.extend(
            Measure::ALL
                .iter()
                .map(|m| m.precision().format(row.measures.value(*m))),
        );
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish fact CSV: {}", e.error()))
}

/// `sha256:<hex>` of the rendered bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// One more than the highest `<prefix><digits>.csv` in `dir`; 1 when none.
pub fn next_version(dir: &Path, prefix: &str) -> Result<u32> {
    if !dir.exists() {
        return Ok(1);
    }
    let mut highest = 0u32;
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let version = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".csv"))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(v) = version {
            highest = highest.max(v);
        }
    }
    highest
        .checked_add(1)
        .ok_or_else(|| anyhow::anyhow!("Version counter exhausted in {}", dir.display()))
}

/// Run metadata written next to every fact file.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub version: u32,
    pub file: String,
    pub date_key: u32,
    pub rows: usize,
    pub villages_visited: usize,
    pub skipped_unresolved: usize,
    pub skipped_without_cooperatives: usize,
    pub generated_at: DateTime<Utc>,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct WrittenOutput {
    pub version: u32,
    pub csv_path: PathBuf,
    pub manifest_path: PathBuf,
    pub content_hash: String,
    pub bytes: usize,
}

pub struct OutputWriter {
    result_dir: PathBuf,
    prefix: String,
}

impl OutputWriter {
    pub fn new(result_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            result_dir: result_dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Persist one run as the next version.
    pub fn write(
        &self,
        rows: &[FactRow],
        date_key: u32,
        report: &EngineReport,
    ) -> Result<WrittenOutput> {
        let bytes = render_csv(rows)?;
        let hash = content_hash(&bytes);

        std::fs::create_dir_all(&self.result_dir)
            .with_context(|| format!("Failed to create {}", self.result_dir.display()))?;
        let version = next_version(&self.result_dir, &self.prefix)?;
        let stem = format!("{}{:03}", self.prefix, version);
        let csv_path = self.result_dir.join(format!("{stem}.csv"));
        let manifest_path = self.result_dir.join(format!("{stem}.json"));

        // create_new: never overwrite an existing version
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("Failed to write {}", csv_path.display()))?;
        drop(file);

        let manifest = RunManifest {
            run_id: Uuid::new_v4(),
            version,
            file: format!("{stem}.csv"),
            date_key,
            rows: rows.len(),
            villages_visited: report.villages_visited,
            skipped_unresolved: report.skipped_unresolved,
            skipped_without_cooperatives: report.skipped_without_cooperatives,
            generated_at: Utc::now(),
            content_hash: hash.clone(),
        };
        // a version is only complete with its manifest
        let written = serde_json::to_string_pretty(&manifest)
            .map_err(anyhow::Error::from)
            .and_then(|json| {
                std::fs::write(&manifest_path, json)
                    .with_context(|| format!("Failed to write {}", manifest_path.display()))
            });
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_file(&csv_path) {
                warn!(path = %csv_path.display(), error = %cleanup, "could not remove orphaned fact file");
            }
            return Err(e);
        }

        info!(
            version,
            rows = rows.len(),
            path = %csv_path.display(),
            hash = %hash,
            "fact table written"
        );
        Ok(WrittenOutput {
            version,
            csv_path,
            manifest_path,
            content_hash: hash,
            bytes: bytes.len(),
        })
    }
}

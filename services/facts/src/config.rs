//! Fact run configuration: environment first, CLI flags on top.

use std::path::PathBuf;

pub const DEFAULT_PREFIX: &str = "FACT_KPI_V";
pub const DEFAULT_TOP_CATEGORIES: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub result_dir: PathBuf,
    pub file_prefix: String,
    /// Visit at most this many village nodes.
    pub village_limit: Option<usize>,
    pub top_category_count: usize,
    /// Compute everything, write nothing.
    pub dry_run: bool,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>, result_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            result_dir: result_dir.into(),
            file_prefix: DEFAULT_PREFIX.to_string(),
            village_limit: None,
            top_category_count: DEFAULT_TOP_CATEGORIES,
            dry_run: false,
        }
    }

    /// Read `DATA_SOURCE_DIR`, `RESULT_DIR`, `FACT_FILE_PREFIX`,
    /// `VILLAGE_LIMIT` and `TOP_CATEGORY_COUNT`. Malformed numbers fall back
    /// to their defaults.
    pub fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(
                std::env::var("DATA_SOURCE_DIR").unwrap_or_else(|_| "data_source".to_string()),
            ),
            result_dir: PathBuf::from(
                std::env::var("RESULT_DIR").unwrap_or_else(|_| "result".to_string()),
            ),
            file_prefix: std::env::var("FACT_FILE_PREFIX")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            village_limit: std::env::var("VILLAGE_LIMIT")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .and_then(village_limit),
            top_category_count: std::env::var("TOP_CATEGORY_COUNT")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_TOP_CATEGORIES),
            dry_run: false,
        }
    }
}

/// A limit of 0 means "no limit", from the environment and flags alike.
pub fn village_limit(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_means_all_villages() {
        assert_eq!(village_limit(0), None);
        assert_eq!(village_limit(25), Some(25));
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = Config::new("in", "out");
        assert_eq!(config.file_prefix, DEFAULT_PREFIX);
        assert_eq!(config.top_category_count, DEFAULT_TOP_CATEGORIES);
        assert_eq!(config.village_limit, None);
        assert!(!config.dry_run);
    }
}

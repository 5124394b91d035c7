//! Dimensions Service - Builds DIM_GEOGRAPHY and DIM_PERIOD
//!
//! Responsibilities:
//! - Load the administrative reference tables from the data directory
//! - Build the four-level geography dimension
//! - Build the year/quarter/month/week period dimension
//! - Write both dimension files into the result directory
//!
//! Usage:
//!   cargo run --bin dimensions
//!   cargo run --bin dimensions -- --data-dir data_source --start-year 2022 --end-year 2025

use anyhow::{Context, Result};
use clap::Parser;
use dimensions::geography::{self, GeoLevel, GeographyDimensionBuilder, ReferenceTables};
use dimensions::period::{self, PeriodDimensionBuilder};
use dimensions::{GEOGRAPHY_FILE, PERIOD_FILE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dimensions", about = "Builds the geography and period dimension tables")]
struct Args {
    /// Directory holding the raw reference tables (overrides DATA_SOURCE_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory the dimension files are written to (overrides RESULT_DIR)
    #[arg(long)]
    result_dir: Option<PathBuf>,

    /// First year of the period dimension (overrides PERIOD_START_YEAR)
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year of the period dimension, inclusive (overrides PERIOD_END_YEAR)
    #[arg(long)]
    end_year: Option<i32>,
}

#[derive(Debug, Clone)]
struct Config {
    data_dir: PathBuf,
    result_dir: PathBuf,
    start_year: i32,
    end_year: i32,
}

impl Config {
    fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(
                std::env::var("DATA_SOURCE_DIR").unwrap_or_else(|_| "data_source".to_string()),
            ),
            result_dir: PathBuf::from(
                std::env::var("RESULT_DIR").unwrap_or_else(|_| "result".to_string()),
            ),
            start_year: std::env::var("PERIOD_START_YEAR")
                .unwrap_or_else(|_| "2022".to_string())
                .parse()
                .unwrap_or(2022),
            end_year: std::env::var("PERIOD_END_YEAR")
                .unwrap_or_else(|_| "2025".to_string())
                .parse()
                .unwrap_or(2025),
        }
    }

    fn with_args(mut self, args: Args) -> Self {
        if let Some(dir) = args.data_dir {
            self.data_dir = dir;
        }
        if let Some(dir) = args.result_dir {
            self.result_dir = dir;
        }
        if let Some(year) = args.start_year {
            self.start_year = year;
        }
        if let Some(year) = args.end_year {
            self.end_year = year;
        }
        self
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env().with_args(args);

    println!("=== Cooperative Analytics Dimensions ===");
    println!("Data source: {}", config.data_dir.display());
    println!("Result dir: {}", config.result_dir.display());
    println!("Period span: {}-{}", config.start_year, config.end_year);

    // Validate the year range before touching any file
    let period_builder = PeriodDimensionBuilder::new(config.start_year, config.end_year)?;

    let refs = ReferenceTables::load(&config.data_dir).context("Failed to load reference tables")?;
    let geo = GeographyDimensionBuilder::new(&refs).build();
    let periods = period_builder.build()?;

    std::fs::create_dir_all(&config.result_dir)
        .with_context(|| format!("Failed to create {}", config.result_dir.display()))?;

    let geo_path = config.result_dir.join(GEOGRAPHY_FILE);
    geography::write_dimension(&geo_path, &geo.nodes)?;
    let period_path = config.result_dir.join(PERIOD_FILE);
    period::write_dimension(&period_path, &periods)?;

    println!("\n{:-<60}", "");
    println!("Geography: {} rows -> {}", geo.nodes.len(), geo_path.display());
    for level in GeoLevel::ALL {
        println!("  {:<12} {:>8}", level.as_str(), geo.count_at(level));
    }
    let diag = &geo.diagnostics;
    if diag.dropped() > 0 || diag.duplicates_skipped > 0 || diag.missing_codes > 0 {
        println!(
            "  dropped: {} orphaned districts, {} orphaned subdistricts, {} orphaned villages, {} outside parent",
            diag.orphaned_districts,
            diag.orphaned_subdistricts,
            diag.orphaned_villages,
            diag.containment_violations
        );
        println!(
            "  skipped: {} duplicates, {} without code",
            diag.duplicates_skipped, diag.missing_codes
        );
    }
    println!("Period: {} rows -> {}", periods.len(), period_path.display());
    if let Some(latest) = period::latest_week(&periods) {
        println!(
            "  latest week: date_key {} ({} to {})",
            latest.date_key, latest.period_start, latest.period_end
        );
    }

    println!("\n=== Dimensions complete ===");
    Ok(())
}

//! Facts Service - Builds the versioned FACT_KPI table
//!
//! Responsibilities:
//! - Load the raw cooperative-sector tables and both dimension files
//! - Resolve village codes to internal ids (duplicate codes pooled)
//! - Compute dataset-wide aggregates once
//! - Emit one fact row per village with at least one cooperative
//! - Write the next `FACT_KPI_V<NNN>.csv` plus its JSON manifest
//!
//! Usage:
//!   cargo run --bin facts
//!   cargo run --bin facts -- --limit 500 --dry-run

use anyhow::Result;
use clap::Parser;
use facts::kpi::Measure;
use facts::{config, pipeline, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "facts", about = "Builds the cooperative KPI fact table")]
struct Args {
    /// Directory holding the raw tables (overrides DATA_SOURCE_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory with the dimension files and fact outputs (overrides RESULT_DIR)
    #[arg(long)]
    result_dir: Option<PathBuf>,

    /// Visit at most this many villages, 0 for all (overrides VILLAGE_LIMIT)
    #[arg(long)]
    limit: Option<usize>,

    /// Dry run - compute everything but write nothing
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.result_dir {
        config.result_dir = dir;
    }
    if let Some(limit) = args.limit {
        config.village_limit = config::village_limit(limit);
    }
    config.dry_run = args.dry_run;

    println!("=== Cooperative Analytics Facts ===");
    println!("Data source: {}", config.data_dir.display());
    println!("Result dir: {}", config.result_dir.display());
    println!("Mode: {}", if config.dry_run { "dry-run" } else { "live" });
    match config.village_limit {
        Some(n) => println!("Village limit: {n}"),
        None => println!("Village limit: all"),
    }

    let summary = pipeline::run(&config)?;
    let report = &summary.report;

    println!("\n{:-<60}", "");
    println!("Active date_key: {}", summary.date_key);
    println!("Villages visited: {}", report.villages_visited);
    println!("  skipped (code not in reference): {}", report.skipped_unresolved);
    println!("  skipped (no cooperatives): {}", report.skipped_without_cooperatives);
    println!("  duplicate village codes pooled: {}", summary.duplicate_village_codes);
    if summary.id_conflicts > 0 {
        println!("  ids with conflicting codes: {}", summary.id_conflicts);
    }
    println!("Fact rows: {}", report.rows);

    if report.rows > 0 {
        let coops = summary.total(Measure::TotalKoperasiTerdaftar);
        println!("\nSample statistics:");
        println!("  - Total cooperatives processed: {coops}");
        println!("  - Total members: {}", summary.total(Measure::TotalAnggotaKoperasi));
        println!("  - Total outlets: {}", summary.total(Measure::TotalGeraiKoperasi));
        println!(
            "  - Average cooperatives per village: {:.2}",
            coops / report.rows as f64
        );
    }

    match &summary.output {
        Some(out) => {
            println!("\nOutput: {} (version {})", out.csv_path.display(), out.version);
            println!("Manifest: {}", out.manifest_path.display());
            println!("Hash: {}", out.content_hash);
            println!("Size: {:.2} MB", out.bytes as f64 / (1024.0 * 1024.0));
        }
        None => println!("\nDry run: no files written"),
    }

    println!("\n=== Facts complete ===");
    Ok(())
}

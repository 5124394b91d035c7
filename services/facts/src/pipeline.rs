//! End-to-end fact run.
//!
//! Everything is loaded and computed before the first byte is written; any
//! load failure aborts with no output.

use crate::config::Config;
use crate::engine::{AggregationEngine, EngineReport, FactRow};
use crate::global::GlobalAggregates;
use crate::kpi::Measure;
use crate::output::{OutputWriter, WrittenOutput};
use crate::resolver::IdentityResolver;
use crate::sources::SourceTables;
use anyhow::{Context, Result};
use dimensions::geography::{self, GeoLevel};
use dimensions::period;
use dimensions::{GEOGRAPHY_FILE, PERIOD_FILE};
use tracing::info;

#[derive(Debug)]
pub struct RunSummary {
    pub date_key: u32,
    pub report: EngineReport,
    pub rows: Vec<FactRow>,
    /// `None` on a dry run.
    pub output: Option<WrittenOutput>,
    pub duplicate_village_codes: usize,
    /// Internal ids seen with more than one code, all levels.
    pub id_conflicts: usize,
}

impl RunSummary {
    /// Column total over every emitted row.
    pub fn total(&self, measure: Measure) -> f64 {
        self.rows.iter().map(|r| r.measures.value(measure)).sum()
    }
}

pub fn run(config: &Config) -> Result<RunSummary> {
    let sources = SourceTables::load(&config.data_dir)
        .with_context(|| format!("Failed to load source tables from {}", config.data_dir.display()))?;

    let geo_nodes = geography::read_dimension(&config.result_dir.join(GEOGRAPHY_FILE))?;
    let periods = period::read_dimension(&config.result_dir.join(PERIOD_FILE))?;
    if geo_nodes.is_empty() {
        anyhow::bail!("Geography dimension is empty; run the dimensions service first");
    }
    let latest = period::latest_week(&periods)
        .context("Period dimension has no week-level rows")?;
    info!(
        date_key = latest.date_key,
        start = %latest.period_start,
        end = %latest.period_end,
        "active period"
    );

    let resolver = IdentityResolver::from_reference(&sources.reference);
    let global = GlobalAggregates::compute(&sources, config.top_category_count);
    let engine = AggregationEngine::new(&sources, &resolver, &global);
    let (rows, report) = engine.run(&geo_nodes, latest.date_key, config.village_limit);

    let output = if config.dry_run {
        info!(rows = rows.len(), "dry run, nothing written");
        None
    } else {
        let writer = OutputWriter::new(&config.result_dir, &config.file_prefix);
        Some(writer.write(&rows, latest.date_key, &report)?)
    };

    Ok(RunSummary {
        date_key: latest.date_key,
        report,
        rows,
        output,
        duplicate_village_codes: resolver.duplicate_codes(GeoLevel::Village),
        id_conflicts: GeoLevel::ALL.iter().map(|l| resolver.conflicts(*l)).sum(),
    })
}

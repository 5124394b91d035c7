//! Period dimension - year → quarter → month → week
//!
//! Keys are assigned depth-first: a year, then its first quarter, that
//! quarter's first month, the month's weeks, the next month, ... so every
//! parent key precedes all of its descendants.
//!
//! Weeks start on Monday and are clipped to their month: the first and last
//! week of a month may be shorter than seven days, and numbering restarts
//! at 1 every month.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Granularity {
    Year,
    Quarter,
    Month,
    Week,
}

/// One row of DIM_PERIOD. Finer fields are `None` on coarser rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodNode {
    pub date_key: u32,
    pub year: i32,
    pub quarter: Option<u32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl PeriodNode {
    pub fn granularity(&self) -> Granularity {
        match (self.quarter, self.month, self.week) {
            (_, _, Some(_)) => Granularity::Week,
            (_, Some(_), None) => Granularity::Month,
            (Some(_), None, None) => Granularity::Quarter,
            (None, None, None) => Granularity::Year,
        }
    }

    /// Inclusive length in days.
    pub fn days(&self) -> i64 {
        (self.period_end - self.period_start).num_days() + 1
    }

    pub fn contains(&self, other: &PeriodNode) -> bool {
        self.period_start <= other.period_start && other.period_end <= self.period_end
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PeriodDimensionBuilder {
    start_year: i32,
    end_year: i32,
}

impl PeriodDimensionBuilder {
    /// Inclusive year range. An inverted range is rejected.
    pub fn new(start_year: i32, end_year: i32) -> Result<Self> {
        if start_year > end_year {
            anyhow::bail!("Invalid period range: start year {start_year} is after end year {end_year}");
        }
        NaiveDate::from_ymd_opt(start_year, 1, 1)
            .and(NaiveDate::from_ymd_opt(end_year, 12, 31))
            .with_context(|| format!("Year range {start_year}-{end_year} is outside the calendar"))?;
        Ok(Self {
            start_year,
            end_year,
        })
    }

    pub fn build(&self) -> Result<Vec<PeriodNode>> {
        let mut nodes = Vec::new();
        let mut date_key = 1u32;
        let mut push = |year, quarter, month, week, (start, end): (NaiveDate, NaiveDate)| {
            nodes.push(PeriodNode {
                date_key,
                year,
                quarter,
                month,
                week,
                period_start: start,
                period_end: end,
            });
            date_key += 1;
        };

        for year in self.start_year..=self.end_year {
            let year_start = first_of_month(year, 1)?;
            let year_end = last_of_month(year, 12)?;
            push(year, None, None, None, (year_start, year_end));

            for quarter in 1..=4u32 {
                let first_month = (quarter - 1) * 3 + 1;
                let last_month = quarter * 3;
                let bounds = (first_of_month(year, first_month)?, last_of_month(year, last_month)?);
                push(year, Some(quarter), None, None, bounds);

                for month in first_month..=last_month {
                    let bounds = (first_of_month(year, month)?, last_of_month(year, month)?);
                    push(year, Some(quarter), Some(month), None, bounds);

                    for (idx, week) in month_weeks(year, month)?.into_iter().enumerate() {
                        push(year, Some(quarter), Some(month), Some(idx as u32 + 1), week);
                    }
                }
            }
        }

        info!(
            start_year = self.start_year,
            end_year = self.end_year,
            rows = nodes.len(),
            "built period dimension"
        );
        Ok(nodes)
    }
}

/// Monday-start weeks of a month, clipped to the month's first and last day.
pub fn month_weeks(year: i32, month: u32) -> Result<Vec<(NaiveDate, NaiveDate)>> {
    let first = first_of_month(year, month)?;
    let last = last_of_month(year, month)?;

    let mut weeks = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        let to_sunday = 6 - i64::from(cursor.weekday().num_days_from_monday());
        let end = (cursor + Duration::days(to_sunday)).min(last);
        weeks.push((cursor, end));
        cursor = end + Duration::days(1);
    }
    Ok(weeks)
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("Invalid month {year}-{month:02}"))
}

fn last_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    first_of_month(next_year, next_month)?
        .pred_opt()
        .with_context(|| format!("No last day for {year}-{month:02}"))
}

/// The active period of a fact run: the week row with the highest key.
pub fn latest_week(nodes: &[PeriodNode]) -> Option<&PeriodNode> {
    nodes
        .iter()
        .filter(|n| n.granularity() == Granularity::Week)
        .max_by_key(|n| n.date_key)
}

// =============================================================================
// Persistence
// =============================================================================

pub fn write_dimension(path: &Path, nodes: &[PeriodNode]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for node in nodes {
        writer.serialize(node)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_dimension(path: &Path) -> Result<Vec<PeriodNode>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open period dimension {}", path.display()))?;
    let mut nodes = Vec::new();
    for row in reader.deserialize::<PeriodNode>() {
        nodes.push(row.with_context(|| format!("Invalid row in {}", path.display()))?);
    }
    Ok(nodes)
}

//! Dataset-wide aggregates
//!
//! Computed once before the per-village loop, then shared read-only with
//! every calculator.

use crate::sources::SourceTables;
use chrono::Datelike;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::info;

/// Cooperatives attached to one subdistrict id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubdistrictCoverage {
    pub cooperatives: usize,
    pub villages: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GlobalAggregates {
    /// Most assigned category ids, most frequent first.
    pub top_categories: Vec<i64>,
    pub cooperatives_per_province: HashMap<i64, usize>,
    pub cooperatives_per_district: HashMap<i64, usize>,
    pub subdistrict_coverage: HashMap<i64, SubdistrictCoverage>,
    pub outlets_per_province: HashMap<i64, usize>,
    /// Partnership service id → application count.
    pub service_distribution: HashMap<i64, usize>,
    /// Category id → sector, first reference row wins.
    pub sectors: HashMap<i64, String>,
    pub total_domains: usize,
    pub verified_domains: usize,
    pub partnership_growth_rate: f64,
}

impl GlobalAggregates {
    pub fn compute(sources: &SourceTables, top_n: usize) -> Self {
        let mut cooperatives_per_province: HashMap<i64, usize> = HashMap::new();
        let mut cooperatives_per_district: HashMap<i64, usize> = HashMap::new();
        let mut subdistrict_villages: HashMap<i64, (usize, HashSet<i64>)> = HashMap::new();
        let mut province_by_cooperative: HashMap<i64, i64> = HashMap::new();

        for coop in &sources.cooperatives {
            if let Some(id) = coop.province_id {
                *cooperatives_per_province.entry(id).or_default() += 1;
                province_by_cooperative.entry(coop.cooperative_id).or_insert(id);
            }
            if let Some(id) = coop.district_id {
                *cooperatives_per_district.entry(id).or_default() += 1;
            }
            if let Some(id) = coop.subdistrict_id {
                let (count, villages) = subdistrict_villages.entry(id).or_default();
                *count += 1;
                villages.extend(coop.village_id);
            }
        }

        let subdistrict_coverage = subdistrict_villages
            .into_iter()
            .map(|(id, (cooperatives, villages))| {
                (
                    id,
                    SubdistrictCoverage {
                        cooperatives,
                        villages: villages.len(),
                    },
                )
            })
            .collect();

        let mut outlets_per_province: HashMap<i64, usize> = HashMap::new();
        for outlet in &sources.outlets {
            if let Some(province) = province_by_cooperative.get(&outlet.cooperative_id) {
                *outlets_per_province.entry(*province).or_default() += 1;
            }
        }

        let mut service_distribution: HashMap<i64, usize> = HashMap::new();
        for id in sources
            .partnerships
            .iter()
            .filter_map(|p| p.business_partner_service_id)
        {
            *service_distribution.entry(id).or_default() += 1;
        }

        let mut sectors: HashMap<i64, String> = HashMap::new();
        for r in &sources.category_refs {
            if let Some(sector) = &r.sector {
                sectors.entry(r.category_id).or_insert_with(|| sector.clone());
            }
        }

        let verified_domains = sources
            .domains
            .iter()
            .filter(|d| d.verification_status.as_deref() == Some("Verified"))
            .count();

        let aggregates = Self {
            top_categories: top_categories(sources.categories.iter().map(|c| c.category_id), top_n),
            cooperatives_per_province,
            cooperatives_per_district,
            subdistrict_coverage,
            outlets_per_province,
            service_distribution,
            sectors,
            total_domains: sources.domains.len(),
            verified_domains,
            partnership_growth_rate: verified_growth_rate(sources),
        };

        info!(
            top_categories = aggregates.top_categories.len(),
            provinces = aggregates.cooperatives_per_province.len(),
            services = aggregates.service_distribution.len(),
            domains = aggregates.total_domains,
            growth_rate = aggregates.partnership_growth_rate,
            "global aggregates computed"
        );
        aggregates
    }

    pub fn is_top_category(&self, id: i64) -> bool {
        self.top_categories.contains(&id)
    }

    /// Sum of a per-region count over a set of region ids.
    pub fn sum_over(counts: &HashMap<i64, usize>, ids: &BTreeSet<i64>) -> usize {
        ids.iter().filter_map(|id| counts.get(id)).sum()
    }
}

/// The `n` most frequent ids; equal counts order by ascending id.
pub fn top_categories(ids: impl IntoIterator<Item = i64>, n: usize) -> Vec<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id).or_default() += 1;
    }
    let mut ranked: Vec<(i64, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(id, _)| id).collect()
}

/// Average month-over-month growth of verified applications, clamped to 0..=100.
///
/// Applications are bucketed by the calendar month of `created_at`; months
/// without any application are not buckets, so the deltas run between
/// consecutive *observed* months. Fewer than two buckets give 0.
pub fn verified_growth_rate(sources: &SourceTables) -> f64 {
    let mut monthly: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for p in &sources.partnerships {
        if p.status.as_deref() != Some("Verified") {
            continue;
        }
        if let Some(created) = p.created_at {
            *monthly.entry((created.year(), created.month())).or_default() += 1;
        }
    }

    let counts: Vec<f64> = monthly.values().map(|c| *c as f64).collect();
    let rates: Vec<f64> = counts
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();

    if rates.is_empty() {
        return 0.0;
    }
    let avg = rates.iter().sum::<f64>() / rates.len() as f64;
    avg.clamp(0.0, 100.0)
}

//! Business classification (KLU) measures.

use super::{dominant_share, safe_divide, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;
use std::collections::HashSet;

pub fn calculate(scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let assignments = &scope.categories;
    let coops = scope.cooperatives.len();

    let distinct: HashSet<i64> = assignments.iter().map(|a| a.category_id).collect();
    let using_top: HashSet<i64> = assignments
        .iter()
        .filter(|a| global.is_top_category(a.category_id))
        .map(|a| a.cooperative_id)
        .collect();

    let mut m = Measures::new();
    m.set_count(Measure::TotalKLUTerdaftar, distinct.len());
    m.set_count(Measure::Top10KBLITerbanyak, using_top.len());
    m.set_count(Measure::DistribusiKLUPerProvinsi, distinct.len());
    m.set(
        Measure::ProporsiSektorUtama,
        dominant_share(
            assignments
                .iter()
                .map(|a| global.sectors.get(&a.category_id)),
            assignments.len(),
        ),
    );
    m.set(
        Measure::RataRataKLUPerKoperasi,
        safe_divide(assignments.len() as f64, coops as f64),
    );
    m.set(
        Measure::KluDiversificationIndex,
        safe_divide(distinct.len() as f64, coops.max(1) as f64),
    );
    m
}

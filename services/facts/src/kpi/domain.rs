//! Cooperative web-domain measures. Dataset-wide, identical on every row.

use super::{safe_percentage, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;

pub fn calculate(_scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let mut m = Measures::new();
    m.set_count(Measure::TotalDomainKoperasiTerdaftar, global.total_domains);
    m.set(
        Measure::DomainKoperasiTerverifikasi,
        safe_percentage(global.verified_domains as f64, global.total_domains as f64),
    );
    m
}

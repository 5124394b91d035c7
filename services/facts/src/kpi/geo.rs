//! Geography-composite measures: density, coverage and data completeness.

use super::{safe_divide, safe_percentage, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;

/// Bounds of the cooperatives-per-village average.
pub const PER_VILLAGE_MIN: f64 = 1.0;
pub const PER_VILLAGE_MAX: f64 = 3.0;

pub fn calculate(scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let mut m = Measures::new();

    m.set(
        Measure::KoperasiPer10000PendudukDesa,
        safe_divide(scope.cooperatives.len() as f64, scope.population) * 10_000.0,
    );
    m.set(Measure::KoperasiPerDesa, cooperatives_per_village(scope, global));
    m.set_count(Measure::JumlahPenggabunganDesa, scope.mergers);
    m.set(Measure::GeoSpatialDataCompletenessScore, completeness(scope));
    m
}

/// Subdistrict-wide cooperatives over distinct villages, clamped to 1..=3.
fn cooperatives_per_village(scope: &VillageScope<'_>, global: &GlobalAggregates) -> f64 {
    let (coops, villages) = scope
        .subdistrict_ids
        .iter()
        .filter_map(|id| global.subdistrict_coverage.get(id))
        .fold((0usize, 0usize), |(c, v), cov| (c + cov.cooperatives, v + cov.villages));

    if coops == 0 || villages == 0 {
        return PER_VILLAGE_MIN;
    }
    (coops as f64 / villages as f64).clamp(PER_VILLAGE_MIN, PER_VILLAGE_MAX)
}

/// Share of filled (longitude, latitude, address) slots across cooperatives
/// and service points.
fn completeness(scope: &VillageScope<'_>) -> f64 {
    let slots = scope
        .cooperatives
        .iter()
        .map(|c| [&c.longitude, &c.latitude, &c.address])
        .chain(
            scope
                .service_points
                .iter()
                .map(|p| [&p.longitude, &p.latitude, &p.address]),
        );

    let (filled, total) = slots.fold((0usize, 0usize), |(filled, total), fields| {
        let present = fields.iter().filter(|f| f.is_some()).count();
        (filled + present, total + fields.len())
    });
    safe_percentage(filled as f64, total as f64)
}

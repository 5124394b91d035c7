//! Village service point (UPKDK) measures.

use super::{dominant_share, is, share, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;

pub fn calculate(scope: &VillageScope<'_>, _global: &GlobalAggregates) -> Measures {
    let points = &scope.service_points;
    let mut m = Measures::new();

    m.set_count(Measure::TotalUPKDKAktif, points.len());
    m.set(
        Measure::ProporsiJenisUPKDK,
        dominant_share(points.iter().map(|p| p.kind.as_deref()), points.len()),
    );
    m.set(
        Measure::UpkdkDenganAksesInternet,
        share(points, |p| is(&p.internet_access, "Ada")),
    );
    m.set(
        Measure::KondisiBangunanUpkdkLayak,
        share(points, |p| is(&p.building_condition, "Baik")),
    );
    m.set(
        Measure::PersentaseUpkdkDenganAksesAirListrikMemadai,
        share(points, |p| is(&p.water_electricity, "Ya")),
    );
    m
}

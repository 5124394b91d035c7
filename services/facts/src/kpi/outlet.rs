//! Outlet (gerai) measures.

use super::{dominant_share, safe_divide, share, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;

pub fn calculate(scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let outlets = &scope.outlets;
    let mut m = Measures::new();

    m.set_count(Measure::TotalGeraiKoperasi, outlets.len());
    m.set(
        Measure::GeraiPerKoperasi,
        safe_divide(outlets.len() as f64, scope.cooperatives.len() as f64),
    );
    m.set_count(
        Measure::SebaranGeraiPerProvinsi,
        GlobalAggregates::sum_over(&global.outlets_per_province, scope.province_ids),
    );

    // No outlet type, cold-storage or opening-date data exists yet
    m.not_implemented(Measure::KomposisiTipeGerai);
    m.not_implemented(Measure::ColdStorageCoverage);
    m.not_implemented(Measure::OutletExpansionRate);

    m.set(
        Measure::PersentaseGeraiDenganFotoTerunggah,
        share(outlets, |o| o.primary_image.is_some()),
    );
    m.set(
        Measure::DistribusiJenisGeraiKoperasi,
        dominant_share(
            outlets.iter().map(|o| o.cooperative_type_id.as_deref()),
            outlets.len(),
        ),
    );
    m
}

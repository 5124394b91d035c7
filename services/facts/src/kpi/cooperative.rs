//! Cooperative registration measures.

use super::{is, mean, share, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;

pub fn calculate(scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let coops = &scope.cooperatives;
    let mut m = Measures::new();

    m.set_count(Measure::TotalKoperasiTerdaftar, coops.len());
    m.set_count(
        Measure::TotalKoperasiPerProvinsi,
        GlobalAggregates::sum_over(&global.cooperatives_per_province, scope.province_ids),
    );
    m.set_count(
        Measure::TotalKoperasiPerKabupatenKota,
        GlobalAggregates::sum_over(&global.cooperatives_per_district, scope.district_ids),
    );

    m.set(Measure::RataRataModalAwalKoperasi, mean(coops.iter().map(|c| c.capital)));
    m.set(Measure::TotalModalAwalKoperasi, coops.iter().map(|c| c.capital).sum());

    m.set(
        Measure::RasioKoperasiBaruVsTotal,
        share(coops, |c| is(&c.registration_type, "Pendaftaran Baru")),
    );
    m.set(
        Measure::RasioPendaftaranMandiriVsPendamping,
        share(coops, |c| is(&c.filling_method, "Mandiri")),
    );
    m
}

//! Membership measures.

use super::{is, mean, share, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;

pub fn calculate(scope: &VillageScope<'_>, _global: &GlobalAggregates) -> Measures {
    let members = &scope.members;
    let mut m = Measures::new();

    m.set_count(Measure::TotalAnggotaKoperasi, members.len());
    m.set(
        Measure::RasioGenderAnggotaLP,
        share(members, |x| is(&x.gender, "PEREMPUAN")),
    );
    m.set(
        Measure::RataRataSimpananPokokPerAnggota,
        mean(members.iter().map(|x| x.principal_saving)),
    );
    m.set(
        Measure::RataRataSimpananWajibPerAnggota,
        mean(members.iter().map(|x| x.mandatory_saving)),
    );
    m.set(
        Measure::RasioAnggotaDenganBICheckingLancar,
        share(members, |x| is(&x.bi_checking_verification, "Lancar")),
    );

    // whole members per cooperative
    let per_coop = members
        .len()
        .checked_div(scope.cooperatives.len())
        .unwrap_or(0);
    m.set_count(Measure::RataRataAnggotaPerKoperasi, per_coop);
    m
}

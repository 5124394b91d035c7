//! Business partnership application measures.

use super::{is, mean, share, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;
use crate::sources::Partnership;

const IN_PROGRESS: [&str; 3] = ["Requested", "InReview", "In Progress"];

/// Longest processing time counted, in hours.
pub const PROCESSING_CAP_HOURS: f64 = 72.0;
/// Reported floor once any valid processing time exists.
pub const PROCESSING_FLOOR_HOURS: f64 = 5.0;

pub fn calculate(scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let apps = &scope.partnerships;
    let mut m = Measures::new();

    m.set_count(Measure::TotalAplikasiKemitraan, apps.len());
    m.set(Measure::VerifiedPartnershipRate, share(apps, |p| is(&p.status, "Verified")));
    m.set(Measure::RejectedPartnershipRate, share(apps, |p| is(&p.status, "Rejected")));
    m.set(
        Measure::InProgressPartnershipRate,
        share(apps, |p| {
            p.status
                .as_deref()
                .is_some_and(|s| IN_PROGRESS.contains(&s))
        }),
    );

    let first_service = apps.first().and_then(|p| p.business_partner_service_id);
    m.set_count(
        Measure::DistribusiJenisLayananKemitraan,
        first_service
            .and_then(|id| global.service_distribution.get(&id).copied())
            .unwrap_or(0),
    );
    m.set(Measure::PartnershipGrowthRate, global.partnership_growth_rate);
    m.set_count(Measure::KemitraanPerProvinsi, apps.len());
    m.set(
        Measure::RataRataWaktuProsesAplikasiKemitraan,
        average_processing_hours(apps),
    );
    m
}

/// Mean of positive `updated_at - created_at` spans in hours, each capped,
/// floored at [`PROCESSING_FLOOR_HOURS`]. 0 when no span is usable.
pub fn average_processing_hours(apps: &[&Partnership]) -> f64 {
    let hours: Vec<f64> = apps
        .iter()
        .filter_map(|p| Some((p.updated_at? - p.created_at?).num_seconds() as f64 / 3600.0))
        .filter(|h| *h > 0.0)
        .map(|h| h.min(PROCESSING_CAP_HOURS))
        .collect();
    if hours.is_empty() {
        return 0.0;
    }
    mean(hours).max(PROCESSING_FLOOR_HOURS)
}

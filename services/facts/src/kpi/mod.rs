//! KPI calculator modules
//!
//! Each module is a pure function of one village's scoped tables plus the
//! shared [`GlobalAggregates`], returning the measures it owns. The engine
//! merges every module's output into one fact row; precision is applied
//! later by the writer, never here.

use crate::engine::VillageScope;
use crate::global::GlobalAggregates;
use crate::output::Precision;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

pub mod category;
pub mod cooperative;
pub mod domain;
pub mod geo;
pub mod management;
pub mod membership;
pub mod outlet;
pub mod partnership;
pub mod service_point;

macro_rules! measures {
    ($($variant:ident => $precision:ident,)+) => {
        /// Fact measures, declared in output column order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Measure {
            $($variant,)+
        }

        impl Measure {
            pub const ALL: &'static [Measure] = &[$(Measure::$variant,)+];

            /// Output column name.
            pub fn column(self) -> &'static str {
                match self {
                    $(Measure::$variant => stringify!($variant),)+
                }
            }

            pub fn precision(self) -> Precision {
                match self {
                    $(Measure::$variant => Precision::$precision,)+
                }
            }
        }
    };
}

measures! {
    TotalKoperasiTerdaftar => Count,
    TotalKoperasiPerProvinsi => Count,
    TotalKoperasiPerKabupatenKota => Count,
    RataRataModalAwalKoperasi => Amount,
    TotalModalAwalKoperasi => Amount,
    RasioKoperasiBaruVsTotal => Percentage,
    RasioPendaftaranMandiriVsPendamping => Percentage,
    KoperasiPer10000PendudukDesa => Amount,
    TotalAnggotaKoperasi => Count,
    RasioGenderAnggotaLP => Percentage,
    RataRataSimpananPokokPerAnggota => Amount,
    RataRataSimpananWajibPerAnggota => Amount,
    RasioAnggotaDenganBICheckingLancar => Percentage,
    TotalPengurusKoperasi => Count,
    TotalPengawasKoperasi => Count,
    RasioGenderPengurus => Percentage,
    RatioStrukturJabatanLengkap => Percentage,
    RataRataAnggotaPerKoperasi => Count,
    TotalGeraiKoperasi => Count,
    GeraiPerKoperasi => Amount,
    SebaranGeraiPerProvinsi => Count,
    KomposisiTipeGerai => Percentage,
    ColdStorageCoverage => Percentage,
    OutletExpansionRate => Percentage,
    TotalKLUTerdaftar => Count,
    Top10KBLITerbanyak => Count,
    DistribusiKLUPerProvinsi => Count,
    ProporsiSektorUtama => Percentage,
    RataRataKLUPerKoperasi => Amount,
    KluDiversificationIndex => Percentage,
    TotalAplikasiKemitraan => Count,
    VerifiedPartnershipRate => Percentage,
    RejectedPartnershipRate => Percentage,
    InProgressPartnershipRate => Percentage,
    DistribusiJenisLayananKemitraan => Count,
    PartnershipGrowthRate => Percentage,
    KemitraanPerProvinsi => Count,
    TotalUPKDKAktif => Count,
    ProporsiJenisUPKDK => Percentage,
    UpkdkDenganAksesInternet => Percentage,
    KondisiBangunanUpkdkLayak => Percentage,
    TotalDomainKoperasiTerdaftar => Count,
    DomainKoperasiTerverifikasi => Percentage,
    KoperasiPerDesa => Amount,
    JumlahPenggabunganDesa => Count,
    GeoSpatialDataCompletenessScore => Percentage,
    PersentaseGeraiDenganFotoTerunggah => Percentage,
    DistribusiJenisGeraiKoperasi => Percentage,
    RataRataWaktuProsesAplikasiKemitraan => Amount,
    PersentaseUpkdkDenganAksesAirListrikMemadai => Percentage,
}

/// A computed measure, or the marker for a metric with no source data yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    Value(f64),
    NotImplemented,
}

impl MeasureValue {
    /// Numeric value as written to the fact file.
    pub fn as_f64(self) -> f64 {
        match self {
            MeasureValue::Value(v) => v,
            MeasureValue::NotImplemented => 0.0,
        }
    }
}

/// Measures produced for one village.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measures {
    values: BTreeMap<Measure, MeasureValue>,
}

impl Measures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, measure: Measure, value: f64) {
        self.values.insert(measure, MeasureValue::Value(value));
    }

    pub fn set_count(&mut self, measure: Measure, count: usize) {
        self.set(measure, count as f64);
    }

    pub fn not_implemented(&mut self, measure: Measure) {
        self.values.insert(measure, MeasureValue::NotImplemented);
    }

    pub fn get(&self, measure: Measure) -> Option<MeasureValue> {
        self.values.get(&measure).copied()
    }

    /// Written value: absent and not-implemented measures read as 0.
    pub fn value(&self, measure: Measure) -> f64 {
        self.get(measure).map_or(0.0, MeasureValue::as_f64)
    }

    pub fn merge(&mut self, other: Measures) {
        self.values.extend(other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Measure, MeasureValue)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }
}

pub type Calculator = fn(&VillageScope<'_>, &GlobalAggregates) -> Measures;

/// Every calculator module, in the order their measures are merged.
pub const CALCULATORS: &[(&str, Calculator)] = &[
    ("cooperative", cooperative::calculate),
    ("geo", geo::calculate),
    ("membership", membership::calculate),
    ("management", management::calculate),
    ("outlet", outlet::calculate),
    ("category", category::calculate),
    ("partnership", partnership::calculate),
    ("service_point", service_point::calculate),
    ("domain", domain::calculate),
];

/// Run every calculator against one scope and merge the results.
pub fn calculate_all(scope: &VillageScope<'_>, global: &GlobalAggregates) -> Measures {
    let mut measures = Measures::new();
    for (_, calculate) in CALCULATORS {
        measures.merge(calculate(scope, global));
    }
    measures
}

// =============================================================================
// Shared numeric helpers
// =============================================================================

/// `numerator / denominator`, or 0 when the denominator is zero or not finite.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    numerator / denominator
}

/// Percentage in 0..=100 terms, 0 on a zero denominator.
pub fn safe_percentage(numerator: f64, denominator: f64) -> f64 {
    safe_divide(numerator, denominator) * 100.0
}

/// Share of `items` matching `pred`, as a percentage.
pub fn share<T>(items: &[T], pred: impl Fn(&T) -> bool) -> f64 {
    let hits = items.iter().filter(|item| pred(item)).count();
    safe_percentage(hits as f64, items.len() as f64)
}

/// Share of the most frequent non-empty key among `total` rows.
///
/// Rows with no key still count in the denominator.
pub fn dominant_share<K, I>(keys: I, total: usize) -> f64
where
    K: Eq + Hash,
    I: IntoIterator<Item = Option<K>>,
{
    let mut counts: HashMap<K, usize> = HashMap::new();
    for key in keys.into_iter().flatten() {
        *counts.entry(key).or_default() += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    safe_percentage(top as f64, total as f64)
}

/// Arithmetic mean, 0 for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    safe_divide(sum, n as f64)
}

/// Text equality against a fixed label.
pub fn is(value: &Option<String>, label: &str) -> bool {
    value.as_deref() == Some(label)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fifty_measures_with_unique_columns() {
        assert_eq!(Measure::ALL.len(), 50);
        let columns: HashSet<&str> = Measure::ALL.iter().map(|m| m.column()).collect();
        assert_eq!(columns.len(), 50);
        assert_eq!(Measure::ALL[0].column(), "TotalKoperasiTerdaftar");
        assert_eq!(
            Measure::ALL[49].column(),
            "PersentaseUpkdkDenganAksesAirListrikMemadai"
        );
    }

    #[test]
    fn test_safe_divide_zero_denominator() {
        assert_eq!(safe_divide(5.0, 0.0), 0.0);
        assert_eq!(safe_divide(5.0, f64::NAN), 0.0);
        assert_eq!(safe_divide(6.0, 3.0), 2.0);
        assert_eq!(safe_percentage(1.0, 4.0), 25.0);
    }

    #[test]
    fn test_dominant_share_counts_blanks_in_denominator() {
        let keys = vec![Some("a"), Some("a"), Some("b"), None];
        assert_eq!(dominant_share(keys, 4), 50.0);
        assert_eq!(dominant_share(Vec::<Option<&str>>::new(), 0), 0.0);
    }

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(Vec::new()), 0.0);
        assert_eq!(mean(vec![1.0, 2.0, 6.0]), 3.0);
    }

    #[test]
    fn test_not_implemented_distinct_from_zero() {
        let mut m = Measures::new();
        m.set(Measure::ColdStorageCoverage, 0.0);
        m.not_implemented(Measure::OutletExpansionRate);
        assert_eq!(m.get(Measure::ColdStorageCoverage), Some(MeasureValue::Value(0.0)));
        assert_eq!(m.get(Measure::OutletExpansionRate), Some(MeasureValue::NotImplemented));
        assert_eq!(m.value(Measure::OutletExpansionRate), 0.0);
        assert_eq!(m.value(Measure::KomposisiTipeGerai), 0.0);
    }

    #[test]
    fn test_calculators_cover_every_measure() {
        let sources = crate::sources::SourceTables::default();
        let ids = std::collections::BTreeSet::new();
        let scope = fixtures::whole_scope(&sources, &ids);
        let global = fixtures::globals(&sources);
        let measures = calculate_all(&scope, &global);
        for measure in Measure::ALL {
            assert!(measures.get(*measure).is_some(), "{} not produced", measure.column());
        }
    }
}

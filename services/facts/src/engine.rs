//! Aggregation engine - one fact row per village with cooperatives
//!
//! For each village node of the geography dimension:
//! 1. resolve its code to every internal village id sharing it
//! 2. scope all entity tables to those ids (union, in input order)
//! 3. skip the node when nothing resolves or no cooperative is in scope
//! 4. pick representative keys and run every calculator module

use crate::global::GlobalAggregates;
use crate::kpi::{self, Measures};
use crate::resolver::IdentityResolver;
use crate::sources::{
    CategoryAssignment, Cooperative, Management, Member, Outlet, Partnership, RoleColumn,
    ServicePoint, SourceTables,
};
use dimensions::geography::{GeoLevel, GeographyNode};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

const PROGRESS_EVERY: usize = 1_000;

/// Everything the calculators may look at for one village.
#[derive(Debug, Clone)]
pub struct VillageScope<'a> {
    pub village_ids: &'a BTreeSet<i64>,
    pub province_ids: &'a BTreeSet<i64>,
    pub district_ids: &'a BTreeSet<i64>,
    pub subdistrict_ids: &'a BTreeSet<i64>,
    pub cooperatives: Vec<&'a Cooperative>,
    pub members: Vec<&'a Member>,
    pub management: Vec<&'a Management>,
    pub role_column: RoleColumn,
    pub outlets: Vec<&'a Outlet>,
    pub categories: Vec<&'a CategoryAssignment>,
    pub partnerships: Vec<&'a Partnership>,
    pub service_points: Vec<&'a ServicePoint>,
    pub mergers: usize,
    /// Residents summed over every resolved village id.
    pub population: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub date_key: u32,
    pub geo_key: u32,
    pub outlet_id: i64,
    pub business_partner_service_id: i64,
    pub upkdk_id: i64,
    pub klu_id: i64,
    pub measures: Measures,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub villages_visited: usize,
    pub rows: usize,
    /// Village code absent from the reference table.
    pub skipped_unresolved: usize,
    /// Resolved, but no cooperative attached.
    pub skipped_without_cooperatives: usize,
}

/// Row positions grouped by a foreign key.
type RowIndex = HashMap<i64, Vec<usize>>;

fn index_by<T>(rows: &[T], key: impl Fn(&T) -> Option<i64>) -> RowIndex {
    let mut index = RowIndex::new();
    for (pos, row) in rows.iter().enumerate() {
        if let Some(k) = key(row) {
            index.entry(k).or_default().push(pos);
        }
    }
    index
}

/// Rows whose key is in `keys`, each once, in input order.
fn gather<'a, T>(
    rows: &'a [T],
    index: &RowIndex,
    keys: impl IntoIterator<Item = i64>,
) -> Vec<&'a T> {
    let mut positions: Vec<usize> = keys
        .into_iter()
        .filter_map(|k| index.get(&k))
        .flatten()
        .copied()
        .collect();
    positions.sort_unstable();
    positions.dedup();
    positions.into_iter().map(|p| &rows[p]).collect()
}

pub struct AggregationEngine<'a> {
    sources: &'a SourceTables,
    resolver: &'a IdentityResolver,
    global: &'a GlobalAggregates,
    cooperatives_by_village: RowIndex,
    members_by_cooperative: RowIndex,
    management_by_cooperative: RowIndex,
    outlets_by_cooperative: RowIndex,
    categories_by_cooperative: RowIndex,
    partnerships_by_cooperative: RowIndex,
    service_points_by_village: RowIndex,
    mergers_by_village: HashMap<i64, usize>,
    population_by_village: HashMap<i64, f64>,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(
        sources: &'a SourceTables,
        resolver: &'a IdentityResolver,
        global: &'a GlobalAggregates,
    ) -> Self {
        let mut mergers_by_village: HashMap<i64, usize> = HashMap::new();
        for id in sources.mergers.iter().filter_map(|m| m.village_id) {
            *mergers_by_village.entry(id).or_default() += 1;
        }

        let mut population_by_village: HashMap<i64, f64> = HashMap::new();
        for v in &sources.reference.villages {
            if let Some(id) = v.village_id {
                population_by_village.entry(id).or_insert_with(|| v.population());
            }
        }

        Self {
            sources,
            resolver,
            global,
            cooperatives_by_village: index_by(&sources.cooperatives, |c| c.village_id),
            members_by_cooperative: index_by(&sources.members, |m| Some(m.cooperative_id)),
            management_by_cooperative: index_by(&sources.management, |m| Some(m.cooperative_id)),
            outlets_by_cooperative: index_by(&sources.outlets, |o| Some(o.cooperative_id)),
            categories_by_cooperative: index_by(&sources.categories, |c| Some(c.cooperative_id)),
            partnerships_by_cooperative: index_by(&sources.partnerships, |p| Some(p.cooperative_id)),
            service_points_by_village: index_by(&sources.service_points, |s| s.village_id),
            mergers_by_village,
            population_by_village,
        }
    }

    /// Scope the entity tables to one village node, or say why the node
    /// yields no fact row.
    pub fn scope(&self, node: &GeographyNode) -> Result<VillageScope<'a>, Skip> {
        let resolver = self.resolver;
        let s = self.sources;

        let village_ids = resolver.ids_opt(GeoLevel::Village, node.village_code.as_deref());
        if village_ids.is_empty() {
            return Err(Skip::Unresolved);
        }

        let cooperatives = gather(
            &s.cooperatives,
            &self.cooperatives_by_village,
            village_ids.iter().copied(),
        );
        if cooperatives.is_empty() {
            return Err(Skip::NoCooperatives);
        }
        let owners: BTreeSet<i64> = cooperatives.iter().map(|c| c.cooperative_id).collect();
        let owned = || owners.iter().copied();

        Ok(VillageScope {
            village_ids,
            province_ids: resolver.ids_opt(GeoLevel::Province, node.province_code.as_deref()),
            district_ids: resolver.ids_opt(GeoLevel::District, node.district_code.as_deref()),
            subdistrict_ids: resolver
                .ids_opt(GeoLevel::Subdistrict, node.subdistrict_code.as_deref()),
            members: gather(&s.members, &self.members_by_cooperative, owned()),
            management: gather(&s.management, &self.management_by_cooperative, owned()),
            role_column: s.role_column,
            outlets: gather(&s.outlets, &self.outlets_by_cooperative, owned()),
            categories: gather(&s.categories, &self.categories_by_cooperative, owned()),
            partnerships: gather(&s.partnerships, &self.partnerships_by_cooperative, owned()),
            service_points: gather(
                &s.service_points,
                &self.service_points_by_village,
                village_ids.iter().copied(),
            ),
            mergers: village_ids
                .iter()
                .filter_map(|id| self.mergers_by_village.get(id))
                .sum(),
            population: village_ids
                .iter()
                .filter_map(|id| self.population_by_village.get(id))
                .sum(),
            cooperatives,
        })
    }

    /// Build the fact row for one node, if it qualifies.
    pub fn fact_row(&self, node: &GeographyNode, date_key: u32) -> Result<FactRow, Skip> {
        let scope = self.scope(node)?;
        Ok(FactRow {
            date_key,
            geo_key: node.geo_key,
            outlet_id: first_key(scope.outlets.iter().map(|o| o.cooperative_outlet_id)),
            business_partner_service_id: first_key(
                scope.partnerships.iter().map(|p| p.business_partner_service_id),
            ),
            upkdk_id: first_key(scope.service_points.iter().map(|s| s.upkdk_id)),
            klu_id: first_key(scope.categories.iter().map(|c| Some(c.category_id))),
            measures: kpi::calculate_all(&scope, self.global),
        })
    }

    /// Visit village nodes in dimension order, at most `limit` of them.
    pub fn run(
        &self,
        nodes: &[GeographyNode],
        date_key: u32,
        limit: Option<usize>,
    ) -> (Vec<FactRow>, EngineReport) {
        let villages: Vec<&GeographyNode> = nodes
            .iter()
            .filter(|n| n.is_village())
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        let total = villages.len();
        info!(villages = total, date_key, "aggregating villages");

        let mut rows = Vec::new();
        let mut report = EngineReport::default();
        for (idx, node) in villages.into_iter().enumerate() {
            report.villages_visited += 1;
            match self.fact_row(node, date_key) {
                Ok(row) => rows.push(row),
                Err(skip) => {
                    debug!(geo_key = node.geo_key, ?skip, "village skipped");
                    match skip {
                        Skip::Unresolved => report.skipped_unresolved += 1,
                        Skip::NoCooperatives => report.skipped_without_cooperatives += 1,
                    }
                }
            }
            let visited = idx + 1;
            if visited % PROGRESS_EVERY == 0 || visited == total {
                info!(visited, total, rows = rows.len(), geo_key = node.geo_key, "progress");
            }
        }

        report.rows = rows.len();
        (rows, report)
    }
}

/// Why a village node produced no fact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Unresolved,
    NoCooperatives,
}

/// First present key in input order; 0 when the scope has none.
///
/// A leading row with a blank key yields 0, matching "first row's key".
fn first_key(keys: impl IntoIterator<Item = Option<i64>>) -> i64 {
    keys.into_iter().next().flatten().unwrap_or(0)
}

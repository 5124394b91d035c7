//! Geography dimension - four-level administrative hierarchy
//!
//! Responsibilities:
//! - Load the province / district / subdistrict / village reference tables
//! - Emit one row per hierarchy node with a dense surrogate `geo_key`
//! - Assign keys in level order: every province, then every district, ...
//! - Drop (and count) children whose parent cannot be resolved
//!
//! Codes are dotted and hierarchical (`11`, `11.05`, `11.05.07`,
//! `11.05.07.2001`). A child row is only accepted when its code sits under
//! its parent's code.

use crate::table::{lenient, Table, TableError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeoLevel {
    Province,
    District,
    Subdistrict,
    Village,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 4] = [
        GeoLevel::Province,
        GeoLevel::District,
        GeoLevel::Subdistrict,
        GeoLevel::Village,
    ];

    /// 1 for province through 4 for village.
    pub fn depth(self) -> usize {
        self as usize + 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeoLevel::Province => "province",
            GeoLevel::District => "district",
            GeoLevel::Subdistrict => "subdistrict",
            GeoLevel::Village => "village",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reference tables
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvinceRef {
    #[serde(default, alias = "provinceId", deserialize_with = "lenient::opt_id")]
    pub province_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistrictRef {
    #[serde(default, alias = "districtId", deserialize_with = "lenient::opt_id")]
    pub district_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, alias = "provinceCode", deserialize_with = "lenient::text")]
    pub province_code: Option<String>,
    #[serde(default, alias = "provinceId", deserialize_with = "lenient::opt_id")]
    pub province_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubdistrictRef {
    #[serde(default, alias = "subdistrictId", deserialize_with = "lenient::opt_id")]
    pub subdistrict_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, alias = "districtCode", deserialize_with = "lenient::text")]
    pub district_code: Option<String>,
    #[serde(default, alias = "districtId", deserialize_with = "lenient::opt_id")]
    pub district_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VillageRef {
    #[serde(default, alias = "villageId", deserialize_with = "lenient::opt_id")]
    pub village_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, alias = "subdistrictCode", deserialize_with = "lenient::text")]
    pub subdistrict_code: Option<String>,
    #[serde(default, alias = "subdistrictId", deserialize_with = "lenient::opt_id")]
    pub subdistrict_id: Option<i64>,
    /// Residents under 17
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_u17: f64,
    /// Residents 17 and over
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_a17: f64,
}

impl VillageRef {
    pub fn population(&self) -> f64 {
        self.total_u17 + self.total_a17
    }
}

/// The four administrative reference tables, in source order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub provinces: Vec<ProvinceRef>,
    pub districts: Vec<DistrictRef>,
    pub subdistricts: Vec<SubdistrictRef>,
    pub villages: Vec<VillageRef>,
}

impl ReferenceTables {
    /// Load all four tables from `dir`. Any missing file is fatal.
    pub fn load(dir: &Path) -> std::result::Result<Self, TableError> {
        Ok(Self {
            provinces: Table::load(dir, "provinces")?.records(),
            districts: Table::load(dir, "districts")?.records(),
            subdistricts: Table::load(dir, "subdistricts")?.records(),
            villages: Table::load(dir, "villages")?.records(),
        })
    }
}

// =============================================================================
// Dimension rows
// =============================================================================

/// One row of DIM_GEOGRAPHY. Levels deeper than the node's own are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographyNode {
    pub geo_key: u32,
    pub province_code: Option<String>,
    pub province_name: Option<String>,
    pub district_code: Option<String>,
    pub district_name: Option<String>,
    pub subdistrict_code: Option<String>,
    pub subdistrict_name: Option<String>,
    pub village_code: Option<String>,
    pub village_name: Option<String>,
}

impl GeographyNode {
    /// Build a node from its ancestor chain, province first.
    fn from_chain(geo_key: u32, chain: &[&Named]) -> Self {
        let code = |i: usize| chain.get(i).map(|n| n.code.clone());
        let name = |i: usize| chain.get(i).and_then(|n| n.name.clone());
        Self {
            geo_key,
            province_code: code(0),
            province_name: name(0),
            district_code: code(1),
            district_name: name(1),
            subdistrict_code: code(2),
            subdistrict_name: name(2),
            village_code: code(3),
            village_name: name(3),
        }
    }

    pub fn code(&self, level: GeoLevel) -> Option<&str> {
        match level {
            GeoLevel::Province => self.province_code.as_deref(),
            GeoLevel::District => self.district_code.as_deref(),
            GeoLevel::Subdistrict => self.subdistrict_code.as_deref(),
            GeoLevel::Village => self.village_code.as_deref(),
        }
    }

    pub fn name(&self, level: GeoLevel) -> Option<&str> {
        match level {
            GeoLevel::Province => self.province_name.as_deref(),
            GeoLevel::District => self.district_name.as_deref(),
            GeoLevel::Subdistrict => self.subdistrict_name.as_deref(),
            GeoLevel::Village => self.village_name.as_deref(),
        }
    }

    /// Deepest level with a code, or `None` for an empty row.
    pub fn level(&self) -> Option<GeoLevel> {
        GeoLevel::ALL
            .iter()
            .rev()
            .copied()
            .find(|&level| self.code(level).is_some())
    }

    pub fn is_village(&self) -> bool {
        self.level() == Some(GeoLevel::Village)
    }
}

#[derive(Debug, Clone)]
struct Named {
    code: String,
    name: Option<String>,
}

/// Counts of rows that did not make it into the dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeographyDiagnostics {
    pub missing_codes: usize,
    pub duplicates_skipped: usize,
    pub orphaned_districts: usize,
    pub orphaned_subdistricts: usize,
    pub orphaned_villages: usize,
    pub containment_violations: usize,
}

impl GeographyDiagnostics {
    pub fn dropped(&self) -> usize {
        self.orphaned_districts
            + self.orphaned_subdistricts
            + self.orphaned_villages
            + self.containment_violations
    }
}

#[derive(Debug, Clone)]
pub struct GeographyDimension {
    pub nodes: Vec<GeographyNode>,
    pub diagnostics: GeographyDiagnostics,
}

impl GeographyDimension {
    pub fn count_at(&self, level: GeoLevel) -> usize {
        self.nodes.iter().filter(|n| n.level() == Some(level)).count()
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct GeographyDimensionBuilder<'a> {
    refs: &'a ReferenceTables,
}

/// Accepted node plus the code of the parent it hangs under.
struct Accepted {
    node: Named,
    parent_code: String,
}

impl<'a> GeographyDimensionBuilder<'a> {
    pub fn new(refs: &'a ReferenceTables) -> Self {
        Self { refs }
    }

    /// Build the dimension. Deterministic: same reference tables, same keys.
    pub fn build(&self) -> GeographyDimension {
        let mut diag = GeographyDiagnostics::default();
        let mut nodes = Vec::new();
        let mut next_key = 1u32;
        let mut emit = |chain: &[&Named]| {
            nodes.push(GeographyNode::from_chain(next_key, chain));
            next_key += 1;
        };

        // Level 1: provinces, one row per code
        let mut provinces: HashMap<String, Named> = HashMap::new();
        let mut province_codes_by_id: HashMap<i64, String> = HashMap::new();
        for p in &self.refs.provinces {
            let Some(code) = p.code.clone() else {
                diag.missing_codes += 1;
                continue;
            };
            if provinces.contains_key(&code) {
                diag.duplicates_skipped += 1;
                continue;
            }
            if let Some(id) = p.province_id {
                province_codes_by_id.entry(id).or_insert_with(|| code.clone());
            }
            let named = Named {
                code: code.clone(),
                name: p.name.clone(),
            };
            emit(&[&named]);
            provinces.insert(code, named);
        }

        // Level 2: districts, dedup on (province, district)
        let mut districts: HashMap<String, Accepted> = HashMap::new();
        let mut district_codes_by_id: HashMap<i64, String> = HashMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for d in &self.refs.districts {
            let Some(code) = d.code.clone() else {
                diag.missing_codes += 1;
                continue;
            };
            let parent = resolve_parent(
                d.province_code.as_deref(),
                d.province_id,
                &province_codes_by_id,
                &code,
            );
            let Some(province) = parent.as_ref().and_then(|c| provinces.get(c)) else {
                diag.orphaned_districts += 1;
                continue;
            };
            if !is_contained(&code, &province.code) {
                diag.containment_violations += 1;
                continue;
            }
            if !seen.insert((province.code.clone(), code.clone())) {
                diag.duplicates_skipped += 1;
                continue;
            }
            if let Some(id) = d.district_id {
                district_codes_by_id.entry(id).or_insert_with(|| code.clone());
            }
            let named = Named {
                code: code.clone(),
                name: d.name.clone(),
            };
            emit(&[province, &named]);
            districts.entry(code).or_insert(Accepted {
                node: named,
                parent_code: province.code.clone(),
            });
        }

        // Level 3: subdistricts, dedup on (district, subdistrict)
        let mut subdistricts: HashMap<String, Accepted> = HashMap::new();
        let mut subdistrict_codes_by_id: HashMap<i64, String> = HashMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for s in &self.refs.subdistricts {
            let Some(code) = s.code.clone() else {
                diag.missing_codes += 1;
                continue;
            };
            let parent = resolve_parent(
                s.district_code.as_deref(),
                s.district_id,
                &district_codes_by_id,
                &code,
            );
            let Some(district) = parent.as_ref().and_then(|c| districts.get(c)) else {
                diag.orphaned_subdistricts += 1;
                continue;
            };
            if !is_contained(&code, &district.node.code) {
                diag.containment_violations += 1;
                continue;
            }
            if !seen.insert((district.node.code.clone(), code.clone())) {
                diag.duplicates_skipped += 1;
                continue;
            }
            if let Some(id) = s.subdistrict_id {
                subdistrict_codes_by_id.entry(id).or_insert_with(|| code.clone());
            }
            let province = &provinces[&district.parent_code];
            let named = Named {
                code: code.clone(),
                name: s.name.clone(),
            };
            emit(&[province, &district.node, &named]);
            subdistricts.entry(code).or_insert(Accepted {
                node: named,
                parent_code: district.node.code.clone(),
            });
        }

        // Level 4: villages, dedup on own code only. Repeated codes with
        // different internal ids are pooled later by the identity resolver.
        let mut seen: HashSet<String> = HashSet::new();
        for v in &self.refs.villages {
            let Some(code) = v.code.clone() else {
                diag.missing_codes += 1;
                continue;
            };
            if seen.contains(&code) {
                diag.duplicates_skipped += 1;
                continue;
            }
            let parent = resolve_parent(
                v.subdistrict_code.as_deref(),
                v.subdistrict_id,
                &subdistrict_codes_by_id,
                &code,
            );
            let Some(subdistrict) = parent.as_ref().and_then(|c| subdistricts.get(c)) else {
                diag.orphaned_villages += 1;
                continue;
            };
            if !is_contained(&code, &subdistrict.node.code) {
                diag.containment_violations += 1;
                continue;
            }
            seen.insert(code.clone());
            let district = &districts[&subdistrict.parent_code];
            let province = &provinces[&district.parent_code];
            let named = Named {
                code,
                name: v.name.clone(),
            };
            emit(&[province, &district.node, &subdistrict.node, &named]);
        }

        let dimension = GeographyDimension { nodes, diagnostics: diag };

        info!(
            provinces = dimension.count_at(GeoLevel::Province),
            districts = dimension.count_at(GeoLevel::District),
            subdistricts = dimension.count_at(GeoLevel::Subdistrict),
            villages = dimension.count_at(GeoLevel::Village),
            "built geography dimension"
        );
        if dimension.diagnostics.dropped() > 0 {
            warn!(diagnostics = ?dimension.diagnostics, "geography rows dropped");
        }

        dimension
    }
}

/// Parent code: explicit column, then parent internal id, then own code prefix.
fn resolve_parent(
    explicit: Option<&str>,
    parent_id: Option<i64>,
    codes_by_id: &HashMap<i64, String>,
    own_code: &str,
) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| parent_id.and_then(|id| codes_by_id.get(&id).cloned()))
        .or_else(|| own_code.rsplit_once('.').map(|(prefix, _)| prefix.to_string()))
}

fn is_contained(code: &str, parent_code: &str) -> bool {
    code.strip_prefix(parent_code)
        .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
}

// =============================================================================
// Persistence
// =============================================================================

pub fn write_dimension(path: &Path, nodes: &[GeographyNode]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for node in nodes {
        writer.serialize(node)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_dimension(path: &Path) -> Result<Vec<GeographyNode>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open geography dimension {}", path.display()))?;
    let mut nodes = Vec::new();
    for row in reader.deserialize::<GeographyNode>() {
        nodes.push(row.with_context(|| format!("Invalid row in {}", path.display()))?);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn province(id: i64, code: &str, name: &str) -> ProvinceRef {
        ProvinceRef {
            province_id: Some(id),
            code: Some(code.into()),
            name: Some(name.into()),
        }
    }

    fn district(id: i64, code: &str, parent: &str) -> DistrictRef {
        DistrictRef {
            district_id: Some(id),
            code: Some(code.into()),
            name: Some(format!("District {code}")),
            province_code: Some(parent.into()),
            province_id: None,
        }
    }

    fn subdistrict(id: i64, code: &str, parent: &str) -> SubdistrictRef {
        SubdistrictRef {
            subdistrict_id: Some(id),
            code: Some(code.into()),
            name: Some(format!("Subdistrict {code}")),
            district_code: Some(parent.into()),
            district_id: None,
        }
    }

    fn village(id: i64, code: &str, parent: &str) -> VillageRef {
        VillageRef {
            village_id: Some(id),
            code: Some(code.into()),
            name: Some(format!("Village {code}")),
            subdistrict_code: Some(parent.into()),
            ..Default::default()
        }
    }

    fn sample_refs() -> ReferenceTables {
        ReferenceTables {
            provinces: vec![province(1, "11", "Aceh"), province(2, "12", "Sumatera Utara")],
            districts: vec![
                district(10, "11.01", "11"),
                district(11, "11.02", "11"),
                district(20, "12.01", "12"),
            ],
            subdistricts: vec![
                subdistrict(100, "11.01.01", "11.01"),
                subdistrict(200, "12.01.01", "12.01"),
            ],
            villages: vec![
                village(1000, "11.01.01.2001", "11.01.01"),
                village(1001, "11.01.01.2002", "11.01.01"),
                village(2000, "12.01.01.2001", "12.01.01"),
            ],
        }
    }

    // -------------------------------------------------------------------------
    // SHAPE AND ORDERING
    // -------------------------------------------------------------------------

    #[test]
    fn test_level_counts() {
        let dim = GeographyDimensionBuilder::new(&sample_refs()).build();
        assert_eq!(dim.count_at(GeoLevel::Province), 2);
        assert_eq!(dim.count_at(GeoLevel::District), 3);
        assert_eq!(dim.count_at(GeoLevel::Subdistrict), 2);
        assert_eq!(dim.count_at(GeoLevel::Village), 3);
        assert_eq!(dim.diagnostics, GeographyDiagnostics::default());
    }

    #[test]
    fn test_keys_dense_and_level_ordered() {
        let dim = GeographyDimensionBuilder::new(&sample_refs()).build();
        for (i, node) in dim.nodes.iter().enumerate() {
            assert_eq!(node.geo_key, i as u32 + 1);
        }
        let depths: Vec<usize> = dim
            .nodes
            .iter()
            .map(|n| n.level().unwrap().depth())
            .collect();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_populated_pairs_match_depth() {
        let dim = GeographyDimensionBuilder::new(&sample_refs()).build();
        for node in &dim.nodes {
            let depth = node.level().unwrap().depth();
            let codes = GeoLevel::ALL.iter().filter(|&&l| node.code(l).is_some()).count();
            let names = GeoLevel::ALL.iter().filter(|&&l| node.name(l).is_some()).count();
            assert_eq!(codes, depth, "node {}", node.geo_key);
            assert_eq!(names, depth, "node {}", node.geo_key);
            for level in GeoLevel::ALL.iter().skip(depth) {
                assert!(node.code(*level).is_none());
                assert!(node.name(*level).is_none());
            }
        }
    }

    #[test]
    fn test_village_row_carries_ancestors() {
        let dim = GeographyDimensionBuilder::new(&sample_refs()).build();
        let v = dim
            .nodes
            .iter()
            .find(|n| n.village_code.as_deref() == Some("12.01.01.2001"))
            .unwrap();
        assert_eq!(v.province_code.as_deref(), Some("12"));
        assert_eq!(v.province_name.as_deref(), Some("Sumatera Utara"));
        assert_eq!(v.district_code.as_deref(), Some("12.01"));
        assert_eq!(v.subdistrict_code.as_deref(), Some("12.01.01"));
        assert!(v.is_village());
    }

    // -------------------------------------------------------------------------
    // DEDUP AND DROPS
    // -------------------------------------------------------------------------

    #[test]
    fn test_orphans_dropped_and_counted() {
        let mut refs = sample_refs();
        refs.districts.push(district(30, "99.01", "99"));
        refs.subdistricts.push(subdistrict(300, "11.09.01", "11.09"));
        refs.villages.push(village(3000, "11.09.01.2001", "11.09.01"));

        let dim = GeographyDimensionBuilder::new(&refs).build();
        assert_eq!(dim.diagnostics.orphaned_districts, 1);
        assert_eq!(dim.diagnostics.orphaned_subdistricts, 1);
        assert_eq!(dim.diagnostics.orphaned_villages, 1);
        assert_eq!(dim.count_at(GeoLevel::District), 3);
        assert_eq!(dim.count_at(GeoLevel::Village), 3);
    }

    #[test]
    fn test_duplicate_district_pair_emitted_once() {
        let mut refs = sample_refs();
        refs.districts.push(district(12, "11.01", "11"));
        let dim = GeographyDimensionBuilder::new(&refs).build();
        assert_eq!(dim.count_at(GeoLevel::District), 3);
        assert_eq!(dim.diagnostics.duplicates_skipped, 1);
    }

    #[test]
    fn test_duplicate_village_code_emitted_once() {
        let mut refs = sample_refs();
        refs.villages.push(village(1999, "11.01.01.2001", "11.01.01"));
        let dim = GeographyDimensionBuilder::new(&refs).build();
        let matches = dim
            .nodes
            .iter()
            .filter(|n| n.village_code.as_deref() == Some("11.01.01.2001"))
            .count();
        assert_eq!(matches, 1);
    }

    #[test]
    fn test_containment_violation_dropped() {
        let mut refs = sample_refs();
        // Declares 11.01.01 as parent but the code lives under 12
        refs.villages.push(village(4000, "12.05.05.2001", "11.01.01"));
        let dim = GeographyDimensionBuilder::new(&refs).build();
        assert_eq!(dim.diagnostics.containment_violations, 1);
        assert_eq!(dim.count_at(GeoLevel::Village), 3);
    }

    #[test]
    fn test_parent_from_internal_id() {
        let mut refs = sample_refs();
        refs.subdistricts.push(SubdistrictRef {
            subdistrict_id: Some(101),
            code: Some("11.02.01".into()),
            name: Some("By id".into()),
            district_code: None,
            district_id: Some(11),
        });
        let dim = GeographyDimensionBuilder::new(&refs).build();
        assert_eq!(dim.count_at(GeoLevel::Subdistrict), 3);
    }

    #[test]
    fn test_parent_from_code_prefix() {
        let mut refs = sample_refs();
        refs.villages.push(VillageRef {
            village_id: Some(1002),
            code: Some("11.01.01.2003".into()),
            name: Some("Prefix only".into()),
            ..Default::default()
        });
        let dim = GeographyDimensionBuilder::new(&refs).build();
        assert_eq!(dim.count_at(GeoLevel::Village), 4);
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained("11.01", "11"));
        assert!(!is_contained("110.01", "11"));
        assert!(!is_contained("11.", "11"));
        assert!(!is_contained("11", "11"));
    }

    // -------------------------------------------------------------------------
    // PERSISTENCE
    // -------------------------------------------------------------------------

    #[test]
    fn test_write_then_read_keeps_nulls() {
        let dim = GeographyDimensionBuilder::new(&sample_refs()).build();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DIM_GEOGRAPHY.csv");
        write_dimension(&path, &dim.nodes).unwrap();

        let loaded = read_dimension(&path).unwrap();
        assert_eq!(loaded, dim.nodes);
        assert!(loaded[0].district_code.is_none());

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(
            "geo_key,province_code,province_name,district_code,district_name,\
             subdistrict_code,subdistrict_name,village_code,village_name"
        ));
    }
}

//! Identity resolver - dotted codes ↔ internal integer ids
//!
//! The dimension tables speak in hierarchical codes (`11.05.07.2001`); the
//! entity tables reference integer ids (`villageId = 93412`). Reference data
//! can repeat a code under several ids, so a code resolves to a *set* and
//! every consumer scopes over the union of that set.

use dimensions::geography::{GeoLevel, ReferenceTables};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

static NO_IDS: BTreeSet<i64> = BTreeSet::new();

#[derive(Debug, Default)]
struct LevelMap {
    ids_by_code: HashMap<String, BTreeSet<i64>>,
    code_by_id: HashMap<i64, String>,
    conflicts: usize,
}

impl LevelMap {
    fn insert(&mut self, id: Option<i64>, code: Option<&String>) {
        let (Some(id), Some(code)) = (id, code) else {
            return;
        };
        match self.code_by_id.get(&id) {
            Some(existing) if existing != code => {
                self.conflicts += 1;
                return;
            }
            Some(_) => {}
            None => {
                self.code_by_id.insert(id, code.clone());
            }
        }
        self.ids_by_code.entry(code.clone()).or_default().insert(id);
    }
}

/// Immutable code/id lookups for all four geography levels.
#[derive(Debug)]
pub struct IdentityResolver {
    levels: [LevelMap; 4],
}

impl IdentityResolver {
    pub fn from_reference(refs: &ReferenceTables) -> Self {
        let mut levels: [LevelMap; 4] = Default::default();

        let [provinces, districts, subdistricts, villages] = &mut levels;
        for p in &refs.provinces {
            provinces.insert(p.province_id, p.code.as_ref());
        }
        for d in &refs.districts {
            districts.insert(d.district_id, d.code.as_ref());
        }
        for s in &refs.subdistricts {
            subdistricts.insert(s.subdistrict_id, s.code.as_ref());
        }
        for v in &refs.villages {
            villages.insert(v.village_id, v.code.as_ref());
        }

        let resolver = Self { levels };
        for level in GeoLevel::ALL {
            let map = resolver.level(level);
            info!(
                level = %level,
                codes = map.ids_by_code.len(),
                ids = map.code_by_id.len(),
                "identity map built"
            );
            if map.conflicts > 0 {
                warn!(level = %level, conflicts = map.conflicts, "ids seen with more than one code");
            }
        }
        resolver
    }

    fn level(&self, level: GeoLevel) -> &LevelMap {
        &self.levels[level.depth() - 1]
    }

    /// All internal ids sharing `code`; empty when the code is unknown.
    pub fn ids(&self, level: GeoLevel, code: &str) -> &BTreeSet<i64> {
        self.level(level).ids_by_code.get(code).unwrap_or(&NO_IDS)
    }

    /// Like [`ids`](Self::ids) for an optional code.
    pub fn ids_opt(&self, level: GeoLevel, code: Option<&str>) -> &BTreeSet<i64> {
        code.map_or(&NO_IDS, |c| self.ids(level, c))
    }

    pub fn code(&self, level: GeoLevel, id: i64) -> Option<&str> {
        self.level(level).code_by_id.get(&id).map(String::as_str)
    }

    /// Codes that resolve to more than one id.
    pub fn duplicate_codes(&self, level: GeoLevel) -> usize {
        self.level(level)
            .ids_by_code
            .values()
            .filter(|ids| ids.len() > 1)
            .count()
    }

    /// Ids that appeared under a second, different code (first code kept).
    pub fn conflicts(&self, level: GeoLevel) -> usize {
        self.level(level).conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimensions::geography::{ProvinceRef, VillageRef};

    fn village(id: i64, code: &str) -> VillageRef {
        VillageRef {
            village_id: Some(id),
            code: Some(code.into()),
            ..Default::default()
        }
    }

    fn refs() -> ReferenceTables {
        ReferenceTables {
            provinces: vec![ProvinceRef {
                province_id: Some(11),
                code: Some("11".into()),
                name: Some("Aceh".into()),
            }],
            villages: vec![
                village(1, "11.01.01.2001"),
                village(2, "11.01.01.2002"),
                // same code, second internal id
                village(3, "11.01.01.2001"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_code_resolves_to_union() {
        let r = IdentityResolver::from_reference(&refs());
        let ids: Vec<i64> = r.ids(GeoLevel::Village, "11.01.01.2001").iter().copied().collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(r.duplicate_codes(GeoLevel::Village), 1);
    }

    #[test]
    fn test_reverse_lookup() {
        let r = IdentityResolver::from_reference(&refs());
        assert_eq!(r.code(GeoLevel::Village, 3), Some("11.01.01.2001"));
        assert_eq!(r.code(GeoLevel::Province, 11), Some("11"));
        assert_eq!(r.code(GeoLevel::Village, 99), None);
    }

    #[test]
    fn test_unknown_code_is_empty() {
        let r = IdentityResolver::from_reference(&refs());
        assert!(r.ids(GeoLevel::Village, "99.99.99.9999").is_empty());
        assert!(r.ids_opt(GeoLevel::District, None).is_empty());
    }

    #[test]
    fn test_levels_are_independent() {
        let r = IdentityResolver::from_reference(&refs());
        assert!(r.ids(GeoLevel::Village, "11").is_empty());
        assert_eq!(r.ids(GeoLevel::Province, "11").len(), 1);
    }

    #[test]
    fn test_conflicting_id_keeps_first_code() {
        let mut tables = refs();
        tables.villages.push(village(2, "11.01.01.2999"));
        let r = IdentityResolver::from_reference(&tables);
        assert_eq!(r.code(GeoLevel::Village, 2), Some("11.01.01.2002"));
        assert!(r.ids(GeoLevel::Village, "11.01.01.2999").is_empty());
        assert_eq!(r.conflicts(GeoLevel::Village), 1);
    }

    #[test]
    fn test_rows_without_id_or_code_ignored() {
        let mut tables = refs();
        tables.villages.push(VillageRef {
            code: Some("11.01.01.2003".into()),
            ..Default::default()
        });
        let r = IdentityResolver::from_reference(&tables);
        assert!(r.ids(GeoLevel::Village, "11.01.01.2003").is_empty());
    }
}

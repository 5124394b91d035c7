//! Board and supervisor measures.
//!
//! The role of a management row is read from the column chosen for the
//! whole table (see [`RoleColumn`](crate::sources::RoleColumn)).

use super::{is, share, Measure, Measures};
use crate::engine::VillageScope;
use crate::global::GlobalAggregates;
use crate::sources::Management;
use std::collections::{HashMap, HashSet};

/// Roles that make up a complete board.
pub const BOARD_ROLES: [&str; 3] = ["Ketua", "Sekretaris", "Bendahara"];
pub const SUPERVISOR_ROLE: &str = "Pengawas";

pub fn calculate(scope: &VillageScope<'_>, _global: &GlobalAggregates) -> Measures {
    let column = scope.role_column;
    let board: Vec<&Management> = scope
        .management
        .iter()
        .copied()
        .filter(|row| row.role_in(column).is_some_and(|r| BOARD_ROLES.contains(&r)))
        .collect();
    let supervisors = scope
        .management
        .iter()
        .filter(|row| row.role_in(column) == Some(SUPERVISOR_ROLE))
        .count();

    let mut m = Measures::new();
    m.set_count(Measure::TotalPengurusKoperasi, board.len());
    m.set_count(Measure::TotalPengawasKoperasi, supervisors);
    m.set(
        Measure::RasioGenderPengurus,
        share(&board, |row| is(&row.gender, "Perempuan")),
    );

    let mut roles_by_coop: HashMap<i64, HashSet<&str>> = HashMap::new();
    for row in &board {
        if let Some(r) = row.role_in(column) {
            roles_by_coop.entry(row.cooperative_id).or_default().insert(r);
        }
    }
    m.set(
        Measure::RatioStrukturJabatanLengkap,
        share(&scope.cooperatives, |c| {
            roles_by_coop
                .get(&c.cooperative_id)
                .is_some_and(|roles| roles.len() == BOARD_ROLES.len())
        }),
    );
    m
}

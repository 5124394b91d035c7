//! Raw entity tables consumed by the fact pipeline
//!
//! Every record type tolerates missing columns: absent text reads as `None`,
//! absent numbers as 0. Only the keys a row cannot live without (the owning
//! cooperative id, the category id of an assignment) are required; rows
//! lacking them are skipped at load time.

use chrono::NaiveDateTime;
use dimensions::geography::ReferenceTables;
use dimensions::table::{lenient, Result, Table};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

// =============================================================================
// Entity records
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cooperative {
    #[serde(alias = "cooperativeId", deserialize_with = "lenient::id")]
    pub cooperative_id: i64,
    #[serde(default, rename = "provinceId", alias = "province_id", deserialize_with = "lenient::opt_id")]
    pub province_id: Option<i64>,
    #[serde(default, rename = "districtId", alias = "district_id", deserialize_with = "lenient::opt_id")]
    pub district_id: Option<i64>,
    #[serde(default, rename = "subdistrictId", alias = "subdistrict_id", deserialize_with = "lenient::opt_id")]
    pub subdistrict_id: Option<i64>,
    #[serde(default, rename = "villageId", alias = "village_id", deserialize_with = "lenient::opt_id")]
    pub village_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub capital: f64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub registration_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub filling_method: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub longitude: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub latitude: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Member {
    #[serde(rename = "cooperativeId", alias = "cooperative_id", deserialize_with = "lenient::id")]
    pub cooperative_id: i64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub principal_saving: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub mandatory_saving: f64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub bi_checking_verification: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Management {
    #[serde(rename = "cooperativeId", alias = "cooperative_id", deserialize_with = "lenient::id")]
    pub cooperative_id: i64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub gender: Option<String>,
}

/// Which management column names the board role.
///
/// Chosen once per table: `role` when the header exists, otherwise
/// `position`. Rows are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleColumn {
    Role,
    Position,
    #[default]
    Missing,
}

impl RoleColumn {
    pub fn detect(table: &Table) -> Self {
        if table.has_column("role") {
            RoleColumn::Role
        } else if table.has_column("position") {
            RoleColumn::Position
        } else {
            RoleColumn::Missing
        }
    }
}

impl Management {
    pub fn role_in(&self, column: RoleColumn) -> Option<&str> {
        match column {
            RoleColumn::Role => self.role.as_deref(),
            RoleColumn::Position => self.position.as_deref(),
            RoleColumn::Missing => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outlet {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub cooperative_outlet_id: Option<i64>,
    #[serde(rename = "cooperativeId", alias = "cooperative_id", deserialize_with = "lenient::id")]
    pub cooperative_id: i64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub primary_image: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub cooperative_type_id: Option<String>,
}

/// One business-classification (KLU) assignment of a cooperative.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryAssignment {
    #[serde(rename = "cooperativeId", alias = "cooperative_id", deserialize_with = "lenient::id")]
    pub cooperative_id: i64,
    #[serde(rename = "kluId", alias = "klu_id", deserialize_with = "lenient::id")]
    pub category_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Partnership {
    #[serde(rename = "cooperativeId", alias = "cooperative_id", deserialize_with = "lenient::id")]
    pub cooperative_id: i64,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub business_partner_service_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<NaiveDateTime>,
}

/// Village service point (UPKDK).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicePoint {
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub upkdk_id: Option<i64>,
    #[serde(default, rename = "villageId", alias = "village_id", deserialize_with = "lenient::opt_id")]
    pub village_id: Option<i64>,
    #[serde(default, rename = "type", deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub internet_access: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub building_condition: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub water_electricity: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub longitude: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub latitude: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Domain {
    #[serde(default, deserialize_with = "lenient::text")]
    pub verification_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VillageMerger {
    #[serde(default, alias = "villageId", deserialize_with = "lenient::opt_id")]
    pub village_id: Option<i64>,
}

/// Category reference row (dim_klu).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryRef {
    #[serde(rename = "kluId", alias = "klu_id", deserialize_with = "lenient::id")]
    pub category_id: i64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sector: Option<String>,
}

// =============================================================================
// Loading
// =============================================================================

/// Every raw table the fact run needs, loaded once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub cooperatives: Vec<Cooperative>,
    pub members: Vec<Member>,
    pub management: Vec<Management>,
    pub role_column: RoleColumn,
    pub outlets: Vec<Outlet>,
    pub categories: Vec<CategoryAssignment>,
    pub partnerships: Vec<Partnership>,
    pub service_points: Vec<ServicePoint>,
    pub domains: Vec<Domain>,
    pub mergers: Vec<VillageMerger>,
    pub category_refs: Vec<CategoryRef>,
    pub reference: ReferenceTables,
}

impl SourceTables {
    /// Load all required tables from `dir`. The first missing file aborts.
    pub fn load(dir: &Path) -> Result<Self> {
        let management = Table::load(dir, "cooperative_management")?;
        let role_column = RoleColumn::detect(&management);
        info!(?role_column, "management role column");

        let tables = Self {
            cooperatives: Table::load(dir, "cooperative")?.records(),
            members: Table::load(dir, "cooperative_members")?.records(),
            management: management.records(),
            role_column,
            outlets: Table::load(dir, "cooperative_outlets")?.records(),
            categories: Table::load(dir, "cooperative_klus")?.records(),
            partnerships: Table::load(dir, "business_partnership_applications")?.records(),
            service_points: Table::load(dir, "upkdk")?.records(),
            domains: Table::load(dir, "domains")?.records(),
            mergers: Table::load(dir, "cooperative_village_mergers")?.records(),
            category_refs: Table::load(dir, "dim_klu")?.records(),
            reference: ReferenceTables::load(dir)?,
        };

        info!(
            cooperatives = tables.cooperatives.len(),
            members = tables.members.len(),
            outlets = tables.outlets.len(),
            partnerships = tables.partnerships.len(),
            service_points = tables.service_points.len(),
            "source tables loaded"
        );
        Ok(tables)
    }
}

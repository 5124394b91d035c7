//! End-to-end fact runs over a small on-disk dataset.

use dimensions::geography::{self, GeographyDimensionBuilder, ReferenceTables};
use dimensions::period::{self, PeriodDimensionBuilder};
use dimensions::{GEOGRAPHY_FILE, PERIOD_FILE};
use facts::kpi::Measure;
use facts::output::Precision;
use facts::{pipeline, Config};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const TABLES: &[(&str, &str)] = &[
    ("provinces", "province_id,code,name\n1,11,Aceh\n2,12,Sumatera Utara\n"),
    (
        "districts",
        "district_id,code,name,province_code\n10,11.01,Aceh Besar,11\n20,12.01,Medan,12\n",
    ),
    (
        "subdistricts",
        "subdistrict_id,code,name,district_code\n100,11.01.01,Lhoknga,11.01\n200,12.01.01,Medan Kota,12.01\n",
    ),
    (
        "villages",
        "village_id,code,name,subdistrict_code,total_u17,total_a17\n\
         1000,11.01.01.2001,Mon Ikeun,11.01.01,300,500\n\
         1001,11.01.01.2002,Lamkruet,11.01.01,50,50\n\
         1999,11.01.01.2001,Mon Ikeun,11.01.01,100,100\n\
         2000,12.01.01.2001,Pasar Baru,12.01.01,400,600\n",
    ),
    (
        "cooperative",
        "cooperative_id,provinceId,districtId,subdistrictId,villageId,capital,registration_type,filling_method\n\
         10,1,10,100,1000,1000000,Pendaftaran Baru,Mandiri\n\
         11,1,10,100,1999,3000000,Perubahan,Pendamping\n\
         12,2,20,200,2000,500000,Pendaftaran Baru,Mandiri\n",
    ),
    (
        "cooperative_members",
        "cooperativeId,gender,principal_saving,mandatory_saving,bi_checking_verification\n\
         10,PEREMPUAN,100000,10000,Lancar\n\
         10,LAKI-LAKI,100000,10000,Macet\n\
         11,PEREMPUAN,50000,5000,Lancar\n\
         12,LAKI-LAKI,75000,7500,Lancar\n",
    ),
    (
        "cooperative_management",
        "cooperativeId,role,gender\n\
         10,Ketua,Perempuan\n10,Sekretaris,Laki-laki\n10,Bendahara,Perempuan\n10,Pengawas,Laki-laki\n\
         12,Ketua,Laki-laki\n",
    ),
    (
        "cooperative_outlets",
        "cooperative_outlet_id,cooperativeId,primary_image,cooperative_type_id\n\
         501,10,img/501.jpg,3\n502,11,,3\n601,12,img/601.jpg,1\n",
    ),
    ("cooperative_klus", "cooperativeId,kluId\n10,47111\n11,47111\n11,1061\n12,1061\n"),
    (
        "business_partnership_applications",
        "cooperativeId,business_partner_service_id,status,created_at,updated_at\n\
         10,3,Verified,2024-01-05 08:00:00,2024-01-06 08:00:00\n\
         11,4,Requested,2024-02-05 08:00:00,2024-02-05 20:00:00\n\
         12,3,Verified,2024-02-10 08:00:00,2024-02-11 10:00:00\n",
    ),
    (
        "upkdk",
        "upkdk_id,villageId,type,internet_access,building_condition,water_electricity\n\
         7,1000,Gudang,Ada,Baik,Ya\n8,2000,Kantor,Tidak Ada,Rusak,Tidak\n",
    ),
    ("domains", "verification_status\nVerified\nPending\n"),
    ("cooperative_village_mergers", "village_id\n1999\n"),
    ("dim_klu", "kluId,sector\n47111,Perdagangan\n1061,Industri\n"),
];

struct Fixture {
    _root: TempDir,
    config: Config,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data_source");
    let result = root.path().join("result");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(&result).unwrap();

    for (stem, content) in TABLES {
        fs::write(data.join(format!("{stem}.csv")), content).unwrap();
    }

    let refs = ReferenceTables::load(&data).unwrap();
    let geo = GeographyDimensionBuilder::new(&refs).build();
    geography::write_dimension(&result.join(GEOGRAPHY_FILE), &geo.nodes).unwrap();
    let periods = PeriodDimensionBuilder::new(2024, 2024).unwrap().build().unwrap();
    period::write_dimension(&result.join(PERIOD_FILE), &periods).unwrap();

    Fixture {
        config: Config::new(data, result),
        _root: root,
    }
}

fn fact_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("FACT_KPI_V"))
        .collect();
    names.sort();
    names
}

fn column(header: &csv::StringRecord, name: &str) -> usize {
    header.iter().position(|h| h == name).unwrap()
}

// -----------------------------------------------------------------------------
// FULL RUN
// -----------------------------------------------------------------------------

#[test]
fn test_run_emits_one_row_per_village_with_cooperatives() {
    let f = fixture();
    let summary = pipeline::run(&f.config).unwrap();

    assert_eq!(summary.report.villages_visited, 3);
    assert_eq!(summary.report.rows, 2);
    assert_eq!(summary.report.skipped_without_cooperatives, 1);
    assert_eq!(summary.report.skipped_unresolved, 0);
    assert_eq!(summary.duplicate_village_codes, 1);
    assert_eq!(summary.id_conflicts, 0);
    assert_eq!(summary.total(Measure::TotalKoperasiTerdaftar), 3.0);
    assert_eq!(summary.total(Measure::TotalAnggotaKoperasi), 4.0);
}

#[test]
fn test_duplicate_village_code_pools_cooperatives() {
    let f = fixture();
    let summary = pipeline::run(&f.config).unwrap();
    let out = summary.output.as_ref().unwrap();

    let mut reader = csv::Reader::from_path(&out.csv_path).unwrap();
    let header = reader.headers().unwrap().clone();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);

    // Village 11.01.01.2001 appears once with both internal ids' cooperatives
    let first = &rows[0];
    assert_eq!(&first[column(&header, "TotalKoperasiTerdaftar")], "2");
    assert_eq!(&first[column(&header, "TotalGeraiKoperasi")], "2");
    assert_eq!(&first[column(&header, "outlet_id")], "501");
    assert_eq!(&first[column(&header, "klu_id")], "47111");
    assert_eq!(&first[column(&header, "upkdk_id")], "7");
    assert_eq!(&first[column(&header, "date_key")], summary.date_key.to_string());
}

#[test]
fn test_percentages_stay_in_range() {
    let f = fixture();
    let summary = pipeline::run(&f.config).unwrap();
    let out = summary.output.unwrap();

    let mut reader = csv::Reader::from_path(&out.csv_path).unwrap();
    let header = reader.headers().unwrap().clone();
    let percentage_columns: Vec<usize> = Measure::ALL
        .iter()
        .filter(|m| m.precision() == Precision::Percentage)
        .map(|m| column(&header, m.column()))
        .collect();
    assert!(!percentage_columns.is_empty());

    for record in reader.records() {
        let record = record.unwrap();
        for &i in &percentage_columns {
            let v: f64 = record[i].parse().unwrap();
            assert!((0.0..=100.0).contains(&v), "{} = {v}", &header[i]);
        }
    }
}

// -----------------------------------------------------------------------------
// VERSIONING AND MODES
// -----------------------------------------------------------------------------

#[test]
fn test_rerun_writes_next_version_with_same_content() {
    let f = fixture();
    let first = pipeline::run(&f.config).unwrap();
    let second = pipeline::run(&f.config).unwrap();

    let a = first.output.unwrap();
    let b = second.output.unwrap();
    assert_eq!(a.version, 1);
    assert_eq!(b.version, 2);
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(first.rows, second.rows);
    assert_eq!(
        fact_files(&f.config.result_dir),
        vec![
            "FACT_KPI_V001.csv",
            "FACT_KPI_V001.json",
            "FACT_KPI_V002.csv",
            "FACT_KPI_V002.json"
        ]
    );
}

#[test]
fn test_dry_run_writes_nothing() {
    let mut f = fixture();
    f.config.dry_run = true;
    let summary = pipeline::run(&f.config).unwrap();
    assert!(summary.output.is_none());
    assert_eq!(summary.rows.len(), 2);
    assert!(fact_files(&f.config.result_dir).is_empty());
}

#[test]
fn test_village_limit() {
    let mut f = fixture();
    f.config.village_limit = Some(1);
    let summary = pipeline::run(&f.config).unwrap();
    assert_eq!(summary.report.villages_visited, 1);
    assert_eq!(summary.rows.len(), 1);
}

// -----------------------------------------------------------------------------
// FAILURES
// -----------------------------------------------------------------------------

#[test]
fn test_missing_source_table_aborts_without_output() {
    let f = fixture();
    fs::remove_file(f.config.data_dir.join("upkdk.csv")).unwrap();

    let err = pipeline::run(&f.config).unwrap_err();
    assert!(format!("{err:#}").contains("upkdk"));
    assert!(fact_files(&f.config.result_dir).is_empty());
}

#[test]
fn test_missing_dimension_aborts_without_output() {
    let f = fixture();
    fs::remove_file(f.config.result_dir.join(PERIOD_FILE)).unwrap();

    assert!(pipeline::run(&f.config).is_err());
    assert!(fact_files(&f.config.result_dir).is_empty());
}

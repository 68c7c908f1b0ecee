//! End-to-end pipeline runs over synthetic claims files

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use medicaid_rollup::analytics::OutlierDirection;
use medicaid_rollup::prelude::*;
use medicaid_rollup::schema::OUTPUT_TABLES;
use medicaid_rollup::tables::{OutlierRow, ProcedureSummaryRow, ProviderSummaryRow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const HEADER: &str = "BILLING_PROVIDER_NPI_NUM,SERVICING_PROVIDER_NPI_NUM,HCPCS_CODE,CLAIM_FROM_MONTH,\
                      TOTAL_UNIQUE_BENEFICIARIES,TOTAL_CLAIMS,TOTAL_PAID";

struct Row {
    npi: String,
    code: String,
    month: String,
    beneficiaries: u64,
    claims: u64,
    paid: u64,
}

impl Row {
    fn new(npi: &str, code: &str, month: &str, beneficiaries: u64, claims: u64, paid: u64) -> Self {
        Self {
            npi: npi.to_string(),
            code: code.to_string(),
            month: month.to_string(),
            beneficiaries,
            claims,
            paid,
        }
    }
}

fn write_claims(dir: &Path, rows: &[Row]) -> PathBuf {
    let path = dir.join("claims.csv");
    let mut body = format!("{HEADER}\n");
    for r in rows {
        body.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            r.npi, r.npi, r.code, r.month, r.beneficiaries, r.claims, r.paid
        ));
    }
    fs::write(&path, body).unwrap();
    path
}

/// Deterministic synthetic input: 30 procedures, 60 providers, 12 months
fn synthetic_rows(count: usize) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(7);
    let codes: Vec<String> = (0..30)
        .map(|i| match i % 3 {
            0 => format!("J{:04}", 1000 + i),
            1 => format!("{}", 99201 + i),
            _ => format!("T{:04}", 1000 + i),
        })
        .collect();
    (0..count)
        .map(|_| {
            let npi = format!("{}", 1_000_000_000u64 + rng.random_range(0..60u64));
            let code = &codes[rng.random_range(0..codes.len())];
            let month = format!("2021-{:02}", rng.random_range(1..=12u32));
            let claims = rng.random_range(1..300u64);
            let beneficiaries = rng.random_range(1..=claims);
            let paid = claims * rng.random_range(5..400u64);
            Row::new(&npi, code, &month, beneficiaries, claims, paid)
        })
        .collect()
}

fn small_config() -> PipelineConfig {
    ConfigBuilder::new()
        .top_k(5, 20, 4)
        .procedure_monthly_limit(5)
        .providers_per_procedure(10)
        .progress(false)
        .build()
        .unwrap()
}

fn run_into(input: &Path, out: &Path, config: PipelineConfig) -> PipelineReport {
    PipelineBuilder::new()
        .input(input)
        .config(config)
        .output_dir(out)
        .build()
        .unwrap()
        .run()
        .unwrap()
}

fn read_table<T: serde::de::DeserializeOwned>(dir: &Path, file: &str) -> Vec<T> {
    let body = fs::read_to_string(dir.join(file)).unwrap();
    serde_json::from_str(&body).unwrap()
}

#[test]
fn test_every_table_file_is_written() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &synthetic_rows(500));
    let out = tmp.path().join("out");
    let report = run_into(&input, &out, small_config());

    assert_eq!(report.written.len(), OUTPUT_TABLES.len());
    for table in OUTPUT_TABLES.iter() {
        let body = fs::read_to_string(out.join(table.file_name)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(value.is_array(), "{} is not a JSON array", table.file_name);
    }

    // no provider directory, so no state rows
    assert_eq!(fs::read_to_string(out.join("state-summary.json")).unwrap().trim(), "[]");
    assert_eq!(fs::read_to_string(out.join("state-monthly.json")).unwrap().trim(), "[]");
    assert_eq!(fs::read_to_string(out.join("state-procedures.json")).unwrap().trim(), "[]");
}

#[test]
fn test_identical_input_gives_identical_files() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &synthetic_rows(2_000));
    let first = tmp.path().join("first");
    let second = tmp.path().join("second");
    run_into(&input, &first, small_config());
    run_into(&input, &second, small_config());

    for table in OUTPUT_TABLES.iter() {
        let a = fs::read(first.join(table.file_name)).unwrap();
        let b = fs::read(second.join(table.file_name)).unwrap();
        assert_eq!(a, b, "{} differs between runs", table.file_name);
    }
}

#[test]
fn test_monthly_totals_conserve_input() {
    let rows = synthetic_rows(1_500);
    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &rows);
    let (tables, _) = PipelineBuilder::new()
        .input(&input)
        .config(small_config())
        .build()
        .unwrap()
        .compute()
        .unwrap();

    let mut expected: BTreeMap<&str, (u64, u64, u64)> = BTreeMap::new();
    for r in &rows {
        let e = expected.entry(r.month.as_str()).or_default();
        e.0 += r.paid;
        e.1 += r.claims;
        e.2 += r.beneficiaries;
    }

    assert_eq!(tables.monthly_national.len(), expected.len());
    for row in &tables.monthly_national {
        let (paid, claims, beneficiaries) = expected[row.month.to_string().as_str()];
        assert_eq!(row.total_paid, paid as f64);
        assert_eq!(row.total_claims, claims);
        assert_eq!(row.total_beneficiaries, beneficiaries);
        assert_eq!(row.provider_count, None);
    }

    let all_paid: u64 = rows.iter().map(|r| r.paid).sum();
    let procedure_paid: f64 = tables.procedures.iter().map(|p| p.total_paid).sum();
    assert_eq!(procedure_paid, all_paid as f64);
}

#[test]
fn test_top_procedures_outrank_the_rest() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &synthetic_rows(2_000));
    let out = tmp.path().join("out");
    run_into(&input, &out, small_config());

    let procedures: Vec<ProcedureSummaryRow> = read_table(&out, "procedure-summary.json");
    let top: Vec<&ProcedureSummaryRow> = procedures.iter().filter(|p| p.median_cost_per_claim.is_some()).collect();
    let rest: Vec<&ProcedureSummaryRow> = procedures.iter().filter(|p| p.median_cost_per_claim.is_none()).collect();
    assert_eq!(top.len(), 5);
    assert!(!rest.is_empty());

    let floor = top.iter().map(|p| p.total_paid).fold(f64::INFINITY, f64::min);
    for p in &rest {
        assert!(p.total_paid <= floor, "{} outranks a top procedure", p.hcpcs_code);
        assert_eq!(p.provider_count, 0);
    }

    let monthly_codes: HashSet<String> = read_table::<serde_json::Value>(&out, "procedure-monthly.json")
        .into_iter()
        .filter_map(|row| row["hcpcsCode"].as_str().map(str::to_string))
        .collect();
    let top_codes: HashSet<String> = top.iter().map(|p| p.hcpcs_code.clone()).collect();
    assert_eq!(monthly_codes, top_codes);

    for row in read_table::<serde_json::Value>(&out, "provider-procedures.json") {
        if let Some(index) = row["costIndex"].as_f64() {
            assert!(index > 0.0);
        }
    }
}

#[test]
fn test_three_row_scenario() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(
        tmp.path(),
        &[
            Row::new("P1", "CODE_A", "2021-01", 5, 10, 1000),
            Row::new("P1", "CODE_A", "2021-08", 5, 10, 2000),
            Row::new("P2", "CODE_A", "2021-01", 2, 4, 50000),
        ],
    );
    let out = tmp.path().join("out");
    run_into(&input, &out, PipelineConfig { show_progress: false, ..Default::default() });

    let procedures: Vec<ProcedureSummaryRow> = read_table(&out, "procedure-summary.json");
    assert_eq!(procedures.len(), 1);
    assert_eq!(procedures[0].hcpcs_code, "CODE_A");
    assert_eq!(procedures[0].total_paid, 53000.0);
    assert_eq!(procedures[0].total_claims, 24);
    assert_eq!(procedures[0].total_beneficiaries, 12);
    assert_eq!(procedures[0].median_cost_per_claim, Some(200.0));
    assert_eq!(procedures[0].provider_count, 2);

    let providers: Vec<ProviderSummaryRow> = read_table(&out, "provider-summary.json");
    let p1 = providers.iter().find(|p| p.npi == "P1").unwrap();
    assert_eq!(p1.spending_growth_pct, Some(100.0));
    assert_eq!(p1.cost_per_claim_growth_pct, Some(100.0));
    assert_eq!(p1.volume_growth_pct, Some(0.0));
    let p2 = providers.iter().find(|p| p.npi == "P2").unwrap();
    assert_eq!(p2.top_procedure.as_deref(), Some("CODE_A"));

    let pairs: Vec<serde_json::Value> = read_table(&out, "provider-procedures.json");
    let p2_pair = pairs.iter().find(|r| r["npi"] == "P2").unwrap();
    assert_eq!(p2_pair["costIndex"].as_f64(), Some(62.5));

    let outliers: Vec<OutlierRow> = read_table(&out, "outliers.json");
    assert!(outliers.is_empty());
}

#[test]
fn test_growth_is_null_without_early_spend() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(
        tmp.path(),
        &[
            Row::new("LATE", "99213", "2021-09", 3, 5, 400),
            Row::new("LATE", "99213", "2021-10", 3, 5, 600),
            Row::new("BOTH", "99213", "2021-02", 3, 5, 500),
            Row::new("BOTH", "99213", "2021-11", 3, 5, 0),
        ],
    );
    let (tables, _) = PipelineBuilder::new()
        .input(&input)
        .config(small_config())
        .build()
        .unwrap()
        .compute()
        .unwrap();

    let late = tables.providers.iter().find(|p| p.npi == "LATE").unwrap();
    assert_eq!(late.spending_growth_pct, None);
    assert_eq!(late.cost_per_claim_growth_pct, None);
    assert_eq!(late.volume_growth_pct, None);

    let both = tables.providers.iter().find(|p| p.npi == "BOTH").unwrap();
    assert_eq!(both.spending_growth_pct, Some(-100.0));

    let json = serde_json::to_string(&tables.providers).unwrap();
    assert!(!json.contains("Infinity") && !json.contains("NaN"));
}

#[test]
fn test_outliers_respect_volume_gate() {
    let mut rows: Vec<Row> = (0..20)
        .map(|i| Row::new(&format!("N{i:02}"), "J9999", "2021-03", 50, 200, 2000))
        .collect();
    rows.push(Row::new("HIGH", "J9999", "2021-03", 80, 200, 10_000));
    rows.push(Row::new("LOW", "J9999", "2021-04", 900, 2_500, 10_000));
    rows.push(Row::new("FEWCLAIMS", "J9999", "2021-05", 10, 50, 50_000));
    rows.push(Row::new("SMALLPAID", "J9999", "2021-05", 60, 150, 9_000));

    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &rows);
    let out = tmp.path().join("out");
    run_into(&input, &out, small_config());

    let outliers: Vec<OutlierRow> = read_table(&out, "outliers.json");
    for o in &outliers {
        assert!(o.total_claims >= 100, "{} passed the claims gate", o.npi);
        assert!(o.total_paid >= 10_000.0, "{} passed the paid gate", o.npi);
    }

    let flagged: Vec<(&str, Option<OutlierDirection>)> =
        outliers.iter().map(|o| (o.npi.as_str(), o.direction)).collect();
    assert_eq!(
        flagged,
        vec![("HIGH", Some(OutlierDirection::High)), ("LOW", Some(OutlierDirection::Low))]
    );
    assert_eq!(outliers[0].procedure_median, Some(10.0));
    assert_eq!(outliers[0].cost_index, Some(5.0));
    assert_eq!(outliers[1].cost_index, Some(0.4));
}

#[test]
fn test_outliers_truncate_after_paid_sort() {
    let mut rows: Vec<Row> = (0..20)
        .map(|i| Row::new(&format!("N{i:02}"), "J9999", "2021-03", 50, 200, 2000))
        .collect();
    rows.push(Row::new("H2", "J9999", "2021-03", 80, 200, 30_000));
    rows.push(Row::new("H0", "J9999", "2021-03", 80, 200, 50_000));
    rows.push(Row::new("H1", "J9999", "2021-03", 80, 200, 40_000));

    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &rows);
    let config = ConfigBuilder::new()
        .top_k(5, 30, 4)
        .outlier_limit(2)
        .progress(false)
        .build()
        .unwrap();
    let out = tmp.path().join("out");
    run_into(&input, &out, config);

    let outliers: Vec<OutlierRow> = read_table(&out, "outliers.json");
    let kept: Vec<(&str, f64)> = outliers.iter().map(|o| (o.npi.as_str(), o.total_paid)).collect();
    assert_eq!(kept, vec![("H0", 50_000.0), ("H1", 40_000.0)]);
    assert!(outliers.iter().all(|o| o.direction == Some(OutlierDirection::High)));
}

#[test]
fn test_procedure_monthly_keeps_highest_ranked_codes() {
    let mut rows = Vec::new();
    for (rank, code) in ["A1", "A2", "A3", "A4"].iter().enumerate() {
        let paid = (4 - rank as u64) * 10_000;
        for month in ["2021-01", "2021-02"] {
            rows.push(Row::new(&format!("P{rank}"), code, month, 5, 20, paid));
            rows.push(Row::new("Q", code, month, 2, 10, paid / 10));
        }
    }
    // lowest ranked code seen first so ranking does not follow row order
    rows.reverse();

    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &rows);
    let config = ConfigBuilder::new()
        .top_k(4, 50, 5)
        .procedure_monthly_limit(2)
        .progress(false)
        .build()
        .unwrap();
    let (tables, report) = PipelineBuilder::new()
        .input(&input)
        .config(config)
        .build()
        .unwrap()
        .compute()
        .unwrap();
    assert_eq!(report.top_procedures, 4);

    let monthly_codes: HashSet<&str> = tables.procedure_monthly.iter().map(|r| r.hcpcs_code.as_str()).collect();
    assert_eq!(monthly_codes, HashSet::from(["A1", "A2"]));
    assert_eq!(tables.procedure_monthly.len(), 4);

    let all_codes = HashSet::from(["A1", "A2", "A3", "A4"]);
    let pair_codes: HashSet<&str> = tables.provider_procedures.iter().map(|r| r.hcpcs_code.as_str()).collect();
    assert_eq!(pair_codes, all_codes);
    let median_codes: HashSet<&str> = tables
        .procedures
        .iter()
        .filter(|p| p.median_cost_per_claim.is_some())
        .map(|p| p.hcpcs_code.as_str())
        .collect();
    assert_eq!(median_codes, all_codes);
}

#[test]
fn test_non_top_procedure_only_in_flat_summary() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(
        tmp.path(),
        &[
            Row::new("P1", "BIG01", "2021-01", 10, 100, 90_000),
            Row::new("P2", "BIG01", "2021-02", 10, 100, 80_000),
            Row::new("P1", "SMALL", "2021-01", 1, 2, 50),
        ],
    );
    let config = ConfigBuilder::new()
        .top_k(1, 10, 1)
        .procedure_monthly_limit(1)
        .progress(false)
        .build()
        .unwrap();
    let (tables, report) = PipelineBuilder::new()
        .input(&input)
        .config(config)
        .build()
        .unwrap()
        .compute()
        .unwrap();

    assert_eq!(report.top_procedures, 1);
    assert!(tables.procedures.iter().any(|p| p.hcpcs_code == "SMALL"));
    assert!(tables.procedure_monthly.iter().all(|r| r.hcpcs_code == "BIG01"));
    assert_eq!(tables.procedure_monthly.len(), 2);
    let small = tables.procedures.iter().find(|p| p.hcpcs_code == "SMALL").unwrap();
    assert_eq!(small.median_cost_per_claim, None);
    assert!(tables.provider_procedures.iter().all(|r| r.hcpcs_code == "BIG01"));
}

#[test]
fn test_state_tables_with_directory() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(
        tmp.path(),
        &[
            Row::new("1000000001", "J1745", "2021-01", 2, 10, 5000),
            Row::new("1000000001", "99213", "2021-02", 4, 20, 1000),
            Row::new("1000000002", "J1745", "2021-01", 1, 5, 2500),
            Row::new("1000000003", "J1745", "2021-03", 1, 5, 700),
        ],
    );
    let directory = tmp.path().join("npi-lookup-full.json");
    fs::write(
        &directory,
        r#"{"1000000001": {"state": "CA", "name": "Acme Clinic"},
            "1000000002": {"state": "CA"}}"#,
    )
    .unwrap();
    let descriptions = tmp.path().join("hcpcs-descriptions.json");
    fs::write(&descriptions, r#"[{"code": "J1745", "shortDesc": "Infliximab injection"}]"#).unwrap();

    let (tables, report) = PipelineBuilder::new()
        .input(&input)
        .config(small_config())
        .provider_directory(&directory)
        .procedure_descriptions(&descriptions)
        .build()
        .unwrap()
        .compute()
        .unwrap();

    assert_eq!(report.directory_entries, Some(2));
    assert_eq!(tables.states.len(), 1);
    let ca = &tables.states[0];
    assert_eq!(ca.state, "CA");
    assert_eq!(ca.total_paid, 8500.0);
    assert_eq!(ca.provider_count, 2);
    assert_eq!(ca.procedure_count, 2);

    let state_monthly_paid: f64 = tables.state_monthly.iter().map(|r| r.total_paid).sum();
    assert_eq!(state_monthly_paid, 8500.0);

    let j1745 = tables
        .state_procedures
        .iter()
        .find(|r| r.hcpcs_code == "J1745")
        .unwrap();
    assert_eq!(j1745.provider_count, Some(2));
    assert_eq!(j1745.total_paid, 7500.0);

    let acme = tables.providers.iter().find(|p| p.npi == "1000000001").unwrap();
    assert_eq!(acme.name.as_deref(), Some("Acme Clinic"));
    let j = tables.procedures.iter().find(|p| p.hcpcs_code == "J1745").unwrap();
    assert_eq!(j.description.as_deref(), Some("Infliximab injection"));
}

#[test]
fn test_sql_script_from_written_tables() {
    let tmp = TempDir::new().unwrap();
    let input = write_claims(tmp.path(), &synthetic_rows(300));
    let out = tmp.path().join("out");
    run_into(&input, &out, small_config());

    let script = tmp.path().join("load.sql");
    let summary = SqlExporter::new().export_dir(&out, &script).unwrap();
    assert_eq!(summary.tables.len(), OUTPUT_TABLES.len());
    assert!(summary.skipped.is_empty());

    let sql = fs::read_to_string(&script).unwrap();
    assert!(sql.contains("BEGIN;"));
    assert!(sql.trim_end().ends_with("COMMIT;"));
    for table in OUTPUT_TABLES.iter() {
        assert!(sql.contains(&format!("CREATE TABLE {}", table.name)), "missing {}", table.name);
    }
}

#[test]
fn test_missing_input_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let err = PipelineBuilder::new()
        .input(tmp.path().join("nope.csv"))
        .config(small_config())
        .build()
        .unwrap()
        .compute()
        .unwrap_err();
    assert!(matches!(err, RollupError::FileNotFound { .. }));
}

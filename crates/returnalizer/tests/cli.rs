use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

const CSV: &str = "Date,Open,High,Low,Close,Volume\n\
2024-01-01,1,1,1,100,10\n\
2024-02-01,1,1,1,110,10\n\
2024-03-01,1,1,1,99,10\n\
2024-04-01,1,1,1,108.9,10\n";

fn write_csv(dir: &Path) -> PathBuf {
    let path = dir.join("prices.csv");
    std::fs::write(&path, CSV).unwrap();
    path
}

fn cmd() -> Command {
    Command::cargo_bin("returnalizer").unwrap()
}

#[test]
fn analyze_prints_summary_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path());
    cmd()
        .args(["analyze", "--input"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Sample size: 3 months."))
        .stdout(predicate::str::contains("Return Distribution (10% bins)"));
}

#[test]
fn analyze_writes_formula_report() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path());
    let out = dir.path().join("reports/out.json");
    cmd()
        .args(["analyze", "--mode", "formula", "--input"])
        .arg(&csv)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["mode"], "formula");
    assert!(json["defined_names"].as_array().unwrap().len() > 10);
}

#[test]
fn formulas_lists_defined_names() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path());
    cmd()
        .args(["formulas", "--input"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("tReturns[Return] row 1\t=Data!B3/Data!B2-1"))
        .stdout(predicate::str::contains("Stat_Q1\t=QUARTILE.INC(tReturns[Return],1)"))
        .stdout(predicate::str::contains("Bin_Frequency\t"));
}

#[test]
fn strict_bins_fail_with_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path());
    cmd()
        .args(["analyze", "--strict-bins", "--max-bins", "1", "--input"])
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cap"));
}

#[test]
fn missing_input_is_an_error() {
    cmd()
        .arg("analyze")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no input CSV"));
}

#[test]
fn invalid_bin_width_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path());
    cmd()
        .args(["analyze", "--bin-width", "0", "--input"])
        .arg(&csv)
        .assert()
        .failure();
}

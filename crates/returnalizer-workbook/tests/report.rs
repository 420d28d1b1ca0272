use chrono::NaiveDate;
use returnalizer_common::{PriceSeries, Value};
use returnalizer_eval::DerivationMode;
use returnalizer_workbook::report::{
    DATA_SHEET, FREQUENCY_SHEET, OUTLIERS_SHEET, RETURNS_SHEET, STATS_SHEET, SUMMARY_SHEET,
};
use returnalizer_workbook::{
    CsvPriceOptions, Report, ReportBuilder, load_prices_csv, write_report_json,
};

fn prices() -> PriceSeries {
    PriceSeries::monthly(
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        &[100.0, 110.0, 99.0, 108.9, 112.0, 95.0, 240.0, 230.0],
    )
    .unwrap()
}

fn build(mode: DerivationMode) -> Report {
    ReportBuilder::new(mode).build(&prices()).unwrap()
}

fn values(report: &Report, sheet: &str) -> Vec<Vec<Value>> {
    report
        .sheet(sheet)
        .unwrap()
        .rows
        .iter()
        .map(|r| r.iter().map(|c| c.value.clone()).collect())
        .collect()
}

#[test]
fn report_has_every_sheet_in_order() {
    let report = build(DerivationMode::Value);
    assert_eq!(
        report.sheet_names(),
        vec![
            "Data",
            "Returns",
            "Descriptive Stats",
            "Outliers",
            "Frequency",
            "Histogram",
            "Summary"
        ]
    );
    assert_eq!(report.sheet(DATA_SHEET).unwrap().rows.len(), 9);
    assert_eq!(report.sheet(RETURNS_SHEET).unwrap().rows.len(), 8);
}

#[test]
fn stats_sheet_has_eighteen_metrics() {
    let report = build(DerivationMode::Value);
    let sheet = report.sheet(STATS_SHEET).unwrap();
    assert_eq!(sheet.rows.len(), 19);
    let labels: Vec<String> = sheet.rows[1..]
        .iter()
        .map(|r| r[0].value.to_string())
        .collect();
    assert_eq!(labels[0], "Count (months)");
    assert_eq!(labels[7], "20th percentile");
    assert_eq!(labels[12], "Median (Q2)");
    assert_eq!(labels[17], "Upper bound (IQR)");
    assert_eq!(sheet.rows[3][1].value, sheet.rows[13][1].value);
}

#[test]
fn both_modes_show_the_same_values() {
    let v = build(DerivationMode::Value);
    let f = build(DerivationMode::Formula);
    for sheet in [RETURNS_SHEET, STATS_SHEET, OUTLIERS_SHEET, FREQUENCY_SHEET, SUMMARY_SHEET] {
        assert_eq!(values(&v, sheet), values(&f, sheet), "sheet {sheet}");
    }
    assert_eq!(v.summary, f.summary);
}

#[test]
fn formula_mode_carries_formulas() {
    let report = build(DerivationMode::Formula);
    let returns = report.sheet(RETURNS_SHEET).unwrap();
    assert_eq!(
        returns.cell(1, 1).unwrap().formula.as_deref(),
        Some("=Data!B3/Data!B2-1")
    );
    let stats = report.sheet(STATS_SHEET).unwrap();
    assert_eq!(
        stats.cell(2, 1).unwrap().formula.as_deref(),
        Some("=AVERAGE(tReturns[Return])")
    );
    let freq = report.sheet(FREQUENCY_SHEET).unwrap();
    assert_eq!(freq.cell(1, 2).unwrap().formula.as_deref(), Some("=Bin_Frequency"));
    assert_eq!(freq.cell(2, 2).unwrap().formula, None);
    assert!(report.defined_names.iter().any(|n| n.name == "Stat_IQR"));
    assert_eq!(report.helper_columns.len(), 1);
    assert_eq!(
        report.histogram.as_ref().unwrap().categories_ref,
        "=Frequency!$B$2#"
    );
    let summary = report.sheet(SUMMARY_SHEET).unwrap();
    assert!(summary.cell(0, 0).unwrap().formula.is_some());
}

#[test]
fn value_mode_has_no_formulas() {
    let report = build(DerivationMode::Value);
    assert!(report.defined_names.is_empty());
    let has_formula = report
        .sheets
        .iter()
        .flat_map(|s| s.rows.iter().flatten())
        .any(|c| c.formula.is_some());
    assert!(!has_formula);
}

#[test]
fn too_few_prices_yield_no_data_summary() {
    let single = PriceSeries::monthly(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), &[5.0]).unwrap();
    let report = ReportBuilder::new(DerivationMode::Formula).build(&single).unwrap();
    assert_eq!(report.summary, vec!["No data.".to_string()]);
    assert_eq!(report.sheet_names(), vec!["Data", "Summary"]);
}

#[test]
fn csv_to_json_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("prices.csv");
    std::fs::write(
        &csv,
        "Date,Open,High,Low,Close,Volume\n\
         2024-01-01,1,1,1,100,10\n\
         2024-02-01,1,1,1,110,10\n\
         2024-03-01,1,1,1,99,10\n\
         2024-04-01,1,1,1,108.9,10\n",
    )
    .unwrap();
    let prices = load_prices_csv(&csv, &CsvPriceOptions::default()).unwrap();
    let report = ReportBuilder::new(DerivationMode::Formula).build(&prices).unwrap();

    let out = dir.path().join("nested/out/report.json");
    write_report_json(&report, &out).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["mode"], "formula");
    assert_eq!(json["sheets"][0]["name"], "Data");
    assert_eq!(json["sheets"][0]["rows"][0][1]["value"]["Text"], "Close");
    assert!(json["summary"][0].as_str().unwrap().starts_with("Sample size: 3 months."));
}

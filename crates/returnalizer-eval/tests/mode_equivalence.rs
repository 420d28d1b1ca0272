use chrono::NaiveDate;
use proptest::prelude::*;
use returnalizer_eval::engine::{FrequencyTable, bin_returns, flag_outliers, plan_bins};
use returnalizer_eval::{
    Analysis, AnalysisOptions, BinOptions, DerivationMode, FrequencyOutput, MemoryWorkbook,
    OutlierOutput, PriceSeries, ReturnSeries, ReturnsLayout, StatId, StatsOptions,
    ValueAnalysis, analyze, compute_frequency_bins, compute_stats, detect_outliers,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()
}

fn both_modes(prices: &PriceSeries, options: &AnalysisOptions) -> (ValueAnalysis, ValueAnalysis) {
    let value = match analyze(prices, options, DerivationMode::Value).unwrap() {
        Analysis::Values(v) => v,
        Analysis::Formulas(_) => unreachable!(),
    };
    let formula = match analyze(prices, options, DerivationMode::Formula).unwrap() {
        Analysis::Formulas(f) => f.evaluate(prices).unwrap(),
        Analysis::Values(_) => unreachable!(),
    };
    (value, formula)
}

fn stat_bits(a: &ValueAnalysis) -> Vec<(StatId, Option<u64>)> {
    a.stats
        .iter()
        .map(|(id, s)| (id, s.value.map(f64::to_bits)))
        .collect()
}

fn assert_identical(value: &ValueAnalysis, formula: &ValueAnalysis) {
    let returns = |a: &ValueAnalysis| -> Vec<u64> {
        a.returns.values().into_iter().map(f64::to_bits).collect()
    };
    assert_eq!(returns(value), returns(formula));
    assert_eq!(stat_bits(value), stat_bits(formula));
    assert_eq!(value.outliers, formula.outliers);
    assert_eq!(value.frequency, formula.frequency);
}

#[test]
fn alternating_prices_agree() {
    let prices = PriceSeries::monthly(start(), &[100.0, 110.0, 99.0, 108.9]).unwrap();
    let (v, f) = both_modes(&prices, &AnalysisOptions::default());
    assert_identical(&v, &f);
    assert_eq!(v.stats.value(StatId::Count), Some(3.0));
}

#[test]
fn spike_is_flagged_in_both_modes() {
    let mut p = vec![100.0];
    for r in [0.01, 0.02, 0.015, 0.0, 0.012, 5.0] {
        let last = *p.last().unwrap();
        p.push(last * (1.0 + r));
    }
    let prices = PriceSeries::monthly(start(), &p).unwrap();
    let (v, f) = both_modes(&prices, &AnalysisOptions::default());
    assert_identical(&v, &f);
    assert_eq!(v.outliers.count(), 1);
    assert!((v.outliers.records[0].value - 5.0).abs() < 1e-9);
}

#[test]
fn ties_in_the_mode_resolve_to_the_smallest() {
    // Returns are [1.0, -0.5, 1.0, -0.5].
    let prices = PriceSeries::monthly(start(), &[100.0, 200.0, 100.0, 200.0, 100.0]).unwrap();
    let (v, f) = both_modes(&prices, &AnalysisOptions::default());
    assert_identical(&v, &f);
    assert_eq!(v.stats.value(StatId::Mode), Some(-0.5));
}

#[test]
fn narrow_bins_agree() {
    let prices = PriceSeries::monthly(start(), &[10.0, 10.3, 9.9, 10.4, 10.1, 10.1, 9.7]).unwrap();
    let options = AnalysisOptions {
        bins: BinOptions::with_width(0.025),
        ..AnalysisOptions::default()
    };
    let (v, f) = both_modes(&prices, &options);
    assert_identical(&v, &f);
    assert_eq!(v.frequency.total, 6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn value_and_formula_modes_are_bitwise_identical(
        prices in prop::collection::vec(50.0f64..150.0, 2..40),
        width in prop::sample::select(vec![0.05, 0.10, 0.25]),
    ) {
        let series = PriceSeries::monthly(start(), &prices).unwrap();
        let options = AnalysisOptions {
            bins: BinOptions::with_width(width),
            ..AnalysisOptions::default()
        };
        let (v, f) = both_modes(&series, &options);
        prop_assert_eq!(stat_bits(&v), stat_bits(&f));
        prop_assert_eq!(&v.outliers, &f.outliers);
        prop_assert_eq!(&v.frequency, &f.frequency);
        prop_assert_eq!(v.frequency.total, v.returns.len());
    }
}

#[test]
fn inclusive_quartile_fences_also_catch_the_dip() {
    // Q1 = 0.01 and Q3 = 0.02 put the lower fence at -0.005.
    let returns = [0.01, 0.02, -0.01, 0.015, 5.0];
    let mut p = vec![100.0];
    for r in returns {
        let last = *p.last().unwrap();
        p.push(last * (1.0 + r));
    }
    let prices = PriceSeries::monthly(start(), &p).unwrap();
    let (v, f) = both_modes(&prices, &AnalysisOptions::default());
    assert_identical(&v, &f);
    let flagged: Vec<f64> = v.outliers.records.iter().map(|r| r.value).collect();
    assert_eq!(flagged.len(), 2);
    assert!((flagged[0] + 0.01).abs() < 1e-9);
    assert!((flagged[1] - 5.0).abs() < 1e-9);
}

fn returns(values: &[f64]) -> ReturnSeries {
    ReturnSeries::from_values(start(), values)
}

/// Evaluate the recorded bin formulas over a plain return column.
fn evaluated_bins(series: &ReturnSeries, options: &BinOptions) -> FrequencyTable {
    let plan = plan_bins(series, options).unwrap().unwrap();
    let FrequencyOutput::Expressions(e) =
        compute_frequency_bins(series, options, DerivationMode::Formula).unwrap()
    else {
        unreachable!()
    };
    let wb = MemoryWorkbook::for_returns(series, &ReturnsLayout::default(), &e.formulas);
    let nodes = e.nodes.unwrap().map(|n| wb.evaluate(&n));
    FrequencyTable::from_values(&plan, nodes).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fences_and_quartiles_are_ordered(
        values in prop::collection::vec(-0.5f64..0.5, 4..40),
    ) {
        prop_assume!(values.iter().any(|v| *v != values[0]));
        let out = compute_stats(&returns(&values), DerivationMode::Value, &StatsOptions::default())
            .unwrap();
        let panel = out.as_values().unwrap();
        let get = |id| panel.value(id).unwrap();
        let tol = 1e-12;
        prop_assert!(get(StatId::LowerBound) <= get(StatId::Q1));
        prop_assert!(get(StatId::Q1) <= get(StatId::Median) + tol);
        prop_assert!(get(StatId::Median) <= get(StatId::Q3) + tol);
        prop_assert!(get(StatId::Q3) <= get(StatId::UpperBound));
    }

    #[test]
    fn outlier_classification_is_idempotent(
        mut values in prop::collection::vec(-0.2f64..0.2, 4..40),
        spikes in prop::collection::vec(prop::sample::select(vec![-3.0, 2.5, 4.0]), 0..3),
    ) {
        values.extend(spikes);
        let series = returns(&values);
        let stats = compute_stats(&series, DerivationMode::Value, &StatsOptions::default()).unwrap();
        let first = detect_outliers(&series, &stats).unwrap();
        let second = detect_outliers(&series, &stats).unwrap();
        prop_assert_eq!(&first, &second);

        let OutlierOutput::Records(report) = first else { unreachable!() };
        let bounds = report.bounds;
        let flagged: Vec<f64> = report.records.iter().map(|r| r.value).collect();
        let again = flag_outliers(&returns(&flagged), bounds).unwrap();
        prop_assert_eq!(again.count(), flagged.len());

        let kept: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| *v >= bounds.lower && *v <= bounds.upper)
            .collect();
        prop_assert_eq!(kept.len() + flagged.len(), values.len());
        prop_assert_eq!(flag_outliers(&returns(&kept), bounds).unwrap().count(), 0);
    }

    #[test]
    fn returns_on_bin_edges_are_counted_once_in_both_modes(
        steps in prop::collection::vec(-15i32..=15, 1..30),
        width in prop::sample::select(vec![0.05, 0.10, 0.25]),
    ) {
        let values: Vec<f64> = steps.iter().map(|k| f64::from(*k) * width).collect();
        let series = returns(&values);
        let options = BinOptions::with_width(width);
        let value = bin_returns(&series, &options).unwrap();
        let formula = evaluated_bins(&series, &options);
        prop_assert_eq!(&value, &formula);
        let counted: u64 = value.bins.iter().map(|b| b.count).sum();
        prop_assert_eq!(counted as usize, values.len());
        prop_assert!(value.upper_widened);
    }
}

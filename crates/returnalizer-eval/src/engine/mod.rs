//! The four analysis components and the pipeline that strings them together.

use returnalizer_common::{
    AnalysisError, CalcError, PriceSeries, ReturnPoint, ReturnSeries, StatId, StatValue, Value,
};
use returnalizer_formula::ASTNode;

use crate::derivation::{
    Derivation, DerivationMode, FormulaMode, FormulaSet, ReturnsLayout, ValueMode,
};
use crate::workbook::MemoryWorkbook;

pub mod binning;
pub mod outliers;
pub mod returns;
pub mod stats;

pub use binning::{
    BinCapPolicy, BinNodes, BinOptions, BinPlan, FrequencyBin, FrequencyExpressions,
    FrequencyOutput, FrequencyTable, bin_returns, compute_frequency_bins, derive_bins, plan_bins,
};
pub use outliers::{
    OutlierBounds, OutlierExpressions, OutlierNodes, OutlierOutput, OutlierRecord, OutlierReport,
    derive_outliers, detect_outliers, flag_outliers,
};
pub use returns::{compute_returns, derive_returns, return_formulas};
pub use stats::{
    DerivedStats, StatExpression, StatsOptions, StatsOutput, StatsPanel, compute_stats,
    count_returns, derive_stats, stat_expressions, stat_values,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisOptions {
    pub stats: StatsOptions,
    pub bins: BinOptions,
    pub layout: ReturnsLayout,
}

/// Nodes of a full derivation in one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisNodes<N> {
    pub stats: StatsPanel<N>,
    pub outliers: OutlierNodes<N>,
    /// `None` when the series is empty.
    pub bins: Option<BinNodes<N>>,
}

impl<N> AnalysisNodes<N> {
    pub fn map<U, F: FnMut(N) -> U>(self, mut f: F) -> AnalysisNodes<U> {
        AnalysisNodes {
            stats: self.stats.map(|_, n| f(n)),
            outliers: self.outliers.map(&mut f),
            bins: self.bins.map(|b| b.map(&mut f)),
        }
    }
}

/// Stats, then outliers against the stats' fences, then bins.
pub fn derive_analysis<D: Derivation>(
    d: &mut D,
    options: &AnalysisOptions,
    with_bins: bool,
) -> AnalysisNodes<D::Node> {
    let derived = derive_stats(d, &options.stats);
    let outliers = derive_outliers(d, derived.bounds);
    let bins = with_bins.then(|| derive_bins(d, options.bins.width));
    AnalysisNodes {
        stats: derived.panel,
        outliers,
        bins,
    }
}

/// Everything value mode computes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueAnalysis {
    pub returns: ReturnSeries,
    pub nodes: AnalysisNodes<Value>,
    pub stats: StatsPanel<StatValue>,
    pub outliers: OutlierReport,
    pub frequency: FrequencyTable,
}

impl ValueAnalysis {
    fn from_nodes(
        returns: ReturnSeries,
        nodes: AnalysisNodes<Value>,
        plan: Option<BinPlan>,
        width: f64,
    ) -> Result<Self, AnalysisError> {
        let stats = stat_values(nodes.stats.clone())?;
        let bounds = OutlierBounds {
            lower: stats.value(StatId::LowerBound).ok_or(AnalysisError::EmptySeries)?,
            upper: stats.value(StatId::UpperBound).ok_or(AnalysisError::EmptySeries)?,
        };
        let outliers = OutlierReport::from_values(bounds, nodes.outliers.clone())?;
        let frequency = match (plan, nodes.bins.clone()) {
            (Some(plan), Some(bins)) => FrequencyTable::from_values(&plan, bins)?,
            _ => FrequencyTable::empty(width),
        };
        Ok(Self {
            returns,
            nodes,
            stats,
            outliers,
            frequency,
        })
    }
}

/// Everything formula mode records. Nothing is computed except the value
/// guards (bin plan) that decide what may be emitted.
#[derive(Debug, Clone)]
pub struct FormulaAnalysis {
    pub mode: FormulaMode,
    pub nodes: AnalysisNodes<ASTNode>,
    pub stats: StatsPanel<StatExpression>,
    /// Plan of the series the formulas were recorded on.
    pub plan: Option<BinPlan>,
    pub bins: BinOptions,
}

impl FormulaAnalysis {
    pub fn formulas(&self) -> &FormulaSet {
        self.mode.formulas()
    }

    pub fn layout(&self) -> &ReturnsLayout {
        self.mode.layout()
    }

    /// Number of prices the recorded return formulas read.
    pub fn price_count(&self) -> usize {
        self.formulas().return_formulas().len() + 1
    }

    /// The workbook the recorded formulas describe, filled with `prices`.
    /// The series must have as many points as the one recorded on.
    pub fn workbook(&self, prices: &PriceSeries) -> Result<MemoryWorkbook, AnalysisError> {
        if prices.len() != self.price_count() {
            return Err(AnalysisError::LengthMismatch {
                expected: self.price_count(),
                found: prices.len(),
            });
        }
        Ok(MemoryWorkbook::for_prices(prices, self.layout(), self.formulas()))
    }

    /// Evaluate every recorded formula against `prices`. The bin guards run
    /// again on the evaluated returns.
    pub fn evaluate(&self, prices: &PriceSeries) -> Result<ValueAnalysis, AnalysisError> {
        let _span =
            tracing::debug_span!("evaluate_formulas", names = self.formulas().names().len())
                .entered();
        let wb = self.workbook(prices)?;
        let interp = wb.interpreter();
        let layout = self.layout();
        let column =
            interp.evaluate_ast(&ASTNode::table_column(&layout.table, &layout.return_header));
        let cells: Vec<Value> = match column {
            Value::Array(rows) => rows.into_iter().flatten().collect(),
            other => vec![other],
        };
        let points = prices
            .points()
            .iter()
            .skip(1)
            .zip(cells)
            .map(|(p, v)| match v {
                Value::Number(r) => Ok(ReturnPoint::new(p.timestamp, r)),
                Value::Error(e) => Err(AnalysisError::Calc(e)),
                other => Err(AnalysisError::Calc(
                    CalcError::new_value().with_message(format!("return evaluated to {other}")),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let returns = ReturnSeries::from_points(points);
        let plan = plan_bins(&returns, &self.bins)?;
        let values = self.nodes.clone().map(|n| interp.evaluate_ast(&n));
        ValueAnalysis::from_nodes(returns, values, plan, self.bins.width)
    }
}

#[derive(Debug, Clone)]
pub enum Analysis {
    Values(ValueAnalysis),
    Formulas(FormulaAnalysis),
}

impl Analysis {
    pub fn mode(&self) -> DerivationMode {
        match self {
            Analysis::Values(_) => DerivationMode::Value,
            Analysis::Formulas(_) => DerivationMode::Formula,
        }
    }
}

/// Run the whole pipeline on a price series in the requested mode.
///
/// Guards (insufficient data, bin width, bin cap) are evaluated on values
/// in both modes, so a formula-mode run fails exactly when a value-mode
/// run would.
pub fn analyze(
    prices: &PriceSeries,
    options: &AnalysisOptions,
    mode: DerivationMode,
) -> Result<Analysis, AnalysisError> {
    let _span = tracing::info_span!("analyze", %mode, prices = prices.len()).entered();
    options.stats.validate()?;
    options.bins.validate()?;
    let returns = compute_returns(prices)?;
    let plan = plan_bins(&returns, &options.bins)?;

    match mode {
        DerivationMode::Value => {
            let mut d = ValueMode::new(prices.points(), returns.points());
            let nodes = derive_analysis(&mut d, options, plan.is_some());
            let analysis = ValueAnalysis::from_nodes(returns, nodes, plan, options.bins.width)?;
            tracing::info!(
                returns = analysis.returns.len(),
                outliers = analysis.outliers.count(),
                bins = analysis.frequency.bins.len(),
                "analysis complete"
            );
            Ok(Analysis::Values(analysis))
        }
        DerivationMode::Formula => {
            let mut d = FormulaMode::new(options.layout.clone());
            let return_cells = derive_returns(&mut d, prices.len())?;
            let nodes = derive_analysis(&mut d, options, plan.is_some());
            d.formulas_mut().set_return_formulas(return_cells);
            let stats = stat_expressions(&nodes.stats, d.formulas());
            tracing::info!(names = d.formulas().names().len(), "formulas recorded");
            Ok(Analysis::Formulas(FormulaAnalysis {
                mode: d,
                nodes,
                stats,
                plan,
                bins: options.bins.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn prices(values: &[f64]) -> PriceSeries {
        PriceSeries::monthly(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), values).unwrap()
    }

    fn values(analysis: Analysis) -> ValueAnalysis {
        match analysis {
            Analysis::Values(v) => v,
            Analysis::Formulas(_) => panic!("expected values"),
        }
    }

    fn formulas(analysis: Analysis) -> FormulaAnalysis {
        match analysis {
            Analysis::Formulas(f) => f,
            Analysis::Values(_) => panic!("expected formulas"),
        }
    }

    #[test]
    fn value_pipeline_on_alternating_prices() {
        let p = prices(&[100.0, 110.0, 99.0, 108.9]);
        let a = values(analyze(&p, &AnalysisOptions::default(), DerivationMode::Value).unwrap());
        assert_eq!(a.returns.len(), 3);
        assert_eq!(a.stats.value(StatId::Count), Some(3.0));
        assert!((a.stats.value(StatId::Median).unwrap() - 0.10).abs() < 1e-9);
        assert!((a.stats.value(StatId::Min).unwrap() + 0.10).abs() < 1e-9);
        assert!((a.stats.value(StatId::Range).unwrap() - 0.20).abs() < 1e-9);
        assert_eq!(a.frequency.total, 3);
        assert_eq!(a.outliers.count(), 0);
    }

    #[test]
    fn formula_pipeline_evaluates_to_value_pipeline() {
        let p = prices(&[100.0, 104.0, 97.0, 99.5, 130.0, 101.0, 100.2]);
        let opts = AnalysisOptions::default();
        let v = values(analyze(&p, &opts, DerivationMode::Value).unwrap());
        let f = formulas(analyze(&p, &opts, DerivationMode::Formula).unwrap());
        let e = f.evaluate(&p).unwrap();

        let bits = |a: &ValueAnalysis| -> Vec<Option<u64>> {
            a.stats.iter().map(|(_, s)| s.value.map(f64::to_bits)).collect()
        };
        assert_eq!(bits(&v), bits(&e));
        assert_eq!(v.returns, e.returns);
        assert_eq!(v.outliers, e.outliers);
        assert_eq!(v.frequency, e.frequency);
    }

    #[test]
    fn recorded_formulas_recompute_on_new_prices() {
        let opts = AnalysisOptions::default();
        let recorded = prices(&[100.0, 105.0, 110.0, 104.0]);
        let f = formulas(analyze(&recorded, &opts, DerivationMode::Formula).unwrap());
        assert_eq!(f.plan.map(|p| p.upper_widened), Some(false));

        let fresh = prices(&[100.0, 110.0, 110.0, 99.0]);
        let re = f.evaluate(&fresh).unwrap();
        let v = values(analyze(&fresh, &opts, DerivationMode::Value).unwrap());
        assert!(v.frequency.upper_widened);
        assert_eq!(re.returns, v.returns);
        assert_eq!(re.outliers, v.outliers);
        assert_eq!(re.frequency, v.frequency);
        let bits = |a: &ValueAnalysis| -> Vec<Option<u64>> {
            a.stats.iter().map(|(_, s)| s.value.map(f64::to_bits)).collect()
        };
        assert_eq!(bits(&re), bits(&v));
    }

    #[test]
    fn recorded_formulas_reject_a_different_length() {
        let p = prices(&[100.0, 105.0, 110.0]);
        let f = formulas(analyze(&p, &AnalysisOptions::default(), DerivationMode::Formula).unwrap());
        assert_eq!(f.price_count(), 3);
        for other in [&[100.0, 101.0][..], &[100.0, 101.0, 102.0, 103.0][..]] {
            let err = f.evaluate(&prices(other)).unwrap_err();
            assert_eq!(
                err,
                AnalysisError::LengthMismatch {
                    expected: 3,
                    found: other.len()
                }
            );
        }
    }

    #[test]
    fn recomputing_rechecks_a_strict_bin_cap() {
        let opts = AnalysisOptions {
            bins: BinOptions {
                max_bins: 5,
                cap_policy: BinCapPolicy::Error,
                ..BinOptions::default()
            },
            ..AnalysisOptions::default()
        };
        let f = formulas(analyze(&prices(&[100.0, 101.0, 102.0]), &opts, DerivationMode::Formula).unwrap());
        let err = f.evaluate(&prices(&[1.0, 100.0, 1.0])).unwrap_err();
        assert!(matches!(err, AnalysisError::BinCapExceeded { cap: 5, .. }));
    }

    #[test]
    fn default_policy_stops_at_the_sequence_ceiling() {
        let p = prices(&[1.0, 0.5, 100_000.0]);
        for mode in [DerivationMode::Value, DerivationMode::Formula] {
            let err = analyze(&p, &AnalysisOptions::default(), mode).unwrap_err();
            assert!(matches!(
                err,
                AnalysisError::BinCapExceeded { cap: crate::builtins::math::MAX_SEQUENCE_CELLS, .. }
            ));
        }
    }

    #[test]
    fn formula_mode_records_returns_and_bins() {
        let p = prices(&[50.0, 50.0, 50.0]);
        let f = formulas(analyze(&p, &AnalysisOptions::default(), DerivationMode::Formula).unwrap());
        let set = f.formulas();
        assert_eq!(set.return_formulas().len(), 2);
        assert!(set.get("Stat_IQR").is_some());
        assert!(set.get("Bin_Frequency").is_some());
        assert!(set.undefined_names().is_empty());
        assert_eq!(f.plan.map(|p| p.count), Some(1));
    }

    #[test]
    fn constant_prices_fill_one_bin() {
        let p = prices(&[50.0, 50.0, 50.0]);
        let a = values(analyze(&p, &AnalysisOptions::default(), DerivationMode::Value).unwrap());
        assert_eq!(a.frequency.bins.len(), 1);
        assert_eq!(a.frequency.bins[0].count, 2);
        assert_eq!(a.frequency.bins[0].relative_frequency, 1.0);
    }

    #[test]
    fn guards_fail_in_both_modes() {
        let p = prices(&[100.0]);
        for mode in [DerivationMode::Value, DerivationMode::Formula] {
            let err = analyze(&p, &AnalysisOptions::default(), mode).unwrap_err();
            assert_eq!(err, AnalysisError::InsufficientData { found: 1 });
        }

        let p = prices(&[1.0, 100.0, 1.0]);
        let opts = AnalysisOptions {
            bins: BinOptions {
                max_bins: 5,
                cap_policy: BinCapPolicy::Error,
                ..BinOptions::default()
            },
            ..AnalysisOptions::default()
        };
        for mode in [DerivationMode::Value, DerivationMode::Formula] {
            let err = analyze(&p, &opts, mode).unwrap_err();
            assert!(matches!(err, AnalysisError::BinCapExceeded { cap: 5, .. }));
        }
    }

    #[test]
    fn single_return_has_undefined_variance() {
        let p = prices(&[100.0, 120.0]);
        let a = values(analyze(&p, &AnalysisOptions::default(), DerivationMode::Value).unwrap());
        assert_eq!(a.stats.get(StatId::Variance).map(|s| s.value), Some(None));
        assert_eq!(a.stats.get(StatId::StdDev).map(|s| s.value), Some(None));
        assert_eq!(a.stats.value(StatId::Iqr), Some(0.0));
    }
}

//! Descriptive statistics of a return series.

use std::collections::{BTreeMap, BTreeSet};

use returnalizer_common::{
    AnalysisError, CalcError, CalcErrorKind, ReturnSeries, StatId, StatKind, StatValue, Value,
};
use returnalizer_formula::{ASTNode, canonical_formula};

use super::outliers::OutlierBounds;
use crate::builtins::Builtin;
use crate::derivation::{
    Derivation, DerivationMode, FormulaMode, FormulaSet, ReturnsLayout, ValueMode,
};

/// Tukey fence multiplier.
pub const IQR_MULTIPLIER: f64 = 1.5;

pub const DEFAULT_PERCENTILES: [f64; 3] = [0.2, 0.6, 0.9];

#[derive(Debug, Clone, PartialEq)]
pub struct StatsOptions {
    /// Extra inclusive percentiles, each in `[0, 1]`.
    pub percentiles: Vec<f64>,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            percentiles: DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

impl StatsOptions {
    /// Levels must lie in `[0, 1]` and be distinct once rounded to a basis
    /// point, since each one becomes its own named statistic.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let mut seen = BTreeSet::new();
        for &p in &self.percentiles {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(AnalysisError::InvalidPercentile(p));
            }
            if !seen.insert(StatId::percentile(p)) {
                return Err(AnalysisError::DuplicatePercentile(p));
            }
        }
        Ok(())
    }
}

/// Statistics keyed by [`StatId`], iterated in panel order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsPanel<T> {
    entries: BTreeMap<StatId, T>,
}

impl<T> Default for StatsPanel<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> StatsPanel<T> {
    pub fn insert(&mut self, id: StatId, value: T) {
        self.entries.insert(id, value);
    }

    pub fn get(&self, id: StatId) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatId, &T)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    pub fn ids(&self) -> impl Iterator<Item = StatId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn map<U, F>(self, mut f: F) -> StatsPanel<U>
    where
        F: FnMut(StatId, T) -> U,
    {
        StatsPanel {
            entries: self.entries.into_iter().map(|(id, v)| (id, f(id, v))).collect(),
        }
    }

    pub fn try_map<U, E, F>(self, mut f: F) -> Result<StatsPanel<U>, E>
    where
        F: FnMut(StatId, T) -> Result<U, E>,
    {
        let mut entries = BTreeMap::new();
        for (id, v) in self.entries {
            entries.insert(id, f(id, v)?);
        }
        Ok(StatsPanel { entries })
    }
}

impl StatsPanel<StatValue> {
    /// Plain number of a statistic; `None` when absent or undefined.
    pub fn value(&self, id: StatId) -> Option<f64> {
        self.get(id).and_then(|s| s.value)
    }
}

/// The derived panel plus the fences outlier detection consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStats<N> {
    pub panel: StatsPanel<N>,
    pub bounds: OutlierBounds<N>,
}

/// Derive the whole panel. Each entry is bound to its `Stat_` name, and
/// later entries refer to earlier ones by that name (`Stat_Range` is
/// `Stat_Max-Stat_Min`).
pub fn derive_stats<D: Derivation>(d: &mut D, options: &StatsOptions) -> DerivedStats<D::Node> {
    let mut panel = StatsPanel::default();
    let r = d.returns();

    let count = d.call(Builtin::Rows, vec![r.clone()]);
    record(d, &mut panel, StatId::Count, count);
    let mean = d.call(Builtin::Average, vec![r.clone()]);
    record(d, &mut panel, StatId::Mean, mean);
    let median = d.call(Builtin::Median, vec![r.clone()]);
    record(d, &mut panel, StatId::Median, median);

    // Smallest of the most frequent values; the minimum when nothing repeats.
    let modes = d.call(Builtin::ModeMult, vec![r.clone()]);
    let smallest_mode = d.call(Builtin::Min, vec![modes]);
    let fallback = d.call(Builtin::Min, vec![r.clone()]);
    let mode = d.call(Builtin::IfError, vec![smallest_mode, fallback]);
    record(d, &mut panel, StatId::Mode, mode);

    let min = d.call(Builtin::Min, vec![r.clone()]);
    let min = record(d, &mut panel, StatId::Min, min);
    let max = d.call(Builtin::Max, vec![r.clone()]);
    let max = record(d, &mut panel, StatId::Max, max);
    let range = d.sub(max, min);
    record(d, &mut panel, StatId::Range, range);

    let variance = d.call(Builtin::VarS, vec![r.clone()]);
    let variance = record(d, &mut panel, StatId::Variance, variance);
    let std_dev = d.call(Builtin::Sqrt, vec![variance]);
    record(d, &mut panel, StatId::StdDev, std_dev);

    for &p in &options.percentiles {
        let id = StatId::percentile(p);
        let level = d.number(p);
        let node = d.call(Builtin::PercentileInc, vec![r.clone(), level]);
        record(d, &mut panel, id, node);
    }

    let one = d.number(1.0);
    let q1 = d.call(Builtin::QuartileInc, vec![r.clone(), one]);
    let q1 = record(d, &mut panel, StatId::Q1, q1);
    let three = d.number(3.0);
    let q3 = d.call(Builtin::QuartileInc, vec![r, three]);
    let q3 = record(d, &mut panel, StatId::Q3, q3);
    let iqr = d.sub(q3.clone(), q1.clone());
    let iqr = record(d, &mut panel, StatId::Iqr, iqr);

    let k = d.number(IQR_MULTIPLIER);
    let spread = d.mul(k, iqr.clone());
    let lower = d.sub(q1, spread);
    let lower = record(d, &mut panel, StatId::LowerBound, lower);
    let k = d.number(IQR_MULTIPLIER);
    let spread = d.mul(k, iqr);
    let upper = d.add(q3, spread);
    let upper = record(d, &mut panel, StatId::UpperBound, upper);

    DerivedStats {
        panel,
        bounds: OutlierBounds { lower, upper },
    }
}

fn record<D: Derivation>(
    d: &mut D,
    panel: &mut StatsPanel<D::Node>,
    id: StatId,
    node: D::Node,
) -> D::Node {
    let named = d.define(&id.defined_name(), node);
    panel.insert(id, named.clone());
    named
}

/// Convert evaluated panel entries. `#DIV/0!` means "undefined for this
/// sample" (variance of one return); any other error is a failure.
pub fn stat_values(panel: StatsPanel<Value>) -> Result<StatsPanel<StatValue>, AnalysisError> {
    panel.try_map(|id, v| match v.into_scalar() {
        Value::Number(n) => Ok(StatValue::new(id, Some(n))),
        Value::Error(e) if e.kind == CalcErrorKind::Div => Ok(StatValue::new(id, None)),
        Value::Error(e) => Err(AnalysisError::Calc(e.with_message(id.defined_name()))),
        other => Err(AnalysisError::Calc(
            CalcError::new_value()
                .with_message(format!("{} evaluated to {other}", id.defined_name())),
        )),
    })
}

/// A statistic in formula mode: its defined name and the expression bound
/// to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatExpression {
    pub id: StatId,
    pub kind: StatKind,
    pub name: String,
    pub node: ASTNode,
}

impl StatExpression {
    pub fn formula(&self) -> String {
        canonical_formula(&self.node)
    }
}

/// Attach the recorded definitions to a formula-mode panel.
pub fn stat_expressions(panel: &StatsPanel<ASTNode>, formulas: &FormulaSet) -> StatsPanel<StatExpression> {
    let mut out = StatsPanel::default();
    for (id, reference) in panel.iter() {
        let name = id.defined_name();
        let node = formulas.get(&name).cloned().unwrap_or_else(|| reference.clone());
        out.insert(
            id,
            StatExpression {
                id,
                kind: id.kind(),
                name,
                node,
            },
        );
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsOutput {
    Values(StatsPanel<StatValue>),
    Expressions {
        panel: StatsPanel<StatExpression>,
        formulas: FormulaSet,
    },
}

impl StatsOutput {
    pub fn mode(&self) -> DerivationMode {
        match self {
            StatsOutput::Values(_) => DerivationMode::Value,
            StatsOutput::Expressions { .. } => DerivationMode::Formula,
        }
    }

    pub fn as_values(&self) -> Option<&StatsPanel<StatValue>> {
        match self {
            StatsOutput::Values(p) => Some(p),
            StatsOutput::Expressions { .. } => None,
        }
    }

    pub fn as_expressions(&self) -> Option<&StatsPanel<StatExpression>> {
        match self {
            StatsOutput::Values(_) => None,
            StatsOutput::Expressions { panel, .. } => Some(panel),
        }
    }
}

/// Number of returns in the series.
pub fn count_returns(returns: &ReturnSeries) -> usize {
    returns.len()
}

/// The descriptive-statistics panel in either mode.
///
/// An empty series is [`AnalysisError::EmptySeries`] in both modes, even
/// though formula mode could emit expressions that would evaluate to errors.
pub fn compute_stats(
    returns: &ReturnSeries,
    mode: DerivationMode,
    options: &StatsOptions,
) -> Result<StatsOutput, AnalysisError> {
    let _span = tracing::debug_span!("compute_stats", %mode, n = returns.len()).entered();
    options.validate()?;
    if returns.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }
    match mode {
        DerivationMode::Value => {
            let mut d = ValueMode::over_returns(returns.points());
            let derived = derive_stats(&mut d, options);
            Ok(StatsOutput::Values(stat_values(derived.panel)?))
        }
        DerivationMode::Formula => {
            let mut d = FormulaMode::new(ReturnsLayout::default());
            let derived = derive_stats(&mut d, options);
            let formulas = d.into_formulas();
            Ok(StatsOutput::Expressions {
                panel: stat_expressions(&derived.panel, &formulas),
                formulas,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> ReturnSeries {
        ReturnSeries::from_values(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), values)
    }

    fn values(values: &[f64]) -> StatsPanel<StatValue> {
        match compute_stats(&series(values), DerivationMode::Value, &StatsOptions::default()).unwrap() {
            StatsOutput::Values(p) => p,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-12)
    }

    #[test]
    fn panel_for_four_returns() {
        let p = values(&[0.0, 0.1, 0.2, 0.3]);
        assert_eq!(p.value(StatId::Count), Some(4.0));
        assert!(close(p.value(StatId::Mean), 0.15));
        assert!(close(p.value(StatId::Median), 0.15));
        assert!(close(p.value(StatId::Q1), 0.075));
        assert!(close(p.value(StatId::Q3), 0.225));
        assert!(close(p.value(StatId::Iqr), 0.15));
        assert!(close(p.value(StatId::LowerBound), -0.15));
        assert!(close(p.value(StatId::UpperBound), 0.45));
        assert!(close(p.value(StatId::percentile(0.2)), 0.06));
        assert!(close(p.value(StatId::Range), 0.3));
        // nothing repeats: the mode falls back to the minimum
        assert_eq!(p.value(StatId::Mode), Some(0.0));
    }

    #[test]
    fn single_return_has_undefined_dispersion() {
        let p = values(&[0.042]);
        assert_eq!(p.value(StatId::Count), Some(1.0));
        assert_eq!(p.value(StatId::Mean), Some(0.042));
        assert_eq!(p.value(StatId::Median), Some(0.042));
        assert_eq!(p.value(StatId::Iqr), Some(0.0));
        assert_eq!(p.get(StatId::Variance).map(|s| s.value), Some(None));
        assert_eq!(p.get(StatId::StdDev).map(|s| s.value), Some(None));
    }

    #[test]
    fn mode_prefers_smallest_of_ties() {
        let p = values(&[0.3, 0.1, 0.3, 0.1, 0.2]);
        assert_eq!(p.value(StatId::Mode), Some(0.1));
    }

    #[test]
    fn statistic_ordering_holds() {
        let p = values(&[0.05, -0.12, 0.33, 0.01, -0.02, 0.07, 0.2]);
        let v = |id| p.value(id).unwrap();
        assert!(v(StatId::Min) <= v(StatId::Q1));
        assert!(v(StatId::Q1) <= v(StatId::Median));
        assert!(v(StatId::Median) <= v(StatId::Q3));
        assert!(v(StatId::Q3) <= v(StatId::Max));
        assert!(v(StatId::LowerBound) <= v(StatId::Q1));
        assert!(v(StatId::UpperBound) >= v(StatId::Q3));
    }

    #[test]
    fn empty_series_fails_in_both_modes() {
        for mode in [DerivationMode::Value, DerivationMode::Formula] {
            assert_eq!(
                compute_stats(&series(&[]), mode, &StatsOptions::default()).unwrap_err(),
                AnalysisError::EmptySeries
            );
        }
    }

    #[test]
    fn rejects_out_of_range_percentiles() {
        let options = StatsOptions {
            percentiles: vec![0.5, 1.5],
        };
        assert_eq!(
            compute_stats(&series(&[0.1]), DerivationMode::Value, &options).unwrap_err(),
            AnalysisError::InvalidPercentile(1.5)
        );
    }

    #[test]
    fn rejects_percentiles_sharing_a_basis_point() {
        let options = StatsOptions {
            percentiles: vec![0.2, 0.6, 0.20004],
        };
        for mode in [DerivationMode::Value, DerivationMode::Formula] {
            assert_eq!(
                compute_stats(&series(&[0.1, 0.2]), mode, &options).unwrap_err(),
                AnalysisError::DuplicatePercentile(0.20004)
            );
        }
        let distinct = StatsOptions {
            percentiles: vec![0.2, 0.2001],
        };
        assert!(distinct.validate().is_ok());
    }

    #[test]
    fn formula_panel_references_names() {
        let out = compute_stats(&series(&[0.1, 0.2]), DerivationMode::Formula, &StatsOptions::default())
            .unwrap();
        let panel = out.as_expressions().unwrap();
        let formula = |id| panel.get(id).unwrap().formula();
        insta::assert_snapshot!(formula(StatId::Count), @"=ROWS(tReturns[Return])");
        insta::assert_snapshot!(
            formula(StatId::Mode),
            @"=IFERROR(MIN(MODE.MULT(tReturns[Return])),MIN(tReturns[Return]))"
        );
        insta::assert_snapshot!(formula(StatId::Range), @"=Stat_Max-Stat_Min");
        insta::assert_snapshot!(formula(StatId::StdDev), @"=SQRT(Stat_Variance)");
        insta::assert_snapshot!(
            formula(StatId::percentile(0.6)),
            @"=PERCENTILE.INC(tReturns[Return],0.6)"
        );
        insta::assert_snapshot!(formula(StatId::LowerBound), @"=Stat_Q1-1.5*Stat_IQR");
        insta::assert_snapshot!(formula(StatId::UpperBound), @"=Stat_Q3+1.5*Stat_IQR");
        assert_eq!(panel.get(StatId::Iqr).unwrap().name, "Stat_IQR");
    }
}

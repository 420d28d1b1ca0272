//! Fixed-width frequency bins.
//!
//! Every return gets an integer bin index `FLOOR(ROUND(r / w, 9))`. The
//! ROUND snaps quotients that floating-point division leaves a hair below
//! an integer (`0.3 / 0.1`), so a return sitting on an edge always lands in
//! the bin that edge opens. Edges are then `index * w` and `(index + 1) * w`,
//! which makes each upper edge bitwise equal to the next lower edge, and
//! counting by index means every return is counted exactly once.

use returnalizer_common::{AnalysisError, CalcError, ReturnSeries, Value};
use returnalizer_formula::ASTNode;

use crate::broadcast::BinaryOp;
use crate::builtins::Builtin;
use crate::builtins::math::{MAX_SEQUENCE_CELLS, round_half_away};
use crate::derivation::{
    Derivation, DerivationMode, FormulaMode, FormulaSet, ReturnsLayout, ValueMode,
};

pub const DEFAULT_BIN_WIDTH: f64 = 0.10;
pub const DEFAULT_MAX_BINS: usize = 200;
/// Decimal digits the bin quotient is rounded to before flooring.
pub const EDGE_SNAP_DIGITS: i32 = 9;

pub const BIN_WIDTH: &str = "Bin_Width";
pub const BIN_COLUMN: &str = "Bin";
pub const BIN_FIRST: &str = "Bin_First";
pub const BIN_LAST: &str = "Bin_Last";
pub const BIN_COUNT: &str = "Bin_Count";
pub const BIN_INDEX: &str = "Bin_Index";
pub const BIN_LOWER: &str = "Bin_Lower";
pub const BIN_UPPER: &str = "Bin_Upper";
pub const BIN_FREQUENCY: &str = "Bin_Frequency";
pub const BIN_RELATIVE: &str = "Bin_Relative";
pub const BIN_LABEL: &str = "Bin_Label";

/// What to do when a series needs more bins than `max_bins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinCapPolicy {
    /// Keep every bin, log a warning and mark the table.
    #[default]
    Warn,
    /// Fail with [`AnalysisError::BinCapExceeded`].
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinOptions {
    pub width: f64,
    pub max_bins: usize,
    pub cap_policy: BinCapPolicy,
}

impl Default for BinOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_BIN_WIDTH,
            max_bins: DEFAULT_MAX_BINS,
            cap_policy: BinCapPolicy::Warn,
        }
    }
}

impl BinOptions {
    pub fn with_width(width: f64) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(AnalysisError::InvalidBinWidth(self.width));
        }
        Ok(())
    }
}

/// Stage one: the per-return index column and the index span.
#[derive(Debug, Clone, PartialEq)]
pub struct BinIndexNodes<N> {
    pub width: N,
    pub index: N,
    pub first: N,
    pub last: N,
    pub count: N,
}

/// Stage two: one entry per bin, all vertical arrays of `count` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct BinNodes<N> {
    pub span: BinIndexNodes<N>,
    pub sequence: N,
    pub lower: N,
    pub upper: N,
    pub frequency: N,
    pub relative: N,
    pub labels: N,
}

impl<N> BinNodes<N> {
    pub fn map<U, F: FnMut(N) -> U>(self, mut f: F) -> BinNodes<U> {
        BinNodes {
            span: BinIndexNodes {
                width: f(self.span.width),
                index: f(self.span.index),
                first: f(self.span.first),
                last: f(self.span.last),
                count: f(self.span.count),
            },
            sequence: f(self.sequence),
            lower: f(self.lower),
            upper: f(self.upper),
            frequency: f(self.frequency),
            relative: f(self.relative),
            labels: f(self.labels),
        }
    }
}

pub fn derive_bin_index<D: Derivation>(d: &mut D, width: f64) -> BinIndexNodes<D::Node> {
    let w = d.number(width);
    let w = d.define(BIN_WIDTH, w);
    let index = d.helper_column(BIN_COLUMN, |d, r| {
        let quotient = d.div(r, w.clone());
        let digits = d.number(f64::from(EDGE_SNAP_DIGITS));
        let snapped = d.call(Builtin::Round, vec![quotient, digits]);
        d.call(Builtin::FloorMath, vec![snapped])
    });
    let first = d.call(Builtin::Min, vec![index.clone()]);
    let first = d.define(BIN_FIRST, first);
    let last = d.call(Builtin::Max, vec![index.clone()]);
    let last = d.define(BIN_LAST, last);
    let span = d.sub(last.clone(), first.clone());
    let one = d.number(1.0);
    let count = d.add(span, one);
    let count = d.define(BIN_COUNT, count);
    BinIndexNodes {
        width: w,
        index,
        first,
        last,
        count,
    }
}

pub fn derive_bin_table<D: Derivation>(d: &mut D, span: BinIndexNodes<D::Node>) -> BinNodes<D::Node> {
    let one = d.number(1.0);
    let step = d.number(1.0);
    let seq = d.call(
        Builtin::Sequence,
        vec![span.count.clone(), one, span.first.clone(), step],
    );
    let seq = d.define(BIN_INDEX, seq);

    let lower = d.mul(seq.clone(), span.width.clone());
    let lower = d.define(BIN_LOWER, lower);
    let one = d.number(1.0);
    let next = d.add(seq.clone(), one);
    let upper = d.mul(next, span.width.clone());
    let upper = d.define(BIN_UPPER, upper);

    let frequency = d.call(Builtin::CountIfs, vec![span.index.clone(), seq.clone()]);
    let frequency = d.define(BIN_FREQUENCY, frequency);

    let total = d.call(Builtin::Sum, vec![frequency.clone()]);
    let zero = d.number(0.0);
    let no_data = d.binary(BinaryOp::Eq, total.clone(), zero);
    let share = d.div(frequency.clone(), total);
    let zero = d.number(0.0);
    let relative = d.call(Builtin::If, vec![no_data, zero, share]);
    let relative = d.define(BIN_RELATIVE, relative);

    let pct = d.text("0%");
    let from = d.call(Builtin::Text, vec![lower.clone(), pct]);
    let sep = d.text(" to ");
    let from = d.concat(from, sep);
    let pct = d.text("0%");
    let to = d.call(Builtin::Text, vec![upper.clone(), pct]);
    let label = d.concat(from, to);
    let labels = d.define(BIN_LABEL, label);

    BinNodes {
        span,
        sequence: seq,
        lower,
        upper,
        frequency,
        relative,
        labels,
    }
}

pub fn derive_bins<D: Derivation>(d: &mut D, width: f64) -> BinNodes<D::Node> {
    let span = derive_bin_index(d, width);
    derive_bin_table(d, span)
}

/// The bin layout a series needs, computed in value mode before anything
/// is emitted so both modes apply the same guards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinPlan {
    pub width: f64,
    pub first: f64,
    pub count: usize,
    /// The maximum return sits exactly on an edge, so the last bin opens at it.
    pub upper_widened: bool,
    pub exceeds_cap: bool,
}

/// `None` for an empty series.
pub fn plan_bins(returns: &ReturnSeries, options: &BinOptions) -> Result<Option<BinPlan>, AnalysisError> {
    options.validate()?;
    if returns.is_empty() {
        return Ok(None);
    }
    let mut d = ValueMode::over_returns(returns.points());
    let span = derive_bin_index(&mut d, options.width);
    let first = scalar(span.first, BIN_FIRST)?;
    let count = scalar(span.count, BIN_COUNT)?;
    let count = count.max(0.0) as usize;

    let exceeds_cap = count > options.max_bins;
    if exceeds_cap && options.cap_policy == BinCapPolicy::Error {
        return Err(AnalysisError::BinCapExceeded {
            required: count,
            cap: options.max_bins,
        });
    }
    // SEQUENCE cannot materialize the bin column past this, whatever the policy.
    if count > MAX_SEQUENCE_CELLS {
        return Err(AnalysisError::BinCapExceeded {
            required: count,
            cap: MAX_SEQUENCE_CELLS,
        });
    }
    if exceeds_cap {
        tracing::warn!(required = count, cap = options.max_bins, "bin count exceeds cap");
    }

    let max = returns.values().into_iter().reduce(f64::max).unwrap_or(0.0);
    let snapped = round_half_away(max / options.width, EDGE_SNAP_DIGITS);
    let upper_widened = snapped == snapped.floor();
    if upper_widened {
        tracing::debug!(max, width = options.width, "maximum return on a bin edge; last bin opens at it");
    }
    Ok(Some(BinPlan {
        width: options.width,
        first,
        count,
        upper_widened,
        exceeds_cap,
    }))
}

fn scalar(v: Value, what: &str) -> Result<f64, AnalysisError> {
    match v.into_scalar() {
        Value::Number(n) => Ok(n),
        Value::Error(e) => Err(AnalysisError::Calc(e.with_message(what.to_string()))),
        other => Err(AnalysisError::Calc(
            CalcError::new_value().with_message(format!("{what} evaluated to {other}")),
        )),
    }
}

fn column(v: Value, what: &str) -> Result<Vec<Value>, AnalysisError> {
    let cells: Vec<Value> = match v {
        Value::Array(rows) => rows.into_iter().flatten().collect(),
        other => vec![other],
    };
    if let Some(e) = cells.iter().find_map(Value::as_error) {
        return Err(AnalysisError::Calc(e.clone().with_message(what.to_string())));
    }
    Ok(cells)
}

fn numbers(v: Value, what: &str) -> Result<Vec<f64>, AnalysisError> {
    column(v, what)?
        .into_iter()
        .map(|c| scalar(c, what))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBin {
    pub lower_edge: f64,
    pub upper_edge: f64,
    pub label: String,
    pub count: u64,
    pub relative_frequency: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    pub width: f64,
    pub bins: Vec<FrequencyBin>,
    /// Sum of all bin counts; equals the number of returns.
    pub total: usize,
    pub upper_widened: bool,
    pub exceeds_cap: bool,
}

impl FrequencyTable {
    pub fn empty(width: f64) -> Self {
        Self {
            width,
            bins: Vec::new(),
            total: 0,
            upper_widened: false,
            exceeds_cap: false,
        }
    }

    /// Build from evaluated nodes.
    pub fn from_values(plan: &BinPlan, nodes: BinNodes<Value>) -> Result<Self, AnalysisError> {
        let lower = numbers(nodes.lower, BIN_LOWER)?;
        let upper = numbers(nodes.upper, BIN_UPPER)?;
        let frequency = numbers(nodes.frequency, BIN_FREQUENCY)?;
        let relative = numbers(nodes.relative, BIN_RELATIVE)?;
        let labels = column(nodes.labels, BIN_LABEL)?;
        let bins: Vec<FrequencyBin> = lower
            .into_iter()
            .zip(upper)
            .zip(frequency)
            .zip(relative)
            .zip(labels)
            .map(|((((lo, hi), count), rel), label)| FrequencyBin {
                lower_edge: lo,
                upper_edge: hi,
                label: label.to_string(),
                count: count as u64,
                relative_frequency: rel,
            })
            .collect();
        let total = bins.iter().map(|b| b.count as usize).sum();
        Ok(Self {
            width: plan.width,
            bins,
            total,
            upper_widened: plan.upper_widened,
            exceeds_cap: plan.exceeds_cap,
        })
    }
}

/// Recorded bin formulas plus the table they evaluate to.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyExpressions {
    /// `None` for an empty series: nothing is emitted.
    pub nodes: Option<BinNodes<ASTNode>>,
    pub formulas: FormulaSet,
    pub preview: FrequencyTable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrequencyOutput {
    Table(FrequencyTable),
    Expressions(FrequencyExpressions),
}

impl FrequencyOutput {
    /// The evaluated table, whichever the mode.
    pub fn table(&self) -> &FrequencyTable {
        match self {
            FrequencyOutput::Table(t) => t,
            FrequencyOutput::Expressions(e) => &e.preview,
        }
    }
}

/// Value-mode frequency table.
pub fn bin_returns(returns: &ReturnSeries, options: &BinOptions) -> Result<FrequencyTable, AnalysisError> {
    let Some(plan) = plan_bins(returns, options)? else {
        return Ok(FrequencyTable::empty(options.width));
    };
    let mut d = ValueMode::over_returns(returns.points());
    let nodes = derive_bins(&mut d, options.width);
    FrequencyTable::from_values(&plan, nodes)
}

/// Frequency bins in either mode. An empty series yields an empty table
/// (and no formulas) in both modes.
pub fn compute_frequency_bins(
    returns: &ReturnSeries,
    options: &BinOptions,
    mode: DerivationMode,
) -> Result<FrequencyOutput, AnalysisError> {
    let _span = tracing::debug_span!("compute_frequency_bins", %mode, n = returns.len(), width = options.width)
        .entered();
    let table = bin_returns(returns, options)?;
    tracing::debug!(bins = table.bins.len(), total = table.total, "frequency table built");
    match mode {
        DerivationMode::Value => Ok(FrequencyOutput::Table(table)),
        DerivationMode::Formula => {
            let mut d = FormulaMode::new(ReturnsLayout::default());
            let nodes = (!returns.is_empty()).then(|| derive_bins(&mut d, options.width));
            Ok(FrequencyOutput::Expressions(FrequencyExpressions {
                nodes,
                formulas: d.into_formulas(),
                preview: table,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use returnalizer_formula::canonical_formula;

    fn series(values: &[f64]) -> ReturnSeries {
        ReturnSeries::from_values(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), values)
    }

    fn table(values: &[f64]) -> FrequencyTable {
        bin_returns(&series(values), &BinOptions::default()).unwrap()
    }

    fn counts(t: &FrequencyTable) -> Vec<u64> {
        t.bins.iter().map(|b| b.count).collect()
    }

    #[test]
    fn three_returns_three_bins() {
        let t = table(&[0.05, 0.15, 0.25]);
        assert_eq!(counts(&t), vec![1, 1, 1]);
        let labels: Vec<&str> = t.bins.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["0% to 10%", "10% to 20%", "20% to 30%"]);
        assert_eq!(t.total, 3);
        assert!(!t.upper_widened);
    }

    #[test]
    fn maximum_on_an_edge_opens_a_final_bin() {
        let t = table(&[0.0, 0.1, 0.3]);
        assert_eq!(counts(&t), vec![1, 1, 0, 1]);
        assert!(t.upper_widened);
        assert_eq!(t.bins[3].lower_edge, 3.0 * 0.1);
    }

    #[test]
    fn edges_are_contiguous_and_cover_the_data() {
        let data = [-0.153, -0.04, 0.0, 0.012, 0.27, 0.2, -0.3, 0.099];
        let t = table(&data);
        for pair in t.bins.windows(2) {
            assert_eq!(pair[0].upper_edge.to_bits(), pair[1].lower_edge.to_bits());
        }
        assert!(t.bins[0].lower_edge <= -0.3);
        assert!(t.bins.last().unwrap().upper_edge > 0.27);
        assert_eq!(t.total, data.len());
        let rel: f64 = t.bins.iter().map(|b| b.relative_frequency).sum();
        assert!((rel - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_returns_fill_one_bin() {
        let t = table(&[0.03; 5]);
        assert_eq!(t.bins.len(), 1);
        assert_eq!(t.bins[0].count, 5);
        assert_eq!(t.bins[0].relative_frequency, 1.0);
    }

    #[test]
    fn empty_series_gives_empty_table_in_both_modes() {
        let empty = series(&[]);
        for mode in [DerivationMode::Value, DerivationMode::Formula] {
            let out = compute_frequency_bins(&empty, &BinOptions::default(), mode).unwrap();
            assert!(out.table().bins.is_empty());
            if let FrequencyOutput::Expressions(e) = out {
                assert!(e.formulas.is_empty());
            }
        }
    }

    #[test]
    fn invalid_width_is_rejected() {
        for width in [0.0, -0.1, f64::NAN] {
            let err = bin_returns(&series(&[0.1]), &BinOptions::with_width(width)).unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidBinWidth(_)));
        }
    }

    #[test]
    fn cap_policy_warns_or_fails() {
        let data = series(&[-1.0, 1.0]);
        let mut options = BinOptions {
            width: 0.1,
            max_bins: 5,
            cap_policy: BinCapPolicy::Warn,
        };
        let t = bin_returns(&data, &options).unwrap();
        assert!(t.exceeds_cap);
        assert_eq!(t.bins.len(), 21);
        options.cap_policy = BinCapPolicy::Error;
        assert_eq!(
            bin_returns(&data, &options).unwrap_err(),
            AnalysisError::BinCapExceeded { required: 21, cap: 5 }
        );
    }

    #[test]
    fn bins_past_the_sequence_ceiling_fail_under_either_policy() {
        let data = series(&[-0.5, 199_999.0]);
        for cap_policy in [BinCapPolicy::Warn, BinCapPolicy::Error] {
            let options = BinOptions {
                max_bins: usize::MAX,
                cap_policy,
                ..BinOptions::default()
            };
            let err = bin_returns(&data, &options).unwrap_err();
            assert!(matches!(
                err,
                AnalysisError::BinCapExceeded { required, cap: MAX_SEQUENCE_CELLS }
                    if required > MAX_SEQUENCE_CELLS
            ));
        }
        // a configured cap below the ceiling still reports itself
        let strict = BinOptions {
            cap_policy: BinCapPolicy::Error,
            ..BinOptions::default()
        };
        assert!(matches!(
            bin_returns(&data, &strict).unwrap_err(),
            AnalysisError::BinCapExceeded { cap: DEFAULT_MAX_BINS, .. }
        ));
    }

    #[test]
    fn formula_mode_records_the_bin_pipeline() {
        let out = compute_frequency_bins(&series(&[0.05, 0.15]), &BinOptions::default(), DerivationMode::Formula)
            .unwrap();
        let FrequencyOutput::Expressions(e) = out else {
            panic!("expected expressions");
        };
        let helper = &e.formulas.helper_columns()[0];
        assert_eq!(helper.name, BIN_COLUMN);
        insta::assert_snapshot!(helper.formula(), @"=FLOOR.MATH(ROUND([@Return]/Bin_Width,9))");
        let f = |name| canonical_formula(e.formulas.get(name).unwrap());
        insta::assert_snapshot!(f(BIN_INDEX), @"=SEQUENCE(Bin_Count,1,Bin_First,1)");
        insta::assert_snapshot!(f(BIN_UPPER), @"=(Bin_Index+1)*Bin_Width");
        insta::assert_snapshot!(f(BIN_FREQUENCY), @"=COUNTIFS(tReturns[Bin],Bin_Index)");
        insta::assert_snapshot!(
            f(BIN_RELATIVE),
            @"=IF(SUM(Bin_Frequency)=0,0,Bin_Frequency/SUM(Bin_Frequency))"
        );
        insta::assert_snapshot!(
            f(BIN_LABEL),
            @r#"=TEXT(Bin_Lower,"0%")&" to "&TEXT(Bin_Upper,"0%")"#
        );
        assert!(e.formulas.undefined_names().is_empty());
        assert_eq!(counts(&e.preview), vec![1, 1]);
    }
}

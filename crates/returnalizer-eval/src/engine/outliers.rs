//! Tukey-fence outlier detection.

use chrono::NaiveDate;
use returnalizer_common::{AnalysisError, CalcError, ReturnSeries, StatId, Value};
use returnalizer_formula::ASTNode;

use super::stats::StatsOutput;
use crate::broadcast::BinaryOp;
use crate::builtins::Builtin;
use crate::derivation::{Derivation, FormulaMode, FormulaSet, ReturnsLayout, ValueMode};

pub const OUTLIER_MASK: &str = "Outlier_Mask";
pub const OUTLIER_COUNT: &str = "Outlier_Count";
pub const OUTLIER_ROWS: &str = "Outlier_Rows";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds<N> {
    pub lower: N,
    pub upper: N,
}

/// The derived outlier nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierNodes<N> {
    /// Per-return flag: 1 when outside the fences, 0 otherwise.
    pub mask: N,
    pub count: N,
    /// `(date, return)` rows of every outlier, in series order; empty text
    /// when there are none.
    pub rows: N,
}

impl<N> OutlierNodes<N> {
    pub fn map<U, F: FnMut(N) -> U>(self, mut f: F) -> OutlierNodes<U> {
        OutlierNodes {
            mask: f(self.mask),
            count: f(self.count),
            rows: f(self.rows),
        }
    }
}

/// A return is an outlier when strictly below `lower` or strictly above
/// `upper`; a value equal to a bound is not flagged.
pub fn derive_outliers<D: Derivation>(d: &mut D, bounds: OutlierBounds<D::Node>) -> OutlierNodes<D::Node> {
    let r = d.returns();
    let below = d.binary(BinaryOp::Lt, r.clone(), bounds.lower);
    let above = d.binary(BinaryOp::Gt, r, bounds.upper);
    let flags = d.add(below, above);
    let mask = d.define(OUTLIER_MASK, flags);
    let total = d.call(Builtin::Sum, vec![mask.clone()]);
    let count = d.define(OUTLIER_COUNT, total);
    let table = d.return_rows();
    let none = d.text("");
    let selected = d.call(Builtin::Filter, vec![table, mask.clone(), none]);
    let rows = d.define(OUTLIER_ROWS, selected);
    OutlierNodes { mask, count, rows }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierRecord {
    pub timestamp: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    pub bounds: OutlierBounds<f64>,
    pub records: Vec<OutlierRecord>,
}

impl OutlierReport {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Build from evaluated nodes.
    pub fn from_values(bounds: OutlierBounds<f64>, nodes: OutlierNodes<Value>) -> Result<Self, AnalysisError> {
        let records = match nodes.rows {
            Value::Array(rows) => rows
                .into_iter()
                .map(|row| match row.as_slice() {
                    [Value::Date(ts), Value::Number(v)] => Ok(OutlierRecord {
                        timestamp: *ts,
                        value: *v,
                    }),
                    [_, Value::Error(e)] | [Value::Error(e), _] => Err(AnalysisError::Calc(e.clone())),
                    other => Err(AnalysisError::Calc(
                        CalcError::new_value().with_message(format!("unexpected outlier row {other:?}")),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Text(t) if t.is_empty() => Vec::new(),
            Value::Error(e) => return Err(AnalysisError::Calc(e)),
            other => {
                return Err(AnalysisError::Calc(
                    CalcError::new_value().with_message(format!("unexpected outlier rows {other}")),
                ));
            }
        };
        if let Value::Number(n) = nodes.count.into_scalar() {
            debug_assert_eq!(n as usize, records.len());
        }
        Ok(Self { bounds, records })
    }
}

/// Recorded outlier formulas.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierExpressions {
    pub nodes: OutlierNodes<ASTNode>,
    pub formulas: FormulaSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutlierOutput {
    Records(OutlierReport),
    Expressions(OutlierExpressions),
}

/// Flag returns outside numeric fences (value mode).
pub fn flag_outliers(returns: &ReturnSeries, bounds: OutlierBounds<f64>) -> Result<OutlierReport, AnalysisError> {
    if returns.is_empty() {
        return Ok(OutlierReport {
            bounds,
            records: Vec::new(),
        });
    }
    let mut d = ValueMode::over_returns(returns.points());
    let nodes = derive_outliers(
        &mut d,
        OutlierBounds {
            lower: Value::Number(bounds.lower),
            upper: Value::Number(bounds.upper),
        },
    );
    OutlierReport::from_values(bounds, nodes)
}

/// Outliers against the fences of a computed statistics panel, in the
/// panel's mode: numeric fences flag records, expression fences produce
/// formulas that refer to `Stat_LowerBound` and `Stat_UpperBound`.
pub fn detect_outliers(returns: &ReturnSeries, stats: &StatsOutput) -> Result<OutlierOutput, AnalysisError> {
    let _span = tracing::debug_span!("detect_outliers", mode = %stats.mode(), n = returns.len()).entered();
    match stats {
        StatsOutput::Values(panel) => {
            let (Some(lower), Some(upper)) =
                (panel.value(StatId::LowerBound), panel.value(StatId::UpperBound))
            else {
                return Err(AnalysisError::EmptySeries);
            };
            let report = flag_outliers(returns, OutlierBounds { lower, upper })?;
            tracing::debug!(outliers = report.count(), lower, upper, "outliers flagged");
            Ok(OutlierOutput::Records(report))
        }
        StatsOutput::Expressions { .. } => {
            let mut d = FormulaMode::new(ReturnsLayout::default());
            let bounds = OutlierBounds {
                lower: ASTNode::name(StatId::LowerBound.defined_name()),
                upper: ASTNode::name(StatId::UpperBound.defined_name()),
            };
            let nodes = derive_outliers(&mut d, bounds);
            Ok(OutlierOutput::Expressions(OutlierExpressions {
                nodes,
                formulas: d.into_formulas(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::DerivationMode;
    use crate::engine::stats::{StatsOptions, compute_stats};
    use returnalizer_formula::canonical_formula;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn flags_strictly_outside_the_fences() {
        let returns = ReturnSeries::from_values(start(), &[-0.5, 0.0, 0.1, 0.2, 0.9]);
        let report = flag_outliers(&returns, OutlierBounds { lower: -0.2, upper: 0.5 }).unwrap();
        let flagged: Vec<f64> = report.records.iter().map(|r| r.value).collect();
        assert_eq!(flagged, vec![-0.5, 0.9]);
        assert_eq!(report.records[0].timestamp, start());
    }

    #[test]
    fn values_on_a_bound_are_not_outliers() {
        let returns = ReturnSeries::from_values(start(), &[-0.2, 0.5]);
        let report = flag_outliers(&returns, OutlierBounds { lower: -0.2, upper: 0.5 }).unwrap();
        assert_eq!(report.count(), 0);
    }

    #[test]
    fn identical_returns_have_no_outliers() {
        let returns = ReturnSeries::from_values(start(), &[0.03; 6]);
        let stats = compute_stats(&returns, DerivationMode::Value, &StatsOptions::default()).unwrap();
        match detect_outliers(&returns, &stats).unwrap() {
            OutlierOutput::Records(r) => assert!(r.records.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panel_fences_find_the_spike() {
        let returns = ReturnSeries::from_values(start(), &[0.01, 0.02, 0.015, -0.01, 0.0, 0.6]);
        let stats = compute_stats(&returns, DerivationMode::Value, &StatsOptions::default()).unwrap();
        let OutlierOutput::Records(report) = detect_outliers(&returns, &stats).unwrap() else {
            panic!("expected records");
        };
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].value, 0.6);
    }

    #[test]
    fn formula_mode_emits_mask_filter_and_count() {
        let returns = ReturnSeries::from_values(start(), &[0.1, 0.2]);
        let stats = compute_stats(&returns, DerivationMode::Formula, &StatsOptions::default()).unwrap();
        let OutlierOutput::Expressions(expr) = detect_outliers(&returns, &stats).unwrap() else {
            panic!("expected expressions");
        };
        let f = |name| canonical_formula(expr.formulas.get(name).unwrap());
        insta::assert_snapshot!(
            f(OUTLIER_MASK),
            @"=(tReturns[Return]<Stat_LowerBound)+(tReturns[Return]>Stat_UpperBound)"
        );
        insta::assert_snapshot!(f(OUTLIER_COUNT), @"=SUM(Outlier_Mask)");
        insta::assert_snapshot!(f(OUTLIER_ROWS), @r#"=FILTER(tReturns[[Date]:[Return]],Outlier_Mask,"")"#);
    }
}

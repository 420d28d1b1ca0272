//! Simple returns from consecutive prices.

use returnalizer_common::{AnalysisError, CalcError, PriceSeries, ReturnPoint, ReturnSeries, Value};
use returnalizer_formula::ASTNode;

use crate::derivation::{Derivation, FormulaMode, ReturnsLayout, ValueMode};

/// Return `i` (1-based over prices) is `price(i) / price(i - 1) - 1`.
///
/// Yields one node per consecutive pair, so `price_count - 1` nodes.
pub fn derive_returns<D: Derivation>(
    d: &mut D,
    price_count: usize,
) -> Result<Vec<D::Node>, AnalysisError> {
    if price_count < 2 {
        return Err(AnalysisError::InsufficientData { found: price_count });
    }
    Ok((1..price_count)
        .map(|i| {
            let current = d.price(i);
            let previous = d.price(i - 1);
            let ratio = d.div(current, previous);
            let one = d.number(1.0);
            d.sub(ratio, one)
        })
        .collect())
}

/// Value-mode returns, each stamped with the later price's timestamp.
///
/// A zero price makes the following return `#DIV/0!`, surfaced as
/// [`AnalysisError::Calc`].
pub fn compute_returns(prices: &PriceSeries) -> Result<ReturnSeries, AnalysisError> {
    let _span = tracing::debug_span!("compute_returns", prices = prices.len()).entered();
    let mut d = ValueMode::over_prices(prices.points());
    let nodes = derive_returns(&mut d, prices.len())?;
    let points = prices.points()[1..]
        .iter()
        .zip(nodes)
        .map(|(p, v)| match v {
            Value::Number(r) => Ok(ReturnPoint::new(p.timestamp, r)),
            Value::Error(e) => Err(AnalysisError::Calc(
                e.with_message(format!("return at {}", p.timestamp)),
            )),
            other => Err(AnalysisError::Calc(
                CalcError::new_value().with_message(format!("return at {} is {other}", p.timestamp)),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(returns = points.len(), "returns derived");
    Ok(ReturnSeries::from_points(points))
}

/// Per-row return expressions for a price series of `price_count`
/// observations; empty when fewer than two prices exist.
pub fn return_formulas(price_count: usize, layout: &ReturnsLayout) -> Vec<ASTNode> {
    let mut d = FormulaMode::new(layout.clone());
    derive_returns(&mut d, price_count).unwrap_or_default()
}

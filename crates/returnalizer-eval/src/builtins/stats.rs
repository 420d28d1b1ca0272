//! Statistical functions and the kernels behind them.
//!
//! The kernels are public so callers that already hold plain numbers (the
//! report layer's guards, tests) reuse exactly the arithmetic the formulas
//! perform.
//!
//! Notes:
//! - Numeric inputs are materialized into a `Vec<f64>` and sorted where order
//!   matters. Return series are small; no selection algorithm is needed.
//! - Errors encountered in any argument propagate immediately.
//! - Empty numeric sets produce spreadsheet-specific errors (`#DIV/0!` for
//!   AVERAGE and VAR.S with too few values, `#NUM!` for MEDIAN and the
//!   percentile family, `#N/A` for MODE.MULT).

use returnalizer_common::{CalcError, Value};

use super::utils::{collect_numbers, scalar_number, sorted};
use crate::function::{FnCaps, Function};

/// Two values closer than this count as the same value when finding modes.
pub const MODE_TOLERANCE: f64 = 1e-12;

/// Inclusive percentile with linear interpolation between closest ranks:
/// rank `p * (n - 1)`, 0-based, over ascending `sorted`.
pub fn percentile_inc(sorted: &[f64], p: f64) -> Result<f64, CalcError> {
    if sorted.is_empty() {
        return Err(CalcError::new_num());
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(CalcError::new_num());
    }
    if sorted.len() == 1 {
        return Ok(sorted[0]);
    }
    let n = sorted.len() as f64;
    let rank = p * (n - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Ok(sorted[lo]);
    }
    let frac = rank - (lo as f64);
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Arithmetic mean, summed left to right.
pub fn mean(nums: &[f64]) -> Result<f64, CalcError> {
    if nums.is_empty() {
        return Err(CalcError::new_div());
    }
    Ok(nums.iter().sum::<f64>() / nums.len() as f64)
}

/// Sample variance (`n - 1` denominator), two-pass.
pub fn sample_variance(nums: &[f64]) -> Result<f64, CalcError> {
    if nums.len() < 2 {
        return Err(CalcError::new_div());
    }
    let m = mean(nums)?;
    let ss: f64 = nums.iter().map(|x| (x - m) * (x - m)).sum();
    Ok(ss / (nums.len() - 1) as f64)
}

/// Every most-frequent value, ascending. Empty when no value repeats.
///
/// Values are grouped after sorting; a value joins the current group when
/// it lies within [`MODE_TOLERANCE`] of the group's first member, which is
/// also the value reported for the group.
pub fn modes(nums: &[f64]) -> Vec<f64> {
    let sorted = sorted(nums.to_vec());
    let mut groups: Vec<(f64, usize)> = Vec::new();
    for x in sorted {
        match groups.last_mut() {
            Some((first, count)) if (x - *first).abs() < MODE_TOLERANCE => *count += 1,
            _ => groups.push((x, 1)),
        }
    }
    let best = groups.iter().map(|(_, c)| *c).max().unwrap_or(0);
    if best < 2 {
        return Vec::new();
    }
    groups
        .into_iter()
        .filter(|(_, c)| *c == best)
        .map(|(v, _)| v)
        .collect()
}

#[derive(Debug)]
pub struct AverageFn;
impl Function for AverageFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "AVERAGE"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = collect_numbers(args)?;
        Ok(Value::Number(mean(&nums)?))
    }
}

/// Middle value of a data set.
///
/// # Remarks
/// - Evaluated as the inclusive 50th percentile, so MEDIAN and
///   `PERCENTILE.INC(x, 0.5)` agree bit for bit.
/// - Returns `#NUM!` for empty numeric input.
#[derive(Debug)]
pub struct MedianFn;
impl Function for MedianFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "MEDIAN"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = sorted(collect_numbers(args)?);
        Ok(Value::Number(percentile_inc(&nums, 0.5)?))
    }
}

/// Every most-frequent value as a vertical array, ascending.
///
/// # Remarks
/// - Returns `#N/A` when no value occurs more than once.
#[derive(Debug)]
pub struct ModeMultFn;
impl Function for ModeMultFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY | FnCaps::DYNAMIC_ARRAY
    }
    fn name(&self) -> &'static str {
        "MODE.MULT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = collect_numbers(args)?;
        let found = modes(&nums);
        if found.is_empty() {
            return Err(CalcError::new_na().with_message("no repeated value"));
        }
        Ok(Value::column(found))
    }
}

/// MIN and MAX return 0 for an empty numeric set, like a spreadsheet.
#[derive(Debug)]
pub struct MinFn;
impl Function for MinFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "MIN"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = collect_numbers(args)?;
        Ok(Value::Number(nums.into_iter().reduce(f64::min).unwrap_or(0.0)))
    }
}

#[derive(Debug)]
pub struct MaxFn;
impl Function for MaxFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "MAX"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = collect_numbers(args)?;
        Ok(Value::Number(nums.into_iter().reduce(f64::max).unwrap_or(0.0)))
    }
}

/// Sample variance. `#DIV/0!` with fewer than two numbers.
#[derive(Debug)]
pub struct VarSFn;
impl Function for VarSFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "VAR.S"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["VAR"]
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = collect_numbers(args)?;
        Ok(Value::Number(sample_variance(&nums)?))
    }
}

/// Returns the k-th percentile of a data set using inclusive interpolation.
///
/// # Remarks
/// - `k` must satisfy `0 <= k <= 1`, otherwise `#NUM!`.
/// - Returns `#NUM!` for empty numeric input.
#[derive(Debug)]
pub struct PercentileIncFn;
impl Function for PercentileIncFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "PERCENTILE.INC"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["PERCENTILE"]
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let p = scalar_number(&args[1]).map_err(|_| CalcError::new_num())?;
        let nums = sorted(collect_numbers(&args[..1])?);
        Ok(Value::Number(percentile_inc(&nums, p)?))
    }
}

/// Inclusive quartile: `QUARTILE.INC(x, q)` is `PERCENTILE.INC(x, q / 4)`.
///
/// # Remarks
/// - `q` is truncated to an integer and must lie in `0..=4`, otherwise `#NUM!`.
#[derive(Debug)]
pub struct QuartileIncFn;
impl Function for QuartileIncFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "QUARTILE.INC"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["QUARTILE"]
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let q = scalar_number(&args[1]).map_err(|_| CalcError::new_num())?.trunc();
        if !(0.0..=4.0).contains(&q) {
            return Err(CalcError::new_num());
        }
        let nums = sorted(collect_numbers(&args[..1])?);
        Ok(Value::Number(percentile_inc(&nums, q / 4.0)?))
    }
}

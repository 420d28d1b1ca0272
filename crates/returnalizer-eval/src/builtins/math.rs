use returnalizer_common::{CalcError, CalcErrorKind, Value};

use super::utils::{collect_numbers, normalize_zero, scalar_number};
use crate::function::{FnCaps, Function};

/// Largest array SEQUENCE will materialize.
pub const MAX_SEQUENCE_CELLS: usize = 1 << 20;

/// Round half away from zero to `digits` decimal places (negative `digits`
/// rounds to tens, hundreds, ...).
pub fn round_half_away(x: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits.abs());
    let r = if digits >= 0 {
        (x * factor).round() / factor
    } else {
        (x / factor).round() * factor
    };
    normalize_zero(r)
}

/// Round down to a multiple of `significance`. Negative numbers round away
/// from zero unless `mode` is non-zero.
pub fn floor_math(x: f64, significance: f64, mode: f64) -> f64 {
    let sig = significance.abs();
    if sig == 0.0 {
        return 0.0;
    }
    let q = x / sig;
    let r = if x < 0.0 && mode != 0.0 {
        q.ceil() * sig
    } else {
        q.floor() * sig
    };
    normalize_zero(r)
}

#[derive(Debug)]
pub struct SumFn;
impl Function for SumFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::REDUCTION | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "SUM"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let nums = collect_numbers(args)?;
        Ok(Value::Number(nums.iter().sum()))
    }
}

#[derive(Debug)]
pub struct SqrtFn;
impl Function for SqrtFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "SQRT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let x = scalar_number(&args[0])?;
        if x < 0.0 {
            return Err(CalcError::new_num());
        }
        Ok(Value::Number(x.sqrt()))
    }
}

#[derive(Debug)]
pub struct RoundFn;
impl Function for RoundFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "ROUND"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let x = scalar_number(&args[0])?;
        let digits = scalar_number(&args[1])?.trunc() as i32;
        Ok(Value::Number(round_half_away(x, digits)))
    }
}

/// `FLOOR.MATH(number, [significance], [mode])`.
#[derive(Debug)]
pub struct FloorMathFn;
impl Function for FloorMathFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE | FnCaps::NUMERIC_ONLY
    }
    fn name(&self) -> &'static str {
        "FLOOR.MATH"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let x = scalar_number(&args[0])?;
        let sig = args.get(1).map(scalar_number).transpose()?.unwrap_or(1.0);
        let mode = args.get(2).map(scalar_number).transpose()?.unwrap_or(0.0);
        Ok(Value::Number(floor_math(x, sig, mode)))
    }
}

/// `SEQUENCE(rows, [columns], [start], [step])`.
///
/// Cell `k` (row-major) is `start + k * step`, so integer sequences are exact.
#[derive(Debug)]
pub struct SequenceFn;
impl Function for SequenceFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::DYNAMIC_ARRAY
    }
    fn name(&self) -> &'static str {
        "SEQUENCE"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let rows = scalar_number(&args[0])?.trunc();
        let cols = args.get(1).map(scalar_number).transpose()?.unwrap_or(1.0).trunc();
        let start = args.get(2).map(scalar_number).transpose()?.unwrap_or(1.0);
        let step = args.get(3).map(scalar_number).transpose()?.unwrap_or(1.0);
        if rows < 1.0 || cols < 1.0 {
            return Err(CalcError::new(CalcErrorKind::Calc).with_message("SEQUENCE needs at least one cell"));
        }
        if rows * cols > MAX_SEQUENCE_CELLS as f64 {
            return Err(CalcError::new_num().with_message("SEQUENCE too large"));
        }
        let (rows, cols) = (rows as usize, cols as usize);
        let out = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| Value::Number(start + (r * cols + c) as f64 * step))
                    .collect()
            })
            .collect();
        Ok(Value::Array(out))
    }
}

use returnalizer_common::{CalcError, Value};

use crate::broadcast::{date_serial, to_number};

/// Collect numeric inputs with statistical semantics:
/// - array arguments contribute only their numeric cells; text, logical and
///   blank cells are skipped,
/// - direct scalar arguments coerce (`TRUE` counts as 1, numeric text parses),
///   non-numeric text is ignored.
///
/// Errors anywhere propagate immediately.
pub(crate) fn collect_numbers(args: &[Value]) -> Result<Vec<f64>, CalcError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Value::Array(_) => {
                for cell in arg.cells() {
                    match cell {
                        Value::Number(n) => out.push(*n),
                        Value::Date(d) => out.push(date_serial(*d)),
                        Value::Error(e) => return Err(e.clone()),
                        _ => {}
                    }
                }
            }
            Value::Error(e) => return Err(e.clone()),
            Value::Empty => {}
            other => {
                if let Ok(n) = to_number(other) {
                    out.push(n);
                }
            }
        }
    }
    Ok(out)
}

/// A single numeric argument. `1 × 1` arrays unwrap; wider arrays are `#VALUE!`.
pub(crate) fn scalar_number(arg: &Value) -> Result<f64, CalcError> {
    match arg {
        Value::Array(_) if arg.dimensions() == (1, 1) => scalar_number(&arg.clone().into_scalar()),
        Value::Array(_) => Err(CalcError::new_value().with_message("expected a single value")),
        other => to_number(other),
    }
}

/// Ascending copy using IEEE total order (inputs are finite in practice).
pub(crate) fn sorted(mut nums: Vec<f64>) -> Vec<f64> {
    nums.sort_by(f64::total_cmp);
    nums
}

/// `-0.0` becomes `0.0`; everything else passes through.
pub(crate) fn normalize_zero(n: f64) -> f64 {
    if n == 0.0 { 0.0 } else { n }
}

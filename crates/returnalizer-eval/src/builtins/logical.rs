use returnalizer_common::{CalcError, Value};

use crate::broadcast;
use crate::function::{FnCaps, Function};

/* ─────────────────────────── IF() ───────────────────────────────── */

/// `IF(condition, value_if_true, [value_if_false])`.
///
/// A scalar condition selects a whole branch (arrays included); an array
/// condition selects per cell.
#[derive(Debug)]
pub struct IfFn;
impl Function for IfFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ERROR_AWARE
    }
    fn name(&self) -> &'static str {
        "IF"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let otherwise = args.get(2).cloned().unwrap_or(Value::Boolean(false));
        match &args[0] {
            Value::Array(_) => {
                let lifted = [args[0].clone(), args[1].clone(), otherwise];
                broadcast::lift(&lifted, |s| pick(&s[0], &s[1], &s[2]))
            }
            cond => pick(cond, &args[1], &otherwise),
        }
    }
}

fn pick(cond: &Value, then: &Value, otherwise: &Value) -> Result<Value, CalcError> {
    match cond {
        Value::Error(e) => Err(e.clone()),
        Value::Text(_) => Err(CalcError::new_value()),
        c if c.is_truthy() => Ok(then.clone()),
        _ => Ok(otherwise.clone()),
    }
}

/* ─────────────────────────── IFERROR() ──────────────────────────── */

/// `IFERROR(value, value_if_error)`, applied per cell when `value` is an array.
#[derive(Debug)]
pub struct IfErrorFn;
impl Function for IfErrorFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ERROR_AWARE
    }
    fn name(&self) -> &'static str {
        "IFERROR"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        match &args[0] {
            Value::Array(rows) => Ok(Value::Array(
                rows.iter()
                    .map(|row| {
                        row.iter()
                            .map(|cell| {
                                if cell.is_error() {
                                    args[1].clone()
                                } else {
                                    cell.clone()
                                }
                            })
                            .collect()
                    })
                    .collect(),
            )),
            Value::Error(_) => Ok(args[1].clone()),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use returnalizer_common::CalcErrorKind;

    #[test]
    fn scalar_condition_returns_whole_branch() {
        let branch = Value::column([0.25, 0.75]);
        let v = IfFn.dispatch(&[Value::Boolean(false), Value::Number(0.0), branch.clone()]);
        assert_eq!(v, branch);
    }

    #[test]
    fn unselected_error_branch_is_ignored() {
        let v = IfFn.dispatch(&[
            Value::Boolean(true),
            Value::Number(0.0),
            Value::Error(CalcError::new_div()),
        ]);
        assert_eq!(v, Value::Number(0.0));
    }

    #[test]
    fn array_condition_selects_per_cell() {
        let cond = Value::Array(vec![vec![Value::Boolean(true)], vec![Value::Boolean(false)]]);
        let v = IfFn.dispatch(&[cond, Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(v, Value::column([1.0, 2.0]));
    }

    #[test]
    fn iferror_replaces_errors() {
        let v = IfErrorFn.dispatch(&[Value::Error(CalcError::new_na()), Value::Number(7.0)]);
        assert_eq!(v, Value::Number(7.0));
        let v = IfErrorFn.dispatch(&[Value::Number(3.0), Value::Number(7.0)]);
        assert_eq!(v, Value::Number(3.0));
        let cond = IfFn.dispatch(&[Value::Error(CalcError::new_num()), Value::Number(1.0)]);
        assert_eq!(cond.as_error().map(|e| e.kind), Some(CalcErrorKind::Num));
    }
}

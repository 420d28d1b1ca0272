//! Operator semantics shared by both derivation modes.
//!
//! Scalars combine directly. Arrays combine cell by cell; a dimension of
//! length one stretches to match the other operand, any other mismatch
//! yields `#N/A` in the cells that have no partner.

use chrono::{Datelike, NaiveDate};
use returnalizer_common::{CalcError, Value};
use std::cmp::Ordering;

/// `num_days_from_ce` of 1899-12-30, the spreadsheet date epoch.
const SERIAL_EPOCH_DAYS: i32 = 693_594;

/// Infix operators of the formula language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "^" => BinaryOp::Pow,
            "&" => BinaryOp::Concat,
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Apply `op` to two values, broadcasting over arrays.
pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Array(_), _) | (_, Value::Array(_)) => {
            let (rows, cols) = broadcast_shape([left, right]);
            let out = (0..rows)
                .map(|r| {
                    (0..cols)
                        .map(|c| match (cell_at(left, r, c), cell_at(right, r, c)) {
                            (Some(l), Some(rr)) => scalar_binary(op, l, rr),
                            _ => Value::Error(CalcError::new_na()),
                        })
                        .collect()
                })
                .collect();
            Value::Array(out)
        }
        _ => scalar_binary(op, left, right),
    }
}

/// Call `f` once per cell of the broadcast shape of `args`, passing the
/// scalar at that position of every argument.
pub fn lift<F>(args: &[Value], f: F) -> Result<Value, CalcError>
where
    F: Fn(&[Value]) -> Result<Value, CalcError>,
{
    let (rows, cols) = broadcast_shape(args.iter());
    let mut out = Vec::with_capacity(rows);
    let mut scalars = Vec::with_capacity(args.len());
    for r in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for c in 0..cols {
            scalars.clear();
            let mut missing = false;
            for a in args {
                match cell_at(a, r, c) {
                    Some(v) => scalars.push(v.clone()),
                    None => missing = true,
                }
            }
            let cell = if missing {
                Value::Error(CalcError::new_na())
            } else {
                f(&scalars).map_or_else(Value::Error, Value::into_scalar)
            };
            row.push(cell);
        }
        out.push(row);
    }
    Ok(Value::Array(out))
}

fn broadcast_shape<'a, I>(values: I) -> (usize, usize)
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut rows = 1;
    let mut cols = 1;
    let mut any_empty = false;
    for v in values {
        if let Value::Array(_) = v {
            let (r, c) = v.dimensions();
            if r == 0 || c == 0 {
                any_empty = true;
            }
            rows = rows.max(r);
            cols = cols.max(c);
        }
    }
    if any_empty { (0, 0) } else { (rows, cols) }
}

fn cell_at(value: &Value, r: usize, c: usize) -> Option<&Value> {
    match value {
        Value::Array(rows) => {
            let (nr, nc) = value.dimensions();
            let ri = if nr == 1 { 0 } else { r };
            let ci = if nc == 1 { 0 } else { c };
            rows.get(ri).and_then(|row| row.get(ci))
        }
        scalar => Some(scalar),
    }
}

fn scalar_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if let Value::Error(e) = left {
        return Value::Error(e.clone());
    }
    if let Value::Error(e) = right {
        return Value::Error(e.clone());
    }
    if op == BinaryOp::Concat {
        return Value::Text(format!("{}{}", to_text(left), to_text(right)));
    }
    if op.is_comparison() {
        let ord = compare(left, right);
        return Value::Boolean(match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Ne => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        });
    }
    let (l, r) = match (to_number(left), to_number(right)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Value::Error(CalcError::new_div());
            }
            l / r
        }
        _ => l.powf(r),
    };
    if result.is_finite() {
        Value::Number(result)
    } else {
        Value::Error(CalcError::new_num())
    }
}

/// Spreadsheet serial number of a date (1900 date system).
pub fn date_serial(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - SERIAL_EPOCH_DAYS)
}

/// Numeric coercion used by arithmetic: blanks are zero, booleans are 1/0,
/// numeric text parses, anything else is `#VALUE!`.
pub fn to_number(value: &Value) -> Result<f64, CalcError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Empty => Ok(0.0),
        Value::Date(d) => Ok(date_serial(*d)),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CalcError::new_value().with_message(format!("cannot use {s:?} as a number"))),
        Value::Error(e) => Err(e.clone()),
        Value::Array(_) => Err(CalcError::new_value()),
    }
}

/// Text coercion used by `&`.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        other => other.to_string(),
    }
}

// numbers < text < booleans; blanks compare as the zero of the other side
fn rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) | Value::Date(_) => 0,
        Value::Text(_) => 1,
        Value::Boolean(_) => 2,
        _ => 3,
    }
}

fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Empty, Value::Empty) => Ordering::Equal,
        (Value::Empty, other) => compare(&blank_like(other), other),
        (other, Value::Empty) => compare(other, &blank_like(other)),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (a, b) if rank(a) == 0 && rank(b) == 0 => {
            let (x, y) = (to_number(a).unwrap_or(0.0), to_number(b).unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (a, b) => rank(a).cmp(&rank(b)),
    }
}

fn blank_like(other: &Value) -> Value {
    match other {
        Value::Text(_) => Value::Text(String::new()),
        Value::Boolean(_) => Value::Boolean(false),
        _ => Value::Number(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use returnalizer_common::CalcErrorKind;

    #[test]
    fn division_by_zero_is_an_error_value() {
        let v = binary_op(BinaryOp::Div, &Value::Number(1.0), &Value::Number(0.0));
        assert_eq!(v, Value::Error(CalcError::new_div()));
    }

    #[test]
    fn array_scalar_broadcasts() {
        let col = Value::column([0.1, -0.3, 0.5]);
        let lt = binary_op(BinaryOp::Lt, &col, &Value::Number(0.0));
        assert_eq!(
            lt,
            Value::Array(vec![
                vec![Value::Boolean(false)],
                vec![Value::Boolean(true)],
                vec![Value::Boolean(false)],
            ])
        );
    }

    #[test]
    fn boolean_masks_add_to_counts() {
        let a = Value::Array(vec![vec![Value::Boolean(true)], vec![Value::Boolean(false)]]);
        let b = Value::Array(vec![vec![Value::Boolean(false)], vec![Value::Boolean(false)]]);
        assert_eq!(binary_op(BinaryOp::Add, &a, &b), Value::column([1.0, 0.0]));
    }

    #[test]
    fn mismatched_lengths_pad_with_na() {
        let a = Value::column([1.0, 2.0, 3.0]);
        let b = Value::column([1.0, 2.0]);
        let Value::Array(rows) = binary_op(BinaryOp::Mul, &a, &b) else {
            panic!("expected array");
        };
        assert_eq!(rows[1][0], Value::Number(4.0));
        assert_eq!(rows[2][0].as_error().map(|e| e.kind), Some(CalcErrorKind::Na));
    }

    #[test]
    fn errors_propagate_left_first() {
        let l = Value::Error(CalcError::new_num());
        let r = Value::Error(CalcError::new_div());
        assert_eq!(binary_op(BinaryOp::Add, &l, &r), l);
    }

    #[test]
    fn concatenation_and_text_comparison() {
        let v = binary_op(BinaryOp::Concat, &Value::Text("0%".into()), &Value::Text(" to ".into()));
        assert_eq!(v, Value::Text("0% to ".into()));
        let eq = binary_op(BinaryOp::Eq, &Value::Text("Abc".into()), &Value::Text("aBC".into()));
        assert_eq!(eq, Value::Boolean(true));
    }

    #[test]
    fn date_serials_match_the_1900_system() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(date_serial(d), 45292.0);
    }

    #[test]
    fn lift_applies_per_cell() {
        let col = Value::column([1.0, 4.0]);
        let out = lift(&[col, Value::Number(1.0)], |s| {
            Ok(Value::Number(to_number(&s[0])? + to_number(&s[1])?))
        })
        .unwrap();
        assert_eq!(out, Value::column([2.0, 5.0]));
    }
}

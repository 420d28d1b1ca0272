//! Range shape, row selection and conditional counting.

use returnalizer_common::{CalcError, CalcErrorKind, Value};

use crate::broadcast::{self, BinaryOp};
use crate::function::{FnCaps, Function};

#[derive(Debug)]
pub struct RowsFn;
impl Function for RowsFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::LOOKUP
    }
    fn name(&self) -> &'static str {
        "ROWS"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        match &args[0] {
            Value::Error(e) => Err(e.clone()),
            v => Ok(Value::Number(v.dimensions().0 as f64)),
        }
    }
}

/// `FILTER(array, include, [if_empty])`.
///
/// # Remarks
/// - `include` must be a single column with one entry per row of `array`,
///   otherwise `#VALUE!`.
/// - An error inside `include` propagates.
/// - No surviving rows returns `if_empty`, or `#CALC!` when it is omitted.
#[derive(Debug)]
pub struct FilterFn;
impl Function for FilterFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::LOOKUP | FnCaps::DYNAMIC_ARRAY
    }
    fn name(&self) -> &'static str {
        "FILTER"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        if let Value::Error(e) = &args[0] {
            return Err(e.clone());
        }
        if let Value::Error(e) = &args[1] {
            return Err(e.clone());
        }
        let rows: Vec<Vec<Value>> = match &args[0] {
            Value::Array(rows) => rows.clone(),
            scalar => vec![vec![scalar.clone()]],
        };
        let (n, width) = args[1].dimensions();
        if width != 1 || n != rows.len() {
            return Err(CalcError::new_value().with_message("FILTER include must match the array rows"));
        }
        let mut kept = Vec::new();
        for (row, flag) in rows.into_iter().zip(args[1].cells()) {
            if let Value::Error(e) = flag {
                return Err(e.clone());
            }
            if flag.is_truthy() {
                kept.push(row);
            }
        }
        if kept.is_empty() {
            return match args.get(2) {
                Some(fallback) => Ok(fallback.clone()),
                None => Err(CalcError::new(CalcErrorKind::Calc).with_message("FILTER matched no rows")),
            };
        }
        Ok(Value::Array(kept))
    }
}

/// A parsed COUNTIFS criterion: an operator and the operand it compares to.
#[derive(Debug, Clone, PartialEq)]
struct Criterion {
    op: BinaryOp,
    operand: Value,
}

impl Criterion {
    fn parse(v: &Value) -> Result<Self, CalcError> {
        match v {
            Value::Error(e) => Err(e.clone()),
            Value::Text(s) => {
                let (op, rest) = [
                    (">=", BinaryOp::Ge),
                    ("<=", BinaryOp::Le),
                    ("<>", BinaryOp::Ne),
                    (">", BinaryOp::Gt),
                    ("<", BinaryOp::Lt),
                    ("=", BinaryOp::Eq),
                ]
                .into_iter()
                .find_map(|(prefix, op)| s.strip_prefix(prefix).map(|rest| (op, rest)))
                .unwrap_or((BinaryOp::Eq, s.as_str()));
                let operand = match rest.trim().parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::Text(rest.to_string()),
                };
                Ok(Self { op, operand })
            }
            other => Ok(Self {
                op: BinaryOp::Eq,
                operand: other.clone(),
            }),
        }
    }

    /// Numeric criteria only match numeric cells (except `<>`).
    fn matches(&self, cell: &Value) -> bool {
        let numeric_operand = matches!(self.operand, Value::Number(_) | Value::Date(_));
        let numeric_cell = matches!(cell, Value::Number(_) | Value::Date(_));
        if numeric_operand && !numeric_cell {
            return self.op == BinaryOp::Ne;
        }
        if cell.is_error() {
            return false;
        }
        broadcast::binary_op(self.op, cell, &self.operand).is_truthy()
    }
}

/// `COUNTIFS(range1, criteria1, [range2, criteria2], ...)`.
///
/// # Remarks
/// - All ranges must share one shape, otherwise `#VALUE!`.
/// - Array criteria produce an array of counts, one per criterion cell.
#[derive(Debug)]
pub struct CountIfsFn;
impl Function for CountIfsFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::LOOKUP | FnCaps::REDUCTION
    }
    fn name(&self) -> &'static str {
        "COUNTIFS"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        None
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        if args.len() % 2 != 0 {
            return Err(CalcError::new_value().with_message("COUNTIFS takes range/criteria pairs"));
        }
        let ranges: Vec<&Value> = args.iter().step_by(2).collect();
        let criteria: Vec<Value> = args.iter().skip(1).step_by(2).cloned().collect();
        let shape = ranges[0].dimensions();
        for r in &ranges {
            if let Value::Error(e) = r {
                return Err(e.clone());
            }
            if r.dimensions() != shape {
                return Err(CalcError::new_value().with_message("COUNTIFS ranges differ in shape"));
            }
        }
        let count = |crits: &[Value]| -> Result<Value, CalcError> {
            let parsed = crits.iter().map(Criterion::parse).collect::<Result<Vec<_>, _>>()?;
            let mut cells: Vec<_> = ranges.iter().map(|r| (*r).cells()).collect();
            let mut n = 0usize;
            'rows: loop {
                let mut all = true;
                for (it, crit) in cells.iter_mut().zip(&parsed) {
                    match it.next() {
                        Some(cell) => all &= crit.matches(cell),
                        None => break 'rows,
                    }
                }
                if all {
                    n += 1;
                }
            }
            Ok(Value::Number(n as f64))
        };
        if criteria.iter().any(|c| matches!(c, Value::Array(_))) {
            broadcast::lift(&criteria, count)
        } else {
            count(&criteria)
        }
    }
}

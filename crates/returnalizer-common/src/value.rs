use chrono::NaiveDate;
use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::CalcError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An **interpreter** value. Both derivation modes compute with this type:
/// value mode holds it directly, formula mode produces it when the recorded
/// expressions are evaluated.
///
/// Arrays are row-major (`rows[r][c]`); a column of returns is an `n × 1` array.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Text(String),
    Date(NaiveDate),
    Array(Vec<Vec<Value>>),
    Empty,
    Error(CalcError),
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Number(n) => n.to_bits().hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Array(a) => a.hash(state),
            Value::Empty => state.write_u8(0),
            Value::Error(e) => e.hash(state),
        }
    }
}

impl Eq for Value {}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Array(a) => write!(f, "{a:?}"),
            Value::Empty => write!(f, ""),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

impl From<CalcError> for Value {
    fn from(error: CalcError) -> Self {
        Value::Error(error)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl Value {
    /// Build an `n × 1` array from a sequence of numbers.
    pub fn column<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Value::Array(
            values
                .into_iter()
                .map(|n| vec![Value::Number(n)])
                .collect(),
        )
    }

    /// `(rows, cols)`; scalars are `1 × 1`.
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            Value::Array(rows) => (rows.len(), rows.first().map_or(0, |r| r.len())),
            _ => (1, 1),
        }
    }

    /// Numeric view of a scalar. Booleans count as 1/0, like a spreadsheet.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&CalcError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Row-major iterator over every cell; a scalar yields itself once.
    pub fn cells(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Value::Array(rows) => Box::new(rows.iter().flat_map(|r| r.iter())),
            other => Box::new(std::iter::once(other)),
        }
    }

    /// Collapse a `1 × 1` array to its only cell; other values pass through.
    pub fn into_scalar(self) -> Value {
        match self {
            Value::Array(mut rows) if rows.len() == 1 && rows[0].len() == 1 => {
                rows.remove(0).remove(0)
            }
            other => other,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Date(_) => true,
            Value::Empty => false,
            Value::Error(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CalcErrorKind;

    #[test]
    fn column_builds_n_by_one() {
        let v = Value::column([0.1, -0.2, 0.3]);
        assert_eq!(v.dimensions(), (3, 1));
        let nums: Vec<f64> = v.cells().filter_map(Value::as_number).collect();
        assert_eq!(nums, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn into_scalar_unwraps_single_cell_only() {
        let single = Value::Array(vec![vec![Value::Number(2.0)]]);
        assert_eq!(single.into_scalar(), Value::Number(2.0));
        let wide = Value::column([1.0, 2.0]);
        assert_eq!(wide.clone().into_scalar(), wide);
    }

    #[test]
    fn errors_display_as_spreadsheet_codes() {
        let v = Value::from(CalcError::new(CalcErrorKind::Div));
        assert_eq!(v.to_string(), "#DIV/0!");
        assert!(v.is_error());
        assert!(!v.is_truthy());
    }
}

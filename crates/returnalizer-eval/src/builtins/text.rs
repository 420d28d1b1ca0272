use returnalizer_common::{CalcError, Value};

use super::math::round_half_away;
use super::utils::normalize_zero;
use crate::function::{FnCaps, Function};

/// A parsed numeric format: `0`, `0.00`, `#,##0.0`, `0%`, `0.00%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumberFormat {
    decimals: usize,
    percent: bool,
    grouping: bool,
}

impl NumberFormat {
    fn parse(fmt: &str) -> Option<Self> {
        let (body, percent) = match fmt.strip_suffix('%') {
            Some(b) => (b, true),
            None => (fmt, false),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty()
            || !int_part.chars().all(|c| matches!(c, '0' | '#' | ','))
            || !frac_part.chars().all(|c| c == '0')
        {
            return None;
        }
        Some(Self {
            decimals: frac_part.len(),
            percent,
            grouping: int_part.contains(','),
        })
    }

    fn apply(&self, x: f64) -> String {
        let scaled = if self.percent { x * 100.0 } else { x };
        let rounded = normalize_zero(round_half_away(scaled, self.decimals as i32));
        let mut s = format!("{:.*}", self.decimals, rounded);
        if self.grouping {
            s = group_thousands(&s);
        }
        if self.percent {
            s.push('%');
        }
        s
    }
}

fn group_thousands(s: &str) -> String {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", s),
    };
    let (int_part, rest) = match digits.find('.') {
        Some(i) => digits.split_at(i),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}{rest}")
}

/// Renders a date with `yyyy`, `mm` and `dd` tokens.
fn format_date(date: chrono::NaiveDate, fmt: &str) -> String {
    let pattern = fmt
        .to_ascii_lowercase()
        .replace("yyyy", "%Y")
        .replace("mm", "%m")
        .replace("dd", "%d");
    date.format(&pattern).to_string()
}

/// `TEXT(value, format_text)`.
///
/// # Remarks
/// - Numeric formats round half away from zero and never print `-0`.
/// - Dates accept `yyyy`, `mm` and `dd` tokens.
/// - Text passes through unchanged; unsupported formats are `#VALUE!`.
#[derive(Debug)]
pub struct TextFn;
impl Function for TextFn {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE | FnCaps::ELEMENTWISE
    }
    fn name(&self) -> &'static str {
        "TEXT"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn eval(&self, args: &[Value]) -> Result<Value, CalcError> {
        let fmt = match &args[1] {
            Value::Text(s) => s.clone(),
            Value::Error(e) => return Err(e.clone()),
            other => other.to_string(),
        };
        let out = match &args[0] {
            Value::Error(e) => return Err(e.clone()),
            Value::Text(s) => s.clone(),
            Value::Date(d) if fmt.to_ascii_lowercase().contains('y') => format_date(*d, &fmt),
            other => {
                let x = crate::broadcast::to_number(other)?;
                let parsed = NumberFormat::parse(&fmt).ok_or_else(|| {
                    CalcError::new_value().with_message(format!("unsupported format {fmt:?}"))
                })?;
                parsed.apply(x)
            }
        };
        Ok(Value::Text(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(v: f64, fmt: &str) -> Value {
        TextFn.dispatch(&[Value::Number(v), Value::Text(fmt.into())])
    }

    #[test]
    fn percent_formats() {
        assert_eq!(text(-0.1, "0%"), Value::Text("-10%".into()));
        assert_eq!(text(0.3, "0%"), Value::Text("30%".into()));
        assert_eq!(text(0.012345, "0.00%"), Value::Text("1.23%".into()));
        assert_eq!(text(0.00125, "0.0%"), Value::Text("0.1%".into()));
    }

    #[test]
    fn negative_zero_is_never_printed() {
        assert_eq!(text(-0.0, "0%"), Value::Text("0%".into()));
        assert_eq!(text(-0.00001, "0.00%"), Value::Text("0.00%".into()));
    }

    #[test]
    fn integer_and_grouped_formats() {
        assert_eq!(text(36.0, "0"), Value::Text("36".into()));
        assert_eq!(text(1234567.891, "#,##0.00"), Value::Text("1,234,567.89".into()));
    }

    #[test]
    fn dates_and_unsupported_formats() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            TextFn.dispatch(&[d, Value::Text("yyyy-mm-dd".into())]),
            Value::Text("2024-03-01".into())
        );
        assert!(text(1.0, "General").is_error());
    }

    #[test]
    fn lifts_over_arrays() {
        let v = TextFn.dispatch(&[Value::column([0.0, 0.1]), Value::Text("0%".into())]);
        assert_eq!(
            v,
            Value::Array(vec![
                vec![Value::Text("0%".into())],
                vec![Value::Text("10%".into())],
            ])
        );
    }
}

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a statistic should be displayed. Never affects computation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// An integral count (`0`).
    Count,
    /// A return-scale figure, rendered as a percentage (`0.00%`).
    Ratio,
    /// A plain number (`0.000000`).
    Raw,
}

/// Identifier of one entry of the descriptive-statistics panel.
///
/// Declaration order is panel order; percentiles sort by level among themselves.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatId {
    Count,
    Mean,
    Median,
    Mode,
    Range,
    Variance,
    StdDev,
    /// Inclusive percentile, level in basis points (`2000` = 20th percentile).
    Percentile(u16),
    Min,
    Q1,
    Q3,
    Max,
    Iqr,
    LowerBound,
    UpperBound,
}

impl StatId {
    /// Percentile identifier for a level in `[0, 1]`, rounded to a basis point.
    pub fn percentile(p: f64) -> Self {
        StatId::Percentile((p.clamp(0.0, 1.0) * 10_000.0).round() as u16)
    }

    /// Level of a percentile identifier as a fraction.
    pub fn percentile_level(&self) -> Option<f64> {
        match self {
            StatId::Percentile(bp) => Some(f64::from(*bp) / 10_000.0),
            _ => None,
        }
    }

    pub fn kind(&self) -> StatKind {
        match self {
            StatId::Count => StatKind::Count,
            StatId::Variance => StatKind::Raw,
            _ => StatKind::Ratio,
        }
    }

    /// Row label used by the report.
    pub fn label(&self) -> String {
        match self {
            StatId::Count => "Count (months)".into(),
            StatId::Mean => "Mean (monthly)".into(),
            StatId::Median => "Median".into(),
            StatId::Mode => "Mode".into(),
            StatId::Range => "Range".into(),
            StatId::Variance => "Variance (sample)".into(),
            StatId::StdDev => "Std Dev (sample)".into(),
            StatId::Percentile(bp) => format!("{} percentile", ordinal(*bp)),
            StatId::Min => "Min".into(),
            StatId::Q1 => "Q1".into(),
            StatId::Q3 => "Q3".into(),
            StatId::Max => "Max".into(),
            StatId::Iqr => "IQR (Q3 - Q1)".into(),
            StatId::LowerBound => "Lower bound (IQR)".into(),
            StatId::UpperBound => "Upper bound (IQR)".into(),
        }
    }

    /// Workbook-level defined name. The `Stat_` prefix keeps names like `Q1`
    /// from colliding with A1-style cell addresses.
    pub fn defined_name(&self) -> String {
        let short = match self {
            StatId::Count => "Count".to_string(),
            StatId::Mean => "Mean".to_string(),
            StatId::Median => "Median".to_string(),
            StatId::Mode => "Mode".to_string(),
            StatId::Range => "Range".to_string(),
            StatId::Variance => "Variance".to_string(),
            StatId::StdDev => "StdDev".to_string(),
            StatId::Percentile(bp) => {
                let whole = bp / 100;
                let frac = bp % 100;
                if frac == 0 {
                    format!("P{whole}")
                } else {
                    format!("P{whole}_{frac:02}")
                }
            }
            StatId::Min => "Min".to_string(),
            StatId::Q1 => "Q1".to_string(),
            StatId::Q3 => "Q3".to_string(),
            StatId::Max => "Max".to_string(),
            StatId::Iqr => "IQR".to_string(),
            StatId::LowerBound => "LowerBound".to_string(),
            StatId::UpperBound => "UpperBound".to_string(),
        };
        format!("Stat_{short}")
    }
}

impl fmt::Display for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn ordinal(bp: u16) -> String {
    let whole = bp / 100;
    let frac = bp % 100;
    let number = if frac == 0 {
        whole.to_string()
    } else {
        let s = format!("{whole}.{frac:02}");
        s.trim_end_matches('0').to_string()
    };
    let suffix = if frac != 0 {
        "th"
    } else {
        match (whole % 10, whole % 100) {
            (_, 11..=13) => "th",
            (1, _) => "st",
            (2, _) => "nd",
            (3, _) => "rd",
            _ => "th",
        }
    };
    format!("{number}{suffix}")
}

/// A statistic computed in value mode. `None` means the statistic is
/// undefined for the input (sample variance of a single return).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatValue {
    pub id: StatId,
    pub kind: StatKind,
    pub value: Option<f64>,
}

impl StatValue {
    pub fn new(id: StatId, value: Option<f64>) -> Self {
        Self {
            id,
            kind: id.kind(),
            value,
        }
    }
}

//! Two layers of errors live here.
//!
//! - **`CalcError`**     : spreadsheet-style error *values* (`#DIV/0!`, `#NUM!`, …).
//!   They travel inside [`Value`](crate::Value) and propagate through
//!   arithmetic exactly like they would in a workbook, so both derivation
//!   modes see the same failures at the same place.
//! - **`AnalysisError`** : caller-facing failures of the engine operations
//!   (insufficient data, empty series, bad configuration).

use std::{error::Error, fmt};

use chrono::NaiveDate;

/// The subset of spreadsheet error codes the engine can produce.
///
/// **Note:** names are CamelCase (idiomatic Rust) while `Display`
/// renders them exactly as a spreadsheet shows them (`#DIV/0!`, …).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CalcErrorKind {
    Ref,
    Name,
    Value,
    Div,
    Na,
    Num,
    Calc,
    Circ,
}

impl fmt::Display for CalcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Value => "#VALUE!",
            Self::Div => "#DIV/0!",
            Self::Na => "#N/A",
            Self::Num => "#NUM!",
            Self::Calc => "#CALC!",
            Self::Circ => "#CIRC!",
        })
    }
}

impl CalcErrorKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "#ref!" => Self::Ref,
            "#name?" => Self::Name,
            "#value!" => Self::Value,
            "#div/0!" => Self::Div,
            "#n/a" => Self::Na,
            "#num!" => Self::Num,
            "#calc!" => Self::Calc,
            "#circ!" => Self::Circ,
            _ => return None,
        })
    }
}

/// A spreadsheet error value with an optional human explanation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalcError {
    pub kind: CalcErrorKind,
    pub message: Option<String>,
}

impl From<CalcErrorKind> for CalcError {
    fn from(kind: CalcErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl CalcError {
    pub fn new(kind: CalcErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn new_div() -> Self {
        Self::new(CalcErrorKind::Div)
    }

    pub fn new_num() -> Self {
        Self::new(CalcErrorKind::Num)
    }

    pub fn new_na() -> Self {
        Self::new(CalcErrorKind::Na)
    }

    pub fn new_value() -> Self {
        Self::new(CalcErrorKind::Value)
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for CalcError {}

impl PartialEq<str> for CalcError {
    fn eq(&self, other: &str) -> bool {
        self.kind.to_string() == other
    }
}

/// Failures surfaced by the engine operations.
///
/// A degenerate return range (every return identical) is deliberately absent:
/// the binner recovers from it by widening the last edge.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("insufficient data: {found} price point(s), at least 2 are required to form a return")]
    InsufficientData { found: usize },

    #[error("statistics requested on an empty return series")]
    EmptySeries,

    #[error("bin width must be finite and positive, got {0}")]
    InvalidBinWidth(f64),

    #[error("percentile must lie in [0, 1], got {0}")]
    InvalidPercentile(f64),

    #[error("percentile {0} requested more than once")]
    DuplicatePercentile(f64),

    #[error("{required} bins required but the cap is {cap}")]
    BinCapExceeded { required: usize, cap: usize },

    #[error("price {price} at {timestamp} is not a finite number")]
    InvalidPrice { timestamp: NaiveDate, price: f64 },

    #[error("price series is not ordered by timestamp at {timestamp}")]
    UnorderedTimestamps { timestamp: NaiveDate },

    #[error("duplicate timestamp {timestamp} in price series")]
    DuplicateTimestamp { timestamp: NaiveDate },

    #[error("recorded formulas cover {expected} price point(s), got {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("calculation failed: {0}")]
    Calc(#[from] CalcError),
}

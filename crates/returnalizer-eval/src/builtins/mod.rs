//! Builtin spreadsheet functions.
//!
//! Only the functions the derivations emit are implemented. Value mode calls
//! them through [`Builtin`], formula mode writes their names into
//! expressions, and the interpreter resolves those names through the
//! registry, so both sides always reach the same implementation.

use std::sync::Arc;

use crate::function::Function;

pub mod logical;
pub mod lookup;
pub mod math;
pub mod stats;
pub mod text;
mod utils;

/// Typed handle on a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Rows,
    Sum,
    Average,
    Median,
    ModeMult,
    Min,
    Max,
    VarS,
    Sqrt,
    PercentileInc,
    QuartileInc,
    Round,
    FloorMath,
    Sequence,
    CountIfs,
    Filter,
    If,
    IfError,
    Text,
}

impl Builtin {
    pub const ALL: [Builtin; 19] = [
        Builtin::Rows,
        Builtin::Sum,
        Builtin::Average,
        Builtin::Median,
        Builtin::ModeMult,
        Builtin::Min,
        Builtin::Max,
        Builtin::VarS,
        Builtin::Sqrt,
        Builtin::PercentileInc,
        Builtin::QuartileInc,
        Builtin::Round,
        Builtin::FloorMath,
        Builtin::Sequence,
        Builtin::CountIfs,
        Builtin::Filter,
        Builtin::If,
        Builtin::IfError,
        Builtin::Text,
    ];

    /// Canonical (registry) name.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Rows => "ROWS",
            Builtin::Sum => "SUM",
            Builtin::Average => "AVERAGE",
            Builtin::Median => "MEDIAN",
            Builtin::ModeMult => "MODE.MULT",
            Builtin::Min => "MIN",
            Builtin::Max => "MAX",
            Builtin::VarS => "VAR.S",
            Builtin::Sqrt => "SQRT",
            Builtin::PercentileInc => "PERCENTILE.INC",
            Builtin::QuartileInc => "QUARTILE.INC",
            Builtin::Round => "ROUND",
            Builtin::FloorMath => "FLOOR.MATH",
            Builtin::Sequence => "SEQUENCE",
            Builtin::CountIfs => "COUNTIFS",
            Builtin::Filter => "FILTER",
            Builtin::If => "IF",
            Builtin::IfError => "IFERROR",
            Builtin::Text => "TEXT",
        }
    }
}

pub(crate) fn all() -> Vec<Arc<dyn Function>> {
    vec![
        Arc::new(lookup::RowsFn),
        Arc::new(math::SumFn),
        Arc::new(stats::AverageFn),
        Arc::new(stats::MedianFn),
        Arc::new(stats::ModeMultFn),
        Arc::new(stats::MinFn),
        Arc::new(stats::MaxFn),
        Arc::new(stats::VarSFn),
        Arc::new(math::SqrtFn),
        Arc::new(stats::PercentileIncFn),
        Arc::new(stats::QuartileIncFn),
        Arc::new(math::RoundFn),
        Arc::new(math::FloorMathFn),
        Arc::new(math::SequenceFn),
        Arc::new(lookup::CountIfsFn),
        Arc::new(lookup::FilterFn),
        Arc::new(logical::IfFn),
        Arc::new(logical::IfErrorFn),
        Arc::new(text::TextFn),
    ]
}

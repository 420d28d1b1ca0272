//! Statistical derivation engine.
//!
//! Every statistic is written once, against the [`Derivation`] trait, and
//! interpreted two ways: [`ValueMode`] computes numbers immediately,
//! [`FormulaMode`] records spreadsheet expressions. The [`Interpreter`]
//! evaluates recorded expressions through the same function registry and
//! the same broadcasting arithmetic, so the two modes perform identical
//! floating-point operations in identical order.

pub mod broadcast;
pub mod builtins;
pub mod derivation;
pub mod engine;
pub mod function;
pub mod function_registry;
pub mod interpreter;
pub mod traits;
pub mod workbook;

pub use broadcast::BinaryOp;
pub use builtins::Builtin;
pub use derivation::{
    Derivation, DerivationMode, FormulaMode, FormulaSet, NamedFormula, ReturnsLayout, ValueMode,
};
pub use engine::{
    Analysis, AnalysisOptions, BinCapPolicy, BinOptions, FormulaAnalysis, FrequencyBin,
    FrequencyExpressions, FrequencyOutput, FrequencyTable, OutlierBounds, OutlierExpressions,
    OutlierOutput, OutlierRecord, OutlierReport, StatExpression, StatsOptions, StatsOutput,
    StatsPanel, ValueAnalysis, analyze, compute_frequency_bins, compute_returns, compute_stats,
    count_returns, detect_outliers,
};
pub use interpreter::Interpreter;
pub use workbook::MemoryWorkbook;

pub use returnalizer_common::{
    AnalysisError, CalcError, CalcErrorKind, PricePoint, PriceSeries, ReturnPoint, ReturnSeries,
    StatId, StatKind, StatValue, Value,
};
pub use returnalizer_formula::{ASTNode, canonical_formula};

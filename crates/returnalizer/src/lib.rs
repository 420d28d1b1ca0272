//! Meta crate re-exporting the Returnalizer layers. Depend on this crate for
//! the whole stack, or on the layer crates directly for finer control.

pub use returnalizer_common as common;
pub use returnalizer_eval as eval;
pub use returnalizer_formula as formula;

#[cfg(feature = "workbook")]
pub use returnalizer_workbook as workbook;

pub use returnalizer_eval::{
    Analysis, AnalysisOptions, BinOptions, DerivationMode, FormulaAnalysis, StatsOptions,
    ValueAnalysis, analyze, compute_frequency_bins, compute_returns, compute_stats,
    detect_outliers,
};

pub use returnalizer_common::{AnalysisError, PricePoint, PriceSeries, ReturnSeries, StatId};

#[cfg(feature = "workbook")]
pub use returnalizer_workbook::{Report, ReportBuilder, ReportConfig, load_prices_csv};

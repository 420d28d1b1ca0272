//! Report layer over the Returnalizer engine: load prices, run the analysis
//! in either mode, and assemble the sheets, chart and narrative a workbook
//! export needs.

pub mod config;
pub mod error;
pub mod histogram;
pub mod loader;
pub mod report;
pub mod summary;

pub use config::ReportConfig;
pub use error::ReportError;
pub use histogram::HistogramSpec;
pub use loader::{CsvPriceOptions, load_prices_csv, read_prices};
pub use report::{Cell, DefinedName, Report, ReportBuilder, Sheet, write_report_json};
pub use summary::derive_summary;

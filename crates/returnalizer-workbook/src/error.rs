use std::path::PathBuf;

use returnalizer_common::AnalysisError;
use thiserror::Error;

/// Failures of the report layer. Engine failures pass through unchanged.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("column {name:?} not found in CSV header")]
    MissingColumn { name: String },

    #[error("record {record}: {message}")]
    InvalidRecord { record: u64, message: String },

    #[error("unsupported config file {path:?}: expected .yaml, .yml or .json")]
    UnsupportedConfig { path: PathBuf },
}

impl ReportError {
    pub(crate) fn invalid_record(record: u64, message: impl Into<String>) -> Self {
        ReportError::InvalidRecord {
            record,
            message: message.into(),
        }
    }
}

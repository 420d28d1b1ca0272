//! Report configuration.
//!
//! Loaded from YAML (`.yaml`/`.yml`) or JSON by file extension. Every field
//! has a default, so an empty file is a valid config.

use std::path::{Path, PathBuf};

use returnalizer_eval::engine::binning::{DEFAULT_BIN_WIDTH, DEFAULT_MAX_BINS};
use returnalizer_eval::engine::stats::DEFAULT_PERCENTILES;
use returnalizer_eval::{
    AnalysisOptions, BinCapPolicy, BinOptions, DerivationMode, ReturnsLayout, StatsOptions,
};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::loader::CsvPriceOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    #[serde(with = "mode_serde")]
    pub mode: DerivationMode,
    pub bin_width: f64,
    /// Soft cap on the number of bins.
    pub max_bins: usize,
    /// Fail instead of warning when the cap is exceeded.
    pub strict_bins: bool,
    pub percentiles: Vec<f64>,
    pub csv: CsvPriceOptions,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            mode: DerivationMode::default(),
            bin_width: DEFAULT_BIN_WIDTH,
            max_bins: DEFAULT_MAX_BINS,
            strict_bins: false,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            csv: CsvPriceOptions::default(),
        }
    }
}

impl ReportConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config: ReportConfig = match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                if text.trim().is_empty() {
                    ReportConfig::default()
                } else {
                    serde_yaml::from_str(&text)?
                }
            }
            Some("json") => serde_json::from_str(&text)?,
            _ => {
                return Err(ReportError::UnsupportedConfig {
                    path: path.to_path_buf(),
                });
            }
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), mode = %config.mode, "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        let options = self.analysis_options();
        options.stats.validate()?;
        options.bins.validate()?;
        Ok(())
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            stats: StatsOptions {
                percentiles: self.percentiles.clone(),
            },
            bins: BinOptions {
                width: self.bin_width,
                max_bins: self.max_bins,
                cap_policy: if self.strict_bins {
                    BinCapPolicy::Error
                } else {
                    BinCapPolicy::Warn
                },
            },
            layout: ReturnsLayout::default(),
        }
    }
}

/// `DerivationMode` as its lowercase name.
pub(crate) mod mode_serde {
    use returnalizer_eval::DerivationMode;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(mode: &DerivationMode, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(mode)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DerivationMode, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(name: &str, body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn yaml_overrides_defaults() {
        let (_dir, path) = write(
            "report.yaml",
            "mode: formula\nbin_width: 0.05\npercentiles: [0.1, 0.5]\ncsv:\n  price_column: Adj Close\n",
        );
        let cfg = ReportConfig::from_path(&path).unwrap();
        assert_eq!(cfg.mode, DerivationMode::Formula);
        assert_eq!(cfg.bin_width, 0.05);
        assert_eq!(cfg.max_bins, DEFAULT_MAX_BINS);
        assert_eq!(cfg.csv.price_column, "Adj Close");
        assert_eq!(cfg.csv.date_column, "Date");
    }

    #[test]
    fn empty_yaml_is_the_default() {
        let (_dir, path) = write("empty.yml", "");
        assert_eq!(ReportConfig::from_path(&path).unwrap(), ReportConfig::default());
    }

    #[test]
    fn json_with_strict_bins() {
        let (_dir, path) = write("report.json", r#"{"strict_bins": true, "max_bins": 12}"#);
        let cfg = ReportConfig::from_path(&path).unwrap();
        let opts = cfg.analysis_options();
        assert_eq!(opts.bins.cap_policy, BinCapPolicy::Error);
        assert_eq!(opts.bins.max_bins, 12);
    }

    #[test]
    fn rejects_invalid_values_and_unknown_keys() {
        let (_dir, path) = write("bad.yaml", "bin_width: -0.1\n");
        assert!(matches!(
            ReportConfig::from_path(&path),
            Err(ReportError::Analysis(_))
        ));
        let (_dir, path) = write("typo.yaml", "bin_wdth: 0.1\n");
        assert!(matches!(ReportConfig::from_path(&path), Err(ReportError::Yaml(_))));
        let (_dir, path) = write("report.toml", "");
        assert!(matches!(
            ReportConfig::from_path(&path),
            Err(ReportError::UnsupportedConfig { .. })
        ));
    }
}

//! Serializable experiment configuration.
//!
//! One TOML file describes a full study: universe conventions, costs,
//! portfolio construction, fold layout, the sleeves and their grids, and an
//! optional mix. Everything a run needs is here, so a config plus a dataset
//! reproduces a result exactly.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crosslab_core::data::ReturnKind;
use crosslab_core::domain::{AssetId, ConfigHash};
use crosslab_core::engine::{CostModel, SleeveRunner};
use crosslab_core::position::PositionConfig;
use crosslab_core::signal::SignalBuilder;

use crate::combiner::MixConfig;
use crate::grid::SignalGrid;
use crate::metrics::{ReportConfig, HOURLY_BARS_PER_YEAR};
use crate::walk_forward::{FoldConfig, SleeveSpec, WalkForwardError, WalkForwardValidator};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config defines no sleeves")]
    NoSleeves,
    #[error("duplicate sleeve name '{0}'")]
    DuplicateSleeve(String),
    #[error("sleeve '{name}': {reason}")]
    InvalidSleeve { name: String, reason: String },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("invalid folds: {0}")]
    Folds(#[from] WalkForwardError),
}

/// One named sleeve and its parameter grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveConfig {
    pub name: String,
    pub grid: SignalGrid,
}

/// A complete experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    #[serde(default = "default_bars_per_year")]
    pub bars_per_year: f64,
    #[serde(default = "default_cost_bps")]
    pub cost_bps: f64,
    #[serde(default = "default_gross")]
    pub gross_exposure: f64,
    #[serde(default = "default_true")]
    pub dollar_neutral: bool,
    #[serde(default)]
    pub return_kind: ReturnKind,
    #[serde(default)]
    pub folds: FoldConfig,
    #[serde(default = "default_hac_lags")]
    pub hac_lags: Option<usize>,
    pub sleeves: Vec<SleeveConfig>,
    #[serde(default)]
    pub mix: Option<MixConfig>,
}

fn default_benchmark() -> String {
    "BTCUSDT".into()
}

fn default_bars_per_year() -> f64 {
    HOURLY_BARS_PER_YEAR
}

fn default_cost_bps() -> f64 {
    7.0
}

fn default_gross() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_hac_lags() -> Option<usize> {
    Some(24)
}

impl Default for ExperimentConfig {
    /// Reversal plus momentum on hourly bars, mixed by inverse volatility.
    fn default() -> Self {
        Self {
            benchmark: default_benchmark(),
            bars_per_year: default_bars_per_year(),
            cost_bps: default_cost_bps(),
            gross_exposure: default_gross(),
            dollar_neutral: true,
            return_kind: ReturnKind::Simple,
            folds: FoldConfig::hourly_default(),
            hac_lags: default_hac_lags(),
            sleeves: vec![
                SleeveConfig {
                    name: "reversal".into(),
                    grid: SignalGrid::reversal_default(),
                },
                SleeveConfig {
                    name: "momentum".into(),
                    grid: SignalGrid::momentum_default(),
                },
            ],
            mix: Some(MixConfig::default()),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks every sleeve candidate and the fold layout up front, so a bad
    /// parameter fails before any data is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sleeves.is_empty() {
            return Err(ConfigError::NoSleeves);
        }
        for (field, value) in [
            ("bars_per_year", self.bars_per_year),
            ("gross_exposure", self.gross_exposure),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if !(self.cost_bps >= 0.0 && self.cost_bps.is_finite()) {
            return Err(ConfigError::NonPositive {
                field: "cost_bps",
                value: self.cost_bps,
            });
        }
        self.folds.validate()?;

        let mut seen = std::collections::HashSet::new();
        for sleeve in &self.sleeves {
            if !seen.insert(sleeve.name.as_str()) {
                return Err(ConfigError::DuplicateSleeve(sleeve.name.clone()));
            }
            let candidates = sleeve.grid.candidates();
            if candidates.is_empty() {
                return Err(ConfigError::InvalidSleeve {
                    name: sleeve.name.clone(),
                    reason: "grid is empty".into(),
                });
            }
            for c in &candidates {
                c.validate().map_err(|e| ConfigError::InvalidSleeve {
                    name: sleeve.name.clone(),
                    reason: format!("{}: {e}", c.label()),
                })?;
            }
        }
        Ok(())
    }

    pub fn benchmark_id(&self) -> AssetId {
        AssetId::new(self.benchmark.clone())
    }

    pub fn report(&self) -> ReportConfig {
        ReportConfig {
            bars_per_year: self.bars_per_year,
            hac_lags: self.hac_lags,
        }
    }

    pub fn runner(&self) -> SleeveRunner {
        SleeveRunner::new(
            SignalBuilder::with_benchmark(self.benchmark_id()),
            PositionConfig {
                gross_exposure: self.gross_exposure,
                dollar_neutral: self.dollar_neutral,
            },
            CostModel::new(self.cost_bps),
        )
    }

    pub fn validator(&self) -> WalkForwardValidator {
        WalkForwardValidator::new(self.runner(), self.folds, self.bars_per_year)
    }

    pub fn sleeve_specs(&self) -> Vec<SleeveSpec> {
        self.sleeves
            .iter()
            .map(|s| SleeveSpec {
                name: s.name.clone(),
                candidates: s.grid.candidates(),
            })
            .collect()
    }

    /// Content hash of the whole experiment (BLAKE3 over canonical JSON).
    pub fn fingerprint(&self) -> ConfigHash {
        // serialization of plain data cannot fail; an empty payload still hashes
        let json = serde_json::to_vec(self).unwrap_or_default();
        ConfigHash::from_bytes(&json)
    }
}

//! Run configuration. Every field has a default, so an empty file (or no file
//! at all) reproduces the standard run: `data/raw` in, 80/20 split with seed
//! 42, the full hyperparameter grid with 5 folds, and the model written to
//! `models/best_model.toml`.

use crate::learn::search::SearchConfig;
use crate::prepare::split::{DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub train_dir: PathBuf,
    pub test_dir: PathBuf,
    pub results_dir: PathBuf,
    pub model_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            train_dir: PathBuf::from("data/train"),
            test_dir: PathBuf::from("data/test"),
            results_dir: PathBuf::from("results"),
            model_path: PathBuf::from("models/best_model.toml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub split: SplitConfig,
    pub search: SearchConfig,
}

impl PipelineConfig {
    /// Reads a TOML configuration file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "split.test_fraction must lie strictly between 0 and 1, got {fraction}"
            )));
        }
        if self.search.folds < 2 {
            return Err(ConfigError::Invalid(format!(
                "search.folds must be at least 2, got {}",
                self.search.folds
            )));
        }
        if self.search.grid.candidates().is_empty() {
            return Err(ConfigError::Invalid(
                "every parameter in search.grid needs at least one value".to_string(),
            ));
        }
        Ok(())
    }
}

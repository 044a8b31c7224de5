//! # Model Registry
//!
//! A trained pipeline is persisted as a single human-readable TOML file. The
//! file carries the feature order the pipeline was trained with, so a loaded
//! artifact can be checked against the order the prediction service uses.

use crate::learn::forest::ForestParams;
use crate::learn::search::SearchOutcome;
use crate::learn::trainer::FittedPipeline;
use crate::prepare::select::FEATURE_COLUMNS;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No model artifact found at '{0}'. Train a model first.")]
    ArtifactNotFound(PathBuf),
    #[error("The model artifact at '{path}' is corrupt: {reason}")]
    ArtifactCorrupt { path: PathBuf, reason: String },
    #[error("Failed to read or write the model artifact at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize the model to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// How the stored pipeline was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub params: ForestParams,
    /// Mean validation ROC-AUC of the chosen configuration.
    pub cv_roc_auc: f64,
    pub folds: usize,
    pub candidates: usize,
}

impl SearchSummary {
    pub fn from_outcome(outcome: &SearchOutcome) -> Self {
        let best = outcome.best();
        Self {
            params: best.params,
            cv_roc_auc: best.mean_score,
            folds: best.fold_scores.len(),
            candidates: outcome.candidates.len(),
        }
    }
}

/// The complete, self-contained trained model as it is saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Version of the crate that wrote the artifact.
    pub version: String,
    pub feature_names: Vec<String>,
    pub search: SearchSummary,
    pub pipeline: FittedPipeline,
}

impl ModelArtifact {
    pub fn new(pipeline: FittedPipeline, search: SearchSummary) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            feature_names: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            search,
            pipeline,
        }
    }

    /// Checks that the artifact can be used for prediction: the feature order
    /// matches, the scaler and forest have the right width, and every tree is
    /// well formed.
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_names != FEATURE_COLUMNS {
            return Err(format!(
                "feature order {:?} does not match the expected {:?}",
                self.feature_names, FEATURE_COLUMNS
            ));
        }
        let width = FEATURE_COLUMNS.len();
        let scaler = &self.pipeline.scaler;
        if scaler.mean.len() != width || scaler.scale.len() != width {
            return Err(format!(
                "scaler covers {} mean / {} scale value(s), expected {width}",
                scaler.mean.len(),
                scaler.scale.len()
            ));
        }
        if scaler.mean.iter().any(|m| !m.is_finite())
            || scaler.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err("scaler has a non-finite mean or a non-positive scale".to_string());
        }
        if self.pipeline.forest.n_features != width {
            return Err(format!(
                "forest expects {} feature(s), expected {width}",
                self.pipeline.forest.n_features
            ));
        }
        self.pipeline.forest.validate()
    }

    /// Writes the artifact as TOML, creating parent directories. An existing
    /// file is replaced.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let io_error = |source: std::io::Error| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path).map_err(io_error)?);
        file.write_all(toml_string.as_bytes()).map_err(io_error)?;
        file.flush().map_err(io_error)?;
        info!("Saved model artifact to '{}'", path.display());
        Ok(())
    }

    /// Reads and validates an artifact.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.is_file() {
            return Err(RegistryError::ArtifactNotFound(path.to_path_buf()));
        }
        let toml_string = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corrupt = |reason: String| RegistryError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        let artifact: ModelArtifact =
            toml::from_str(&toml_string).map_err(|e| corrupt(e.to_string()))?;
        artifact.validate().map_err(corrupt)?;
        Ok(artifact)
    }
}

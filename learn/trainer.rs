//! Fits the scaler-plus-forest pipeline and runs the hyperparameter search
//! that picks its settings.

use crate::learn::forest::{ForestParams, RandomForest};
use crate::learn::metrics::EvaluationError;
use crate::learn::scaler::StandardScaler;
use crate::learn::search::{SearchConfig, SearchOutcome, grid_search};
use crate::prepare::select::LabeledData;
use log::info;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Cannot train on an empty training set.")]
    EmptyTrainingSet,
    #[error("The training set has {rows} row(s) but {labels} label(s).")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("Invalid forest configuration [{params}]: {reason}.")]
    InvalidParams { params: String, reason: String },
    #[error("Cross-validation needs at least 2 folds, got {0}.")]
    InvalidFolds(usize),
    #[error(
        "Label {label} occurs {count} time(s) in the training set, fewer than the {folds} folds requested."
    )]
    ClassTooSmall { label: u8, count: usize, folds: usize },
    #[error("The hyperparameter grid is empty; every parameter needs at least one value.")]
    EmptyGrid,
    #[error("Failed to score a validation fold: {0}")]
    Evaluation(#[from] EvaluationError),
}

/// A standard scaler followed by a random forest, both fitted on the same rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub scaler: StandardScaler,
    pub forest: RandomForest,
}

impl FittedPipeline {
    pub fn fit(data: &LabeledData, params: ForestParams, seed: u64) -> Result<Self, TrainingError> {
        if data.n_rows() == 0 {
            return Err(TrainingError::EmptyTrainingSet);
        }
        let scaler = StandardScaler::fit(data.features.view());
        let scaled = scaler.transform(data.features.view());
        let forest = RandomForest::fit(scaled.view(), data.labels.view(), params, seed)?;
        Ok(Self { scaler, forest })
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Probability of label 1 (living) for each row of unscaled features.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.forest.predict_proba(self.scaler.transform(x).view())
    }

    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> f64 {
        self.forest
            .predict_proba_row(self.scaler.transform_row(row).view())
    }
}

/// The refit winner of a grid search, with the search results that chose it.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub pipeline: FittedPipeline,
    pub search: SearchOutcome,
}

/// Searches `config.grid` by cross-validation on `train`, then refits the best
/// configuration on all of `train`.
pub fn train(train: &LabeledData, config: &SearchConfig) -> Result<TrainingOutcome, TrainingError> {
    if train.n_rows() == 0 {
        return Err(TrainingError::EmptyTrainingSet);
    }
    let search = grid_search(train, config)?;
    let best = search.best();
    info!(
        "Refitting best configuration on all {} training row(s)",
        train.n_rows()
    );
    let pipeline = FittedPipeline::fit(train, best.params, config.seed)?;
    Ok(TrainingOutcome { pipeline, search })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::search::ParamGrid;
    use crate::learn::tree::{MaxDepth, MaxFeatures};
    use ndarray::{Array1, Array2};

    fn separable(n: usize) -> LabeledData {
        LabeledData {
            features: Array2::from_shape_fn((n, 9), |(i, j)| {
                let base = if i % 2 == 0 { 10.0 } else { 50.0 };
                base + (i * j % 5) as f64
            }),
            labels: Array1::from_shape_fn(n, |i| u8::from(i % 2 == 0)),
        }
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            folds: 3,
            seed: 42,
            grid: ParamGrid {
                n_estimators: vec![8],
                max_depth: vec![MaxDepth::Limited(3)],
                min_samples_split: vec![2, 5],
                min_samples_leaf: vec![1],
                bootstrap: vec![true],
                max_features: vec![MaxFeatures::Sqrt],
            },
        }
    }

    #[test]
    fn trains_the_search_winner_on_all_rows() {
        let data = separable(30);
        let outcome = train(&data, &small_config()).unwrap();

        assert_eq!(outcome.search.candidates.len(), 2);
        assert_eq!(outcome.pipeline.forest.params, outcome.search.best().params);
        assert_eq!(outcome.pipeline.n_features(), 9);

        let probabilities = outcome.pipeline.predict_proba(data.features.view());
        for (p, &label) in probabilities.iter().zip(data.labels.iter()) {
            assert_eq!(u8::from(*p > 0.5), label);
        }
        let single = outcome.pipeline.predict_proba_row(data.features.row(0));
        assert_eq!(single, probabilities[0]);
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let empty = LabeledData {
            features: Array2::zeros((0, 9)),
            labels: Array1::zeros(0),
        };
        assert!(matches!(
            train(&empty, &small_config()),
            Err(TrainingError::EmptyTrainingSet)
        ));
    }
}

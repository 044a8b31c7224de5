//! # Cross-Validated Grid Search
//!
//! Every hyperparameter combination of a [`ParamGrid`] is scored by stratified
//! k-fold cross-validation on the training subset. Each fold refits the full
//! pipeline (scaler and forest) on its training part, so the validation part
//! never influences the scaling it is evaluated under.
//!
//! The (configuration, fold) pairs are independent rayon tasks working on
//! shared read-only matrices. Results come back in grid order and are reduced
//! by a single pass that keeps the first configuration with the highest mean
//! validation ROC-AUC.

use crate::learn::forest::{ForestParams, RandomForest};
use crate::learn::metrics::roc_auc;
use crate::learn::scaler::StandardScaler;
use crate::learn::trainer::TrainingError;
use crate::learn::tree::{MaxDepth, MaxFeatures};
use crate::prepare::select::LabeledData;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::iproduct;
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;

/// The values tried for each hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<MaxDepth>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub bootstrap: Vec<bool>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![120],
            max_depth: vec![
                MaxDepth::Unlimited,
                MaxDepth::Limited(10),
                MaxDepth::Limited(20),
                MaxDepth::Limited(30),
            ],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
            bootstrap: vec![true, false],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Count(3), MaxFeatures::Count(4)],
        }
    }
}

impl ParamGrid {
    /// Every combination, with parameter names in alphabetical order and the
    /// last one varying fastest.
    pub fn candidates(&self) -> Vec<ForestParams> {
        iproduct!(
            self.bootstrap.iter(),
            self.max_depth.iter(),
            self.max_features.iter(),
            self.min_samples_leaf.iter(),
            self.min_samples_split.iter(),
            self.n_estimators.iter()
        )
        .map(
            |(&bootstrap, &max_depth, &max_features, &min_samples_leaf, &min_samples_split, &n_estimators)| {
                ForestParams {
                    n_estimators,
                    max_depth,
                    min_samples_split,
                    min_samples_leaf,
                    max_features,
                    bootstrap,
                }
            },
        )
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub folds: usize,
    pub seed: u64,
    pub grid: ParamGrid,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            seed: 42,
            grid: ParamGrid::default(),
        }
    }
}

/// Cross-validation result for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub params: ForestParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best_index: usize,
    pub candidates: Vec<CandidateScore>,
}

impl SearchOutcome {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }
}

/// Validation row indices for each of `k` folds. The rows of each class are
/// dealt round-robin in row order, so every fold sees both classes in close
/// to their overall proportion and the assignment involves no randomness.
pub fn stratified_folds(labels: ArrayView1<u8>, k: usize) -> Result<Vec<Vec<usize>>, TrainingError> {
    if k < 2 {
        return Err(TrainingError::InvalidFolds(k));
    }
    for label in [0u8, 1] {
        let count = labels.iter().filter(|&&l| l == label).count();
        if count < k {
            return Err(TrainingError::ClassTooSmall {
                label,
                count,
                folds: k,
            });
        }
    }

    let mut folds = vec![Vec::new(); k];
    let mut dealt = [0usize; 2];
    for (row, &label) in labels.iter().enumerate() {
        let class = usize::from(label == 1);
        folds[dealt[class] % k].push(row);
        dealt[class] += 1;
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Scaled training and validation matrices for one fold.
struct PreparedFold {
    train_x: Array2<f64>,
    train_y: Array1<u8>,
    valid_x: Array2<f64>,
    valid_y: Array1<u8>,
}

fn prepare_folds(data: &LabeledData, folds: &[Vec<usize>]) -> Vec<PreparedFold> {
    folds
        .iter()
        .map(|validation| {
            let mut in_validation = vec![false; data.n_rows()];
            for &row in validation {
                in_validation[row] = true;
            }
            let training: Vec<usize> = (0..data.n_rows()).filter(|&r| !in_validation[r]).collect();

            let train = data.take(&training);
            let valid = data.take(validation);
            let scaler = StandardScaler::fit(train.features.view());
            PreparedFold {
                train_x: scaler.transform(train.features.view()),
                train_y: train.labels,
                valid_x: scaler.transform(valid.features.view()),
                valid_y: valid.labels,
            }
        })
        .collect()
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Scores every configuration in `config.grid` and returns them all together
/// with the index of the winner.
pub fn grid_search(data: &LabeledData, config: &SearchConfig) -> Result<SearchOutcome, TrainingError> {
    let candidates = config.grid.candidates();
    if candidates.is_empty() {
        return Err(TrainingError::EmptyGrid);
    }
    for params in &candidates {
        params.validate()?;
    }

    let folds = stratified_folds(data.labels.view(), config.folds)?;
    let prepared = prepare_folds(data, &folds);
    let tasks: Vec<(usize, usize)> = iproduct!(0..candidates.len(), 0..prepared.len()).collect();
    info!(
        "Grid search: {} configuration(s) x {} fold(s) = {} fits on {} row(s)",
        candidates.len(),
        prepared.len(),
        tasks.len(),
        data.n_rows()
    );

    let pb = create_progress_bar(tasks.len() as u64, "Cross-validating...");
    let scores: Vec<f64> = tasks
        .par_iter()
        .map(|&(candidate, fold)| -> Result<f64, TrainingError> {
            let part = &prepared[fold];
            let forest = RandomForest::fit(
                part.train_x.view(),
                part.train_y.view(),
                candidates[candidate],
                config.seed,
            )?;
            let probabilities = forest.predict_proba(part.valid_x.view());
            let score = roc_auc(part.valid_y.view(), probabilities.view())?;
            pb.inc(1);
            Ok(score)
        })
        .collect::<Result<Vec<f64>, TrainingError>>()?;
    pb.finish_with_message("Cross-validation complete.");

    let k = prepared.len();
    let mut best_index = 0;
    let mut results = Vec::with_capacity(candidates.len());
    for (index, params) in candidates.into_iter().enumerate() {
        let fold_scores = scores[index * k..(index + 1) * k].to_vec();
        let mean_score = fold_scores.iter().sum::<f64>() / k as f64;
        debug!("[{params}] mean ROC-AUC {mean_score:.4}");
        results.push(CandidateScore {
            params,
            fold_scores,
            mean_score,
        });
        if results[index].mean_score > results[best_index].mean_score {
            best_index = index;
        }
    }

    let outcome = SearchOutcome {
        best_index,
        candidates: results,
    };
    info!(
        "Best configuration (mean ROC-AUC {:.4}): {}",
        outcome.best().mean_score,
        outcome.best().params
    );
    Ok(outcome)
}

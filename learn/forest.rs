//! Bagged random forest built from [`crate::learn::tree`] CART trees.

use crate::learn::trainer::TrainingError;
use crate::learn::tree::{DecisionTree, MaxDepth, MaxFeatures, TreeParams};
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset between consecutive per-tree seeds.
const TREE_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Hyperparameters of a random forest. One grid point of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: MaxDepth,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 120,
            max_depth: MaxDepth::Unlimited,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

impl ForestParams {
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        let problem = if self.n_estimators == 0 {
            Some("n_estimators must be at least 1")
        } else if self.min_samples_split < 2 {
            Some("min_samples_split must be at least 2")
        } else if self.min_samples_leaf == 0 {
            Some("min_samples_leaf must be at least 1")
        } else if self.max_depth == MaxDepth::Limited(0) {
            Some("max_depth must be at least 1")
        } else if self.max_features == MaxFeatures::Count(0) {
            Some("max_features must be at least 1")
        } else {
            None
        };
        match problem {
            Some(reason) => Err(TrainingError::InvalidParams {
                params: self.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n_estimators={}, max_depth={}, min_samples_split={}, min_samples_leaf={}, max_features={}, bootstrap={}",
            self.n_estimators,
            self.max_depth,
            self.min_samples_split,
            self.min_samples_leaf,
            self.max_features,
            self.bootstrap
        )
    }
}

/// An ensemble of CART trees whose probabilities are averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    pub seed: u64,
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed.wrapping_add((tree as u64).wrapping_mul(TREE_SEED_STRIDE))
}

impl RandomForest {
    /// Fits the forest. Trees are grown in parallel; each one draws from its
    /// own RNG derived from `seed` and its position, so the result does not
    /// depend on thread scheduling.
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<u8>,
        params: ForestParams,
        seed: u64,
    ) -> Result<Self, TrainingError> {
        params.validate()?;
        let n = x.nrows();
        if n == 0 {
            return Err(TrainingError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(TrainingError::LabelCountMismatch {
                rows: n,
                labels: y.len(),
            });
        }

        let tree_params = params.tree_params();
        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, t));
                let samples: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                DecisionTree::fit(x, y, samples, &tree_params, &mut rng)
            })
            .collect();

        let deepest = trees.iter().map(DecisionTree::depth).max().unwrap_or(0);
        debug!("Fitted {} tree(s) on {n} row(s); deepest tree has depth {deepest}", trees.len());

        Ok(Self {
            params,
            seed,
            n_features: x.ncols(),
            trees,
        })
    }

    /// Mean probability of label 1 across trees, accumulated in tree order.
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict_proba_row(row)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.predict_proba_row(row))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("forest has no input features".to_string());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|reason| format!("tree {t}: {reason}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn noisy_threshold_data(n: usize) -> (Array2<f64>, Array1<u8>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => i as f64,
            1 => ((i * 7) % 11) as f64,
            _ => ((i * 3) % 5) as f64,
        });
        let y = Array1::from_shape_fn(n, |i| u8::from(i >= n / 2));
        (x, y)
    }

    #[test]
    fn fitting_is_reproducible_for_a_seed() {
        let (x, y) = noisy_threshold_data(60);
        let params = ForestParams {
            n_estimators: 15,
            ..ForestParams::default()
        };
        let first = RandomForest::fit(x.view(), y.view(), params, 42).unwrap();
        let second = RandomForest::fit(x.view(), y.view(), params, 42).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.trees.len(), 15);
        assert!(first.validate().is_ok());
    }

    #[test]
    fn learns_an_informative_feature() {
        let (x, y) = noisy_threshold_data(80);
        let params = ForestParams {
            n_estimators: 25,
            max_features: MaxFeatures::Count(3),
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(x.view(), y.view(), params, 42).unwrap();
        let probabilities = forest.predict_proba(x.view());

        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(probabilities[2] < 0.5);
        assert!(probabilities[77] > 0.5);
    }

    #[test]
    fn rejects_invalid_params_and_empty_input() {
        let (x, y) = noisy_threshold_data(10);
        let bad = ForestParams {
            min_samples_split: 1,
            ..ForestParams::default()
        };
        match RandomForest::fit(x.view(), y.view(), bad, 42) {
            Err(TrainingError::InvalidParams { reason, .. }) => {
                assert!(reason.contains("min_samples_split"));
            }
            other => panic!("Expected InvalidParams, got {other:?}"),
        }

        let empty = Array2::<f64>::zeros((0, 3));
        let none = Array1::<u8>::zeros(0);
        assert!(matches!(
            RandomForest::fit(empty.view(), none.view(), ForestParams::default(), 42),
            Err(TrainingError::EmptyTrainingSet)
        ));
    }
}

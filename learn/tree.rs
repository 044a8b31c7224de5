//! # CART Classification Trees
//!
//! Binary trees grown by exhaustive threshold search under Gini impurity. The
//! trees are the base learners of [`crate::learn::forest::RandomForest`]; on
//! their own they are deterministic given a seeded RNG.
//!
//! Nodes are stored in a flat vector in preorder. A split's children always
//! sit at larger indices than the split itself, which is what
//! [`DecisionTree::validate`] checks on decoded artifacts and what guarantees
//! that traversal terminates.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many features each node may consider when searching for a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least 1.
    Sqrt,
    /// A fixed number, capped at the number of features.
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Count(k) => k,
        };
        k.clamp(1, n_features.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Count(k) => write!(f, "{k}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxDepth {
    Unlimited,
    Limited(usize),
}

impl MaxDepth {
    fn allows(self, depth: usize) -> bool {
        match self {
            MaxDepth::Unlimited => true,
            MaxDepth::Limited(limit) => depth < limit,
        }
    }
}

impl fmt::Display for MaxDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxDepth::Unlimited => write!(f, "none"),
            MaxDepth::Limited(depth) => write!(f, "{depth}"),
        }
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: MaxDepth,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `x[feature] <= threshold` go to `left`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// `probability` is the share of label 1 among the training rows that
    /// reached the leaf.
    Leaf { probability: f64, samples: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Grows a tree on the rows listed in `samples`. A row may be listed more
    /// than once, which is how bootstrap resamples are passed in.
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<u8>,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> DecisionTree {
        let mut grower = Grower {
            x: x.reborrow(),
            y: y.reborrow(),
            params,
            features_per_node: params.max_features.resolve(x.ncols()),
            rng,
            nodes: Vec::new(),
        };
        grower.grow(samples, 0);
        DecisionTree {
            nodes: grower.nodes,
        }
    }

    /// Probability of label 1 for one row.
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { probability, .. } => return *probability,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Checks the structural invariants a decoded tree must satisfy before it
    /// can be traversed.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { probability, .. } => {
                    if !(0.0..=1.0).contains(probability) {
                        return Err(format!(
                            "leaf {index} has probability {probability} outside [0, 1]"
                        ));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {index} splits on feature {feature}, but there are only {n_features}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {index} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if *child <= index || *child >= self.nodes.len() {
                            return Err(format!(
                                "node {index} refers to child {child}, which is out of order or out of range"
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

struct Grower<'d, 'r> {
    x: ArrayView2<'d, f64>,
    y: ArrayView1<'d, u8>,
    params: &'d TreeParams,
    features_per_node: usize,
    rng: &'r mut StdRng,
    nodes: Vec<TreeNode>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Gini impurity of a node with `positives` of `n` rows labelled 1, scaled by `n`.
fn weighted_gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    n as f64 * 2.0 * p * (1.0 - p)
}

impl Grower<'_, '_> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let index = self.nodes.len();
        let n = samples.len();
        let positives = samples.iter().filter(|&&i| self.y[i] == 1).count();
        let probability = if n == 0 {
            0.5
        } else {
            positives as f64 / n as f64
        };
        self.nodes.push(TreeNode::Leaf {
            probability,
            samples: n,
        });

        let splittable = positives > 0
            && positives < n
            && self.params.max_depth.allows(depth)
            && n >= self.params.min_samples_split
            && n >= 2 * self.params.min_samples_leaf;
        if !splittable {
            return index;
        }

        let Some(best) = self.best_split(&samples) else {
            return index;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[[i, best.feature]] <= best.threshold);

        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[index] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<SplitCandidate> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total_positives = samples.iter().filter(|&&i| self.y[i] == 1).count();
        let features =
            index::sample(&mut *self.rng, self.x.ncols(), self.features_per_node).into_vec();

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = samples.to_vec();
        for feature in features {
            let column = self.x.column(feature);
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left_positives = 0;
            for position in 0..n - 1 {
                left_positives += usize::from(self.y[sorted[position]] == 1);
                let left_n = position + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let current = column[sorted[position]];
                let next = column[sorted[position + 1]];
                if current >= next {
                    continue;
                }

                let impurity = weighted_gini(left_positives, left_n)
                    + weighted_gini(total_positives - left_positives, right_n);
                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    let midpoint = current + (next - current) / 2.0;
                    let threshold = if midpoint >= next { current } else { midpoint };
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, array};
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: MaxDepth::Unlimited,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Count(2),
        }
    }

    #[test]
    fn resolves_feature_counts() {
        assert_eq!(MaxFeatures::Sqrt.resolve(9), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::Count(4).resolve(9), 4);
        assert_eq!(MaxFeatures::Count(12).resolve(9), 9);
    }

    #[test]
    fn separable_data_is_fit_exactly() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [10.0, 0.0], [11.0, 0.0]];
        let y = Array1::from(vec![0u8, 0, 0, 1, 1]);
        let mut rng = StdRng::seed_from_u64(7);
        let tree = DecisionTree::fit(x.view(), y.view(), (0..5).collect(), &params(), &mut rng);

        assert_eq!(tree.depth(), 1);
        match &tree.nodes[0] {
            TreeNode::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 6.5);
            }
            other => panic!("Expected a split at the root, got {other:?}"),
        }
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            assert_eq!(tree.predict_proba_row(row), f64::from(label));
        }
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn depth_and_leaf_limits_are_honoured() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_shape_fn(40, |i| u8::from(i % 3 == 0));
        let mut rng = StdRng::seed_from_u64(1);

        let limited = TreeParams {
            max_depth: MaxDepth::Limited(2),
            min_samples_leaf: 4,
            ..params()
        };
        let tree = DecisionTree::fit(x.view(), y.view(), (0..40).collect(), &limited, &mut rng);
        assert!(tree.depth() <= 2);
        for node in &tree.nodes {
            if let TreeNode::Leaf { samples, .. } = node {
                assert!(*samples >= 4);
            }
        }
    }

    #[test]
    fn constant_features_yield_a_single_leaf() {
        let x = Array2::from_elem((6, 2), 1.0);
        let y = Array1::from(vec![0u8, 1, 0, 1, 1, 1]);
        let mut rng = StdRng::seed_from_u64(3);
        let tree = DecisionTree::fit(x.view(), y.view(), (0..6).collect(), &params(), &mut rng);
        assert_eq!(
            tree.nodes,
            vec![TreeNode::Leaf {
                probability: 4.0 / 6.0,
                samples: 6
            }]
        );
    }

    #[test]
    fn validate_rejects_dangling_children() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 1,
                    right: 5,
                },
                TreeNode::Leaf {
                    probability: 0.5,
                    samples: 1,
                },
            ],
        };
        assert!(tree.validate(1).is_err());

        let cyclic = DecisionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 1.0,
                left: 0,
                right: 0,
            }],
        };
        assert!(cyclic.validate(1).is_err());
        assert!(DecisionTree { nodes: vec![] }.validate(1).is_err());
    }
}

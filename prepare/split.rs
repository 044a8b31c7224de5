//! Seeded train/test split of the labeled rows.

use crate::prepare::select::LabeledData;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("The test fraction must lie strictly between 0 and 1, got {0}.")]
    InvalidFraction(f64),
    #[error("At least 2 rows are required to split, got {0}.")]
    TooFewRows(usize),
}

/// Disjoint train and test subsets. The index vectors refer to rows of the
/// data that was split.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: LabeledData,
    pub test: LabeledData,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Number of test rows for `n` rows: `ceil(n * fraction)`, clamped so both
/// sides keep at least one row.
pub fn test_size(n: usize, fraction: f64) -> usize {
    let size = (n as f64 * fraction).ceil() as usize;
    size.clamp(1, n.saturating_sub(1))
}

/// Shuffles the row indices with `seed` and takes the first `test_size` as the
/// test subset. The same input and seed always give the same split.
pub fn train_test_split(
    data: &LabeledData,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(test_fraction));
    }
    let n = data.n_rows();
    if n < 2 {
        return Err(SplitError::TooFewRows(n));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_indices = indices.split_off(test_size(n, test_fraction));
    let test_indices = indices;
    info!(
        "Split {n} row(s) into {} train / {} test (seed {seed})",
        train_indices.len(),
        test_indices.len()
    );

    Ok(TrainTestSplit {
        train: data.take(&train_indices),
        test: data.take(&test_indices),
        train_indices,
        test_indices,
    })
}

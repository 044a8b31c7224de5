//! # Prediction Service
//!
//! Scores one patient at a time against a loaded artifact. A [`Predictor`] is
//! built once and never mutated, so it can be shared freely between threads.

use crate::learn::artifact::{ModelArtifact, RegistryError};
use crate::learn::metrics::DECISION_THRESHOLD;
use crate::learn::trainer::FittedPipeline;
use crate::prepare::select::FEATURE_COLUMNS;
use ndarray::{Array1, ArrayView1};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputShapeError {
    #[error("Expected {expected} feature values, got {found}.")]
    WrongLength { expected: usize, found: usize },
    #[error("Feature '{feature}' has the non-finite value {value}.")]
    NonFinite { feature: &'static str, value: f64 },
}

/// One patient's model inputs, in contract order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub relapse_free_months: f64,
    pub age_at_diagnosis: f64,
    pub tumor_size: f64,
    pub mutation_count: f64,
    pub aggressive_treatment_score: f64,
    pub nottingham_prognostic_index: f64,
    pub lymph_nodes_positive: f64,
    /// 1 for mastectomy, 0 for breast conserving surgery.
    pub surgery_type: f64,
    pub tumor_stage: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; 9] {
        [
            self.relapse_free_months,
            self.age_at_diagnosis,
            self.tumor_size,
            self.mutation_count,
            self.aggressive_treatment_score,
            self.nottingham_prognostic_index,
            self.lymph_nodes_positive,
            self.surgery_type,
            self.tumor_stage,
        ]
    }

    /// Reads a vector in contract order, rejecting wrong lengths and
    /// non-finite values.
    pub fn from_slice(values: &[f64]) -> Result<Self, InputShapeError> {
        let values: [f64; 9] = values
            .try_into()
            .map_err(|_| InputShapeError::WrongLength {
                expected: FEATURE_COLUMNS.len(),
                found: values.len(),
            })?;
        if let Some((&feature, &value)) = FEATURE_COLUMNS
            .iter()
            .zip(values.iter())
            .find(|(_, v)| !v.is_finite())
        {
            return Err(InputShapeError::NonFinite { feature, value });
        }
        let [
            relapse_free_months,
            age_at_diagnosis,
            tumor_size,
            mutation_count,
            aggressive_treatment_score,
            nottingham_prognostic_index,
            lymph_nodes_positive,
            surgery_type,
            tumor_stage,
        ] = values;
        Ok(Self {
            relapse_free_months,
            age_at_diagnosis,
            tumor_size,
            mutation_count,
            aggressive_treatment_score,
            nottingham_prognostic_index,
            lymph_nodes_positive,
            surgery_type,
            tumor_stage,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurvivalProbabilities {
    pub survival: f64,
    pub death: f64,
}

impl SurvivalProbabilities {
    fn from_survival(survival: f64) -> Self {
        Self {
            survival,
            death: 1.0 - survival,
        }
    }

    /// 1 (living) when survival is more likely than not.
    pub fn predicted_label(&self) -> u8 {
        u8::from(self.survival > DECISION_THRESHOLD)
    }
}

#[derive(Debug, Clone)]
pub struct Predictor {
    pipeline: FittedPipeline,
}

impl Predictor {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self {
            pipeline: artifact.pipeline,
        }
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        ModelArtifact::load(path).map(Self::new)
    }

    /// Scores a raw vector in contract order.
    pub fn predict(&self, values: &[f64]) -> Result<SurvivalProbabilities, InputShapeError> {
        let vector = FeatureVector::from_slice(values)?;
        Ok(self.score_vector(&vector))
    }

    /// Scores a typed vector. Its fields are public, so finiteness is
    /// checked again here.
    pub fn predict_vector(
        &self,
        vector: &FeatureVector,
    ) -> Result<SurvivalProbabilities, InputShapeError> {
        let vector = FeatureVector::from_slice(&vector.to_array())?;
        Ok(self.score_vector(&vector))
    }

    fn score_vector(&self, vector: &FeatureVector) -> SurvivalProbabilities {
        let row = Array1::from(vector.to_array().to_vec());
        self.score_row(row.view())
    }

    fn score_row(&self, row: ArrayView1<f64>) -> SurvivalProbabilities {
        SurvivalProbabilities::from_survival(self.pipeline.predict_proba_row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::artifact::SearchSummary;
    use crate::learn::forest::ForestParams;
    use crate::prepare::select::LabeledData;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn predictor() -> Predictor {
        // Survival depends on the first feature only.
        let data = LabeledData {
            features: Array2::from_shape_fn((40, 9), |(i, j)| if j == 0 { i as f64 } else { (i % 4) as f64 }),
            labels: Array1::from_shape_fn(40, |i| u8::from(i >= 20)),
        };
        let params = ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        };
        let pipeline = FittedPipeline::fit(&data, params, 42).unwrap();
        Predictor::new(ModelArtifact::new(
            pipeline,
            SearchSummary {
                params,
                cv_roc_auc: 1.0,
                folds: 5,
                candidates: 1,
            },
        ))
    }

    #[test]
    fn probabilities_are_complementary_and_deterministic() {
        let predictor = predictor();
        let values = [30.0, 2.0, 1.0, 3.0, 0.0, 2.0, 1.0, 1.0, 2.0];
        let first = predictor.predict(&values).unwrap();
        let second = predictor.predict(&values).unwrap();

        assert_eq!(first, second);
        assert_abs_diff_eq!(first.survival + first.death, 1.0, epsilon = 1e-6);
        assert!((0.0..=1.0).contains(&first.survival));
        assert_eq!(first.predicted_label(), 1);

        let vector = FeatureVector::from_slice(&values).unwrap();
        assert_eq!(predictor.predict_vector(&vector), Ok(first));
        assert_eq!(vector.to_array(), values);
    }

    #[test]
    fn rejects_bad_shapes() {
        let predictor = predictor();
        assert_eq!(
            predictor.predict(&[1.0; 8]).unwrap_err(),
            InputShapeError::WrongLength {
                expected: 9,
                found: 8
            }
        );

        let mut values = [1.0; 9];
        values[2] = f64::NAN;
        match predictor.predict(&values) {
            Err(InputShapeError::NonFinite { feature, .. }) => assert_eq!(feature, FEATURE_COLUMNS[2]),
            other => panic!("Expected NonFinite, got {other:?}"),
        }
    }

    #[test]
    fn typed_vectors_with_non_finite_fields_are_rejected() {
        let predictor = predictor();
        let vector = FeatureVector {
            tumor_size: f64::INFINITY,
            ..FeatureVector::from_slice(&[1.0; 9]).unwrap()
        };
        assert_eq!(
            predictor.predict_vector(&vector),
            Err(InputShapeError::NonFinite {
                feature: FEATURE_COLUMNS[2],
                value: f64::INFINITY
            })
        );

        let vector = FeatureVector {
            tumor_stage: f64::NAN,
            ..vector
        };
        assert!(matches!(
            predictor.predict_vector(&vector),
            Err(InputShapeError::NonFinite { feature, .. }) if feature == FEATURE_COLUMNS[2]
        ));
    }
}

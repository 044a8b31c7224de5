//! Synthetic patient profiles for sanity-checking a trained model.
//!
//! High-risk patients relapse early, are older, and have large tumours,
//! many mutations, intensive treatment, and positive lymph nodes. Low-risk
//! patients sit at the opposite end of every range. A sound model scores the
//! first group well below the second. This is a smoke test, not an
//! evaluation: the held-out metrics come from [`crate::learn::metrics`].

use crate::learn::predict::{FeatureVector, InputShapeError, Predictor, SurvivalProbabilities};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskGroup {
    High,
    Low,
}

impl fmt::Display for RiskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            RiskGroup::High => "high",
            RiskGroup::Low => "low",
        })
    }
}

/// Draws an integer-valued feature from `low..high`.
fn whole(rng: &mut StdRng, low: u32, high: u32) -> f64 {
    f64::from(rng.gen_range(low..high))
}

pub fn generate_patient(group: RiskGroup, rng: &mut StdRng) -> FeatureVector {
    let surgery_type = whole(rng, 0, 2);
    match group {
        RiskGroup::High => FeatureVector {
            relapse_free_months: whole(rng, 6, 24),
            age_at_diagnosis: whole(rng, 61, 80),
            tumor_size: rng.gen_range(5.1..10.0),
            mutation_count: whole(rng, 51, 150),
            aggressive_treatment_score: whole(rng, 3, 5),
            nottingham_prognostic_index: rng.gen_range(5.1..7.5),
            lymph_nodes_positive: whole(rng, 5, 15),
            surgery_type,
            tumor_stage: 3.0,
        },
        RiskGroup::Low => FeatureVector {
            relapse_free_months: whole(rng, 36, 120),
            age_at_diagnosis: whole(rng, 30, 50),
            tumor_size: rng.gen_range(0.5..2.0),
            mutation_count: whole(rng, 1, 10),
            aggressive_treatment_score: whole(rng, 0, 2),
            nottingham_prognostic_index: rng.gen_range(2.0..3.5),
            lymph_nodes_positive: whole(rng, 0, 2),
            surgery_type,
            tumor_stage: 1.0,
        },
    }
}

/// `n_per_group` high-risk patients followed by as many low-risk ones.
pub fn generate_patients(n_per_group: usize, seed: u64) -> Vec<(RiskGroup, FeatureVector)> {
    let mut rng = StdRng::seed_from_u64(seed);
    [RiskGroup::High, RiskGroup::Low]
        .into_iter()
        .flat_map(|group| std::iter::repeat_n(group, n_per_group))
        .map(|group| (group, generate_patient(group, &mut rng)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmokeRow {
    pub group: RiskGroup,
    pub vector: FeatureVector,
    pub probabilities: SurvivalProbabilities,
}

impl SmokeRow {
    pub fn predicted_class(&self) -> u8 {
        self.probabilities.predicted_label()
    }
}

/// Scores freshly generated high- and low-risk patients.
pub fn smoke_test(
    predictor: &Predictor,
    n_per_group: usize,
    seed: u64,
) -> Result<Vec<SmokeRow>, InputShapeError> {
    let rows: Vec<SmokeRow> = generate_patients(n_per_group, seed)
        .into_iter()
        .map(|(group, vector)| {
            Ok(SmokeRow {
                group,
                probabilities: predictor.predict_vector(&vector)?,
                vector,
            })
        })
        .collect::<Result<_, InputShapeError>>()?;

    for group in [RiskGroup::High, RiskGroup::Low] {
        let scores: Vec<f64> = rows
            .iter()
            .filter(|r| r.group == group)
            .map(|r| r.probabilities.survival)
            .collect();
        if !scores.is_empty() {
            info!(
                "{group}-risk synthetic patients: mean survival probability {:.3}",
                scores.iter().sum::<f64>() / scores.len() as f64
            );
        }
    }
    Ok(rows)
}

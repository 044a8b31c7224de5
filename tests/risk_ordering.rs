use brisk::learn::artifact::{ModelArtifact, SearchSummary};
use brisk::learn::predict::Predictor;
use brisk::learn::search::{ParamGrid, SearchConfig};
use brisk::learn::synthetic::{RiskGroup, generate_patients, smoke_test};
use brisk::learn::trainer::train;
use brisk::learn::tree::{MaxDepth, MaxFeatures};
use brisk::prepare::derive::{DECEASED, LIVING};
use brisk::prepare::select::LabeledData;
use ndarray::{Array1, Array2};
use tempfile::tempdir;

// Synthetic cohort: every high-risk patient died, every low-risk patient lived.
fn synthetic_cohort(n_per_group: usize, seed: u64) -> LabeledData {
    let patients = generate_patients(n_per_group, seed);
    let values: Vec<f64> = patients.iter().flat_map(|(_, p)| p.to_array()).collect();
    let labels: Vec<u8> = patients
        .iter()
        .map(|(group, _)| if *group == RiskGroup::High { DECEASED } else { LIVING })
        .collect();
    LabeledData {
        features: Array2::from_shape_vec((patients.len(), 9), values).unwrap(),
        labels: Array1::from(labels),
    }
}

fn quick_search() -> SearchConfig {
    SearchConfig {
        folds: 3,
        seed: 11,
        grid: ParamGrid {
            n_estimators: vec![20],
            max_depth: vec![MaxDepth::Limited(5)],
            min_samples_split: vec![2, 5],
            min_samples_leaf: vec![1],
            bootstrap: vec![true],
            max_features: vec![MaxFeatures::Sqrt],
        },
    }
}

#[test]
fn high_risk_patients_score_below_low_risk_patients() {
    let data = synthetic_cohort(30, 1);
    let outcome = train(&data, &quick_search()).unwrap();
    let artifact = ModelArtifact::new(outcome.pipeline, SearchSummary::from_outcome(&outcome.search));
    let predictor = Predictor::new(artifact);

    let rows = smoke_test(&predictor, 10, 99).unwrap();
    assert_eq!(rows.len(), 20);

    let mean = |group: RiskGroup| {
        let scores: Vec<f64> = rows
            .iter()
            .filter(|r| r.group == group)
            .map(|r| r.probabilities.survival)
            .collect();
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let high = mean(RiskGroup::High);
    let low = mean(RiskGroup::Low);
    assert!(high < low, "high-risk mean {high} should be below low-risk mean {low}");

    for row in &rows {
        let p = row.probabilities;
        assert!((0.0..=1.0).contains(&p.survival));
        assert!((p.survival + p.death - 1.0).abs() <= 1e-6);
    }
    assert!(rows.iter().filter(|r| r.group == RiskGroup::Low).all(|r| r.predicted_class() == LIVING));

    let older_node_positive = predictor
        .predict(&[6.0, 75.0, 8.0, 100.0, 4.0, 6.5, 10.0, 1.0, 3.0])
        .unwrap();
    let young_node_negative = predictor
        .predict(&[90.0, 35.0, 1.0, 3.0, 0.0, 2.5, 0.0, 0.0, 1.0])
        .unwrap();
    assert!(
        older_node_positive.survival < young_node_negative.survival,
        "{older_node_positive:?} should score below {young_node_negative:?}"
    );
    for p in [older_node_positive, young_node_negative] {
        assert!((p.survival + p.death - 1.0).abs() <= 1e-6);
    }
}

#[test]
fn a_saved_model_predicts_exactly_like_the_fitted_one() {
    let data = synthetic_cohort(25, 4);
    let outcome = train(&data, &quick_search()).unwrap();
    let in_memory = outcome.pipeline.predict_proba(data.features.view());

    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("best_model.toml");
    ModelArtifact::new(outcome.pipeline, SearchSummary::from_outcome(&outcome.search))
        .save(&path)
        .unwrap();

    let predictor = Predictor::load(&path).unwrap();
    for (row, expected) in data.features.rows().into_iter().zip(in_memory.iter()) {
        let values: Vec<f64> = row.to_vec();
        let probabilities = predictor.predict(&values).unwrap();
        assert_eq!(probabilities.survival, *expected);
    }

    assert!(predictor.predict(&[1.0, 2.0, 3.0]).is_err());
    assert!(predictor.predict(&[f64::NAN; 9]).is_err());
}

use brisk::learn::artifact::{ModelArtifact, SearchSummary};
use brisk::learn::search::{ParamGrid, SearchConfig};
use brisk::learn::synthetic::{RiskGroup, generate_patients};
use brisk::learn::trainer::train;
use brisk::learn::tree::{MaxDepth, MaxFeatures};
use brisk::prepare::select::LabeledData;
use ndarray::{Array1, Array2};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn save_model(path: &Path) {
    let patients = generate_patients(20, 5);
    let values: Vec<f64> = patients.iter().flat_map(|(_, p)| p.to_array()).collect();
    let labels: Array1<u8> = patients
        .iter()
        .map(|(group, _)| u8::from(*group == RiskGroup::Low))
        .collect();
    let data = LabeledData {
        features: Array2::from_shape_vec((patients.len(), 9), values).expect("nine features"),
        labels,
    };
    let config = SearchConfig {
        folds: 2,
        seed: 3,
        grid: ParamGrid {
            n_estimators: vec![10],
            max_depth: vec![MaxDepth::Limited(4)],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1],
            bootstrap: vec![true],
            max_features: vec![MaxFeatures::Sqrt],
        },
    };
    let outcome = train(&data, &config).expect("training succeeds");
    ModelArtifact::new(outcome.pipeline, SearchSummary::from_outcome(&outcome.search))
        .save(path)
        .expect("save model");
}

fn brisk(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_brisk"))
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("run brisk cli")
}

#[test]
fn predict_and_smoke_read_a_saved_model() {
    let tmp = tempdir().expect("temporary directory");
    let model = tmp.path().join("models").join("model.toml");
    save_model(&model);
    let model_arg = model.to_str().expect("path str");

    let output = brisk(tmp.path(), &["predict", "--model", model_arg, "--relapse-free-months", "12"]);
    assert!(output.status.success(), "predict failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Survival probability:"));
    assert!(stdout.contains("Death probability:"));
    assert!(stdout.contains("Predicted outcome:"));

    let output = brisk(tmp.path(), &["smoke", "--model", model_arg, "--per-group", "3"]);
    assert!(output.status.success(), "smoke failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Header plus three patients per group.
    assert_eq!(stdout.lines().count(), 7);
    assert_eq!(stdout.lines().filter(|l| l.starts_with("high")).count(), 3);
}

#[test]
fn a_missing_model_fails_with_a_clear_message() {
    let tmp = tempdir().expect("temporary directory");
    let output = brisk(tmp.path(), &["predict", "--model", "absent.toml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No model artifact found"), "stderr was: {stderr}");
}

#[test]
fn out_of_range_flags_are_rejected_before_loading() {
    let tmp = tempdir().expect("temporary directory");
    let output = brisk(tmp.path(), &["predict", "--aggressive-treatment-score", "7"]);
    assert!(!output.status.success());

    let output = brisk(tmp.path(), &["predict", "--surgery", "lumpectomy"]);
    assert!(!output.status.success());
}

#[test]
fn version_reports_the_package_version() {
    let tmp = tempdir().expect("temporary directory");
    let output = brisk(tmp.path(), &["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("brisk {}", env!("CARGO_PKG_VERSION"))));
}

//! # Pipeline Runner
//!
//! Chains the stages end to end. The process stage cleans every raw file,
//! imputes all of them as one dataset, and writes each file's rows back out as
//! a `processed_<file>` twin; the train stage reads the
//! processed files back, builds the labeled data, splits it, searches and
//! refits the model, evaluates it on the held-out rows and saves the artifact.
//!
//! Each stage aborts at the first error. Nothing produced by a failed stage is
//! handed on to the next one.

use crate::config::{PathsConfig, PipelineConfig};
use crate::io::{
    OutputError, write_classification_report, write_features, write_labels, write_metrics,
    write_missing_summary, write_table,
};
use crate::learn::artifact::{ModelArtifact, RegistryError, SearchSummary};
use crate::learn::metrics::{EvaluationError, EvaluationReport, evaluate};
use crate::learn::trainer::{TrainingError, train};
use crate::prepare::clean::clean_dataset;
use crate::prepare::derive::{DerivationReport, derive_features};
use crate::prepare::impute::{ImputationError, ImputationReport, impute};
use crate::prepare::loader::{DataAccessError, load_directory, load_files};
use crate::prepare::missing::{MissingShare, summarize};
use crate::prepare::select::{SchemaError, SelectionReport, select_features};
use crate::prepare::split::{SplitError, train_test_split};
use crate::prepare::table::{ClinicalTable, TableError};
use log::{info, warn};
use std::path::PathBuf;
use thiserror::Error;

pub const PROCESSED_PREFIX: &str = "processed_";
pub const MISSING_VALUES_FILE: &str = "missing_values.csv";
pub const METRICS_FILE: &str = "model_metrics.csv";
pub const REPORT_FILE: &str = "classification_report.csv";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Imputation(#[from] ImputationError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub files: Vec<ProcessedFile>,
    /// Missingness of the cleaned raw data, before imputation.
    pub missing: Vec<MissingShare>,
    /// Fills applied to all raw files taken together.
    pub imputation: ImputationReport,
}

#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub derivation: DerivationReport,
    pub selection: SelectionReport,
    pub train_rows: usize,
    pub test_rows: usize,
    pub search: SearchSummary,
    pub evaluation: EvaluationReport,
    pub model_path: PathBuf,
}

/// Cleans and imputes every raw file and writes it to the processed directory.
pub fn process_raw_data(paths: &PathsConfig) -> Result<ProcessSummary, PipelineError> {
    info!("Processing raw files in '{}'", paths.raw_dir.display());
    let mut loaded = load_files(&paths.raw_dir)?;
    for file in &mut loaded {
        clean_dataset(&mut file.table);
    }

    let heights: Vec<usize> = loaded.iter().map(|f| f.table.height()).collect();
    let mut combined = ClinicalTable::vstack(loaded.iter().map(|f| f.table.clone()).collect());
    let missing = summarize(&combined);
    for share in missing.iter().take(5) {
        info!("Missing before imputation: '{}' {:.2}%", share.column, share.percent);
    }
    write_missing_summary(&missing, &paths.results_dir.join(MISSING_VALUES_FILE))?;

    // Medians and subtype modes come from every file together.
    let imputation = impute(&mut combined)?;

    let mut files = Vec::with_capacity(loaded.len());
    let mut start = 0;
    for (file, rows) in loaded.into_iter().zip(heights) {
        let indices: Vec<usize> = (start..start + rows).collect();
        start += rows;
        let output = paths
            .processed_dir
            .join(format!("{PROCESSED_PREFIX}{}", file.file_name()));
        write_table(&combined.take_rows(&indices), &output)?;
        info!("Wrote '{}' ({rows} rows)", output.display());
        files.push(ProcessedFile {
            source: file.path,
            output,
            rows,
        });
    }

    Ok(ProcessSummary {
        files,
        missing,
        imputation,
    })
}

/// Trains, evaluates and saves a model from the processed directory.
pub fn train_and_evaluate(config: &PipelineConfig) -> Result<TrainSummary, PipelineError> {
    let paths = &config.paths;
    info!("Loading processed data from '{}'", paths.processed_dir.display());
    let mut table = load_directory(&paths.processed_dir)?;

    let derivation = derive_features(&mut table)?;
    let (data, selection) = select_features(&mut table)?;
    let split = train_test_split(&data, config.split.test_fraction, config.split.seed)?;

    write_features(&split.train, &paths.train_dir.join("train_features.csv"))?;
    write_labels(&split.train, &paths.train_dir.join("train_labels.csv"))?;
    write_features(&split.test, &paths.test_dir.join("test_features.csv"))?;
    write_labels(&split.test, &paths.test_dir.join("test_labels.csv"))?;

    let outcome = train(&split.train, &config.search)?;
    let evaluation = evaluate(&outcome.pipeline, &split.test)?;
    write_metrics(&evaluation, &paths.results_dir.join(METRICS_FILE))?;
    write_classification_report(&evaluation, &paths.results_dir.join(REPORT_FILE))?;

    let search = SearchSummary::from_outcome(&outcome.search);
    if evaluation.roc_auc + 0.1 < search.cv_roc_auc {
        warn!(
            "Held-out ROC-AUC {:.4} is well below the cross-validated {:.4}; the model may be overfit",
            evaluation.roc_auc, search.cv_roc_auc
        );
    }
    ModelArtifact::new(outcome.pipeline, search.clone()).save(&paths.model_path)?;

    Ok(TrainSummary {
        derivation,
        selection,
        train_rows: split.train.n_rows(),
        test_rows: split.test.n_rows(),
        search,
        evaluation,
        model_path: paths.model_path.clone(),
    })
}

/// Both stages, in order.
pub fn run(config: &PipelineConfig) -> Result<(ProcessSummary, TrainSummary), PipelineError> {
    let processed = process_raw_data(&config.paths)?;
    let trained = train_and_evaluate(config)?;
    Ok((processed, trained))
}

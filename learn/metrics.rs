//! Held-out evaluation of a fitted pipeline.
//!
//! Label 1 (living) is the positive class throughout: F1 is reported for it and
//! ROC-AUC ranks rows by the predicted probability of it.

use crate::learn::trainer::FittedPipeline;
use crate::prepare::select::LabeledData;
use log::info;
use ndarray::{Array1, ArrayView1};
use thiserror::Error;

/// Rows with a positive-class probability above this are predicted as living.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("ROC-AUC is undefined: all {rows} row(s) carry the label {label}.")]
    SingleClass { rows: usize, label: u8 },
    #[error("Got {labels} label(s) but {predictions} prediction(s).")]
    LengthMismatch { labels: usize, predictions: usize },
    #[error("Cannot evaluate on an empty set.")]
    Empty,
}

/// Precision, recall and F1 for one row of the classification report.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Labels 0 and 1, in that order.
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Rows in the order they are written out. The accuracy row repeats the
    /// accuracy in every metric column and carries the total support.
    pub fn rows(&self) -> Vec<ClassMetrics> {
        let total = self.macro_avg.support;
        let mut rows = self.classes.to_vec();
        rows.push(ClassMetrics {
            label: "accuracy".to_string(),
            precision: self.accuracy,
            recall: self.accuracy,
            f1: self.accuracy,
            support: total,
        });
        rows.push(self.macro_avg.clone());
        rows.push(self.weighted_avg.clone());
        rows
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub report: ClassificationReport,
    pub probabilities: Array1<f64>,
    pub predicted: Array1<u8>,
}

impl EvaluationReport {
    /// Headline metrics as (name, value) pairs.
    pub fn summary(&self) -> [(&'static str, f64); 3] {
        [
            ("Accuracy", self.accuracy),
            ("F1-Score", self.f1),
            ("ROC-AUC", self.roc_auc),
        ]
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

fn check_lengths(labels: usize, predictions: usize) -> Result<(), EvaluationError> {
    if labels != predictions {
        return Err(EvaluationError::LengthMismatch {
            labels,
            predictions,
        });
    }
    if labels == 0 {
        return Err(EvaluationError::Empty);
    }
    Ok(())
}

pub fn predict_labels(probabilities: ArrayView1<f64>) -> Array1<u8> {
    probabilities.mapv(|p| u8::from(p > DECISION_THRESHOLD))
}

pub fn accuracy(labels: ArrayView1<u8>, predicted: ArrayView1<u8>) -> Result<f64, EvaluationError> {
    check_lengths(labels.len(), predicted.len())?;
    let correct = labels.iter().zip(predicted.iter()).filter(|(a, b)| a == b).count();
    Ok(correct as f64 / labels.len() as f64)
}

fn class_metrics(labels: ArrayView1<u8>, predicted: ArrayView1<u8>, class: u8) -> ClassMetrics {
    let mut true_positives = 0usize;
    let mut predicted_positives = 0usize;
    let mut support = 0usize;
    for (&actual, &guess) in labels.iter().zip(predicted.iter()) {
        if guess == class {
            predicted_positives += 1;
        }
        if actual == class {
            support += 1;
            if guess == class {
                true_positives += 1;
            }
        }
    }
    let precision = ratio(true_positives as f64, predicted_positives as f64);
    let recall = ratio(true_positives as f64, support as f64);
    ClassMetrics {
        label: class.to_string(),
        precision,
        recall,
        f1: ratio(2.0 * precision * recall, precision + recall),
        support,
    }
}

/// F1 score of `positive`. Zero when it is neither predicted nor present.
pub fn f1_score(labels: ArrayView1<u8>, predicted: ArrayView1<u8>, positive: u8) -> Result<f64, EvaluationError> {
    check_lengths(labels.len(), predicted.len())?;
    Ok(class_metrics(labels, predicted, positive).f1)
}

/// Area under the ROC curve via the Mann-Whitney statistic. Tied scores share
/// their average rank, which counts each tied positive/negative pair as half.
pub fn roc_auc(labels: ArrayView1<u8>, scores: ArrayView1<f64>) -> Result<f64, EvaluationError> {
    check_lengths(labels.len(), scores.len())?;
    let n = labels.len();
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return Err(EvaluationError::SingleClass {
            rows: n,
            label: labels[0],
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie block spans ranks start+1 ..= end.
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| labels[i] == 1).count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Ok(u / (p * negatives as f64))
}

/// Per-class precision, recall and F1 for labels 0 and 1, with macro and
/// support-weighted averages.
pub fn classification_report(
    labels: ArrayView1<u8>,
    predicted: ArrayView1<u8>,
) -> Result<ClassificationReport, EvaluationError> {
    let accuracy = accuracy(labels, predicted)?;
    let classes = [
        class_metrics(labels, predicted, 0),
        class_metrics(labels, predicted, 1),
    ];
    let total: usize = classes.iter().map(|c| c.support).sum();

    let average = |label: &str, weight: &dyn Fn(&ClassMetrics) -> f64| {
        let weights: f64 = classes.iter().map(weight).sum();
        let mean = |metric: fn(&ClassMetrics) -> f64| {
            ratio(classes.iter().map(|c| weight(c) * metric(c)).sum(), weights)
        };
        ClassMetrics {
            label: label.to_string(),
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
            support: total,
        }
    };

    Ok(ClassificationReport {
        macro_avg: average("macro avg", &|_| 1.0),
        weighted_avg: average("weighted avg", &|c| c.support as f64),
        classes,
        accuracy,
    })
}

/// Scores `test` with `pipeline` and computes every held-out metric.
pub fn evaluate(pipeline: &FittedPipeline, test: &LabeledData) -> Result<EvaluationReport, EvaluationError> {
    let probabilities = pipeline.predict_proba(test.features.view());
    let predicted = predict_labels(probabilities.view());
    let labels = test.labels.view();

    let report = EvaluationReport {
        accuracy: accuracy(labels, predicted.view())?,
        f1: f1_score(labels, predicted.view(), 1)?,
        roc_auc: roc_auc(labels, probabilities.view())?,
        report: classification_report(labels, predicted.view())?,
        probabilities,
        predicted,
    };
    info!(
        "Held-out evaluation on {} row(s): accuracy {:.4}, F1 {:.4}, ROC-AUC {:.4}",
        test.n_rows(),
        report.accuracy,
        report.f1,
        report.roc_auc
    );
    Ok(report)
}

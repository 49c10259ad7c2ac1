//! Evaluation metrics
//!
//! Metrics form a closed registry ([`MetricKind`]) split into two families:
//! - Regression: mean squared error, mean absolute error, R²
//! - Classification: accuracy, precision, recall, F1, log-loss
//!
//! Degenerate inputs have fixed fallbacks instead of errors:
//! - R² is `0.0` when the ground truth is constant
//! - precision, recall and F1 score a class as `0.0` when its denominator is zero
//! - log-loss clips probabilities to `[1e-15, 1 - 1e-15]`
//!
//! Log-loss is binary only: the ground truth must be `0`/`1` labels and the
//! predictions are read as the probability of label `1`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{AutoOpError, Result};
use crate::training::TaskType;

/// Clipping bound for log-loss
pub const LOG_LOSS_EPS: f64 = 1e-15;

/// Every metric the harness can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    MeanSquaredError,
    MeanAbsoluteError,
    #[serde(rename = "r2_score")]
    R2Score,
    Accuracy,
    Precision,
    Recall,
    F1Score,
    LogLoss,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::MeanSquaredError,
        MetricKind::MeanAbsoluteError,
        MetricKind::R2Score,
        MetricKind::Accuracy,
        MetricKind::Precision,
        MetricKind::Recall,
        MetricKind::F1Score,
        MetricKind::LogLoss,
    ];

    /// Look up a metric by its canonical name or a short alias
    pub fn from_name(name: &str) -> Result<Self> {
        let kind = match name.trim().to_lowercase().as_str() {
            "mean_squared_error" | "mse" => MetricKind::MeanSquaredError,
            "mean_absolute_error" | "mae" => MetricKind::MeanAbsoluteError,
            "r2_score" | "r2" => MetricKind::R2Score,
            "accuracy" => MetricKind::Accuracy,
            "precision" => MetricKind::Precision,
            "recall" => MetricKind::Recall,
            "f1_score" | "f1" => MetricKind::F1Score,
            "log_loss" | "logloss" => MetricKind::LogLoss,
            _ => return Err(AutoOpError::UnknownMetric(name.to_string())),
        };
        Ok(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::MeanSquaredError => "mean_squared_error",
            MetricKind::MeanAbsoluteError => "mean_absolute_error",
            MetricKind::R2Score => "r2_score",
            MetricKind::Accuracy => "accuracy",
            MetricKind::Precision => "precision",
            MetricKind::Recall => "recall",
            MetricKind::F1Score => "f1_score",
            MetricKind::LogLoss => "log_loss",
        }
    }

    /// Family the metric belongs to
    pub fn task(&self) -> TaskType {
        match self {
            MetricKind::MeanSquaredError | MetricKind::MeanAbsoluteError | MetricKind::R2Score => {
                TaskType::Regression
            }
            _ => TaskType::Classification,
        }
    }

    /// Metrics applicable to `task`
    pub fn for_task(task: TaskType) -> Vec<MetricKind> {
        Self::ALL.iter().copied().filter(|m| m.task() == task).collect()
    }

    /// Metrics defined only for `{0, 1}` labels
    pub fn is_binary_only(&self) -> bool {
        matches!(self, MetricKind::LogLoss)
    }

    /// Score `predictions` against `ground_truth`
    pub fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        if predictions.len() != ground_truth.len() {
            return Err(AutoOpError::LengthMismatch {
                predictions: predictions.len(),
                ground_truth: ground_truth.len(),
            });
        }
        if ground_truth.is_empty() {
            return Err(AutoOpError::ShapeError {
                expected: "at least one value".to_string(),
                actual: "0 values".to_string(),
            });
        }

        if self.is_binary_only() {
            if let Some(label) = ground_truth.iter().find(|&&t| t != 0.0 && t != 1.0) {
                return Err(AutoOpError::IncompatibleTask(format!(
                    "{} requires binary labels 0 and 1, ground truth contains {}",
                    self, label
                )));
            }
        }

        let value = match self {
            MetricKind::MeanSquaredError => mean_squared_error(predictions, ground_truth),
            MetricKind::MeanAbsoluteError => mean_absolute_error(predictions, ground_truth),
            MetricKind::R2Score => r2_score(predictions, ground_truth),
            MetricKind::Accuracy => accuracy(predictions, ground_truth),
            MetricKind::Precision => ClassCounts::new(predictions, ground_truth).precision(),
            MetricKind::Recall => ClassCounts::new(predictions, ground_truth).recall(),
            MetricKind::F1Score => ClassCounts::new(predictions, ground_truth).f1(),
            MetricKind::LogLoss => log_loss(predictions, ground_truth),
        };
        Ok(value)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = AutoOpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// A metric together with its computed value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: MetricKind,
    pub value: f64,
}

fn mean_squared_error(pred: &Array1<f64>, truth: &Array1<f64>) -> f64 {
    let n = truth.len() as f64;
    truth.iter().zip(pred.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n
}

fn mean_absolute_error(pred: &Array1<f64>, truth: &Array1<f64>) -> f64 {
    let n = truth.len() as f64;
    truth.iter().zip(pred.iter()).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
}

fn r2_score(pred: &Array1<f64>, truth: &Array1<f64>) -> f64 {
    let n = truth.len() as f64;
    let mean = truth.sum() / n;
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = truth.iter().zip(pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();

    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    }
}

fn accuracy(pred: &Array1<f64>, truth: &Array1<f64>) -> f64 {
    let correct = truth
        .iter()
        .zip(pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / truth.len() as f64
}

fn log_loss(pred: &Array1<f64>, truth: &Array1<f64>) -> f64 {
    let n = truth.len() as f64;
    let total: f64 = truth
        .iter()
        .zip(pred.iter())
        .map(|(&t, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if t == 1.0 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / n
}

fn label(v: f64) -> i64 {
    v.round() as i64
}

/// Per-class true positive, false positive and false negative counts
struct ClassCounts {
    counts: BTreeMap<i64, (usize, usize, usize)>,
}

impl ClassCounts {
    fn new(pred: &Array1<f64>, truth: &Array1<f64>) -> Self {
        let mut counts: BTreeMap<i64, (usize, usize, usize)> = BTreeMap::new();
        for (&t, &p) in truth.iter().zip(pred.iter()) {
            let (t, p) = (label(t), label(p));
            if t == p {
                counts.entry(t).or_default().0 += 1;
            } else {
                counts.entry(p).or_default().1 += 1;
                counts.entry(t).or_default().2 += 1;
            }
        }
        Self { counts }
    }

    /// Labels {0, 1} score the positive class only; anything else is macro-averaged
    fn scored_classes(&self) -> Vec<i64> {
        let labels: BTreeSet<i64> = self.counts.keys().copied().collect();
        if labels.iter().all(|l| *l == 0 || *l == 1) {
            vec![1]
        } else {
            labels.into_iter().collect()
        }
    }

    fn get(&self, class: i64) -> (usize, usize, usize) {
        self.counts.get(&class).copied().unwrap_or_default()
    }

    fn average(&self, score: impl Fn((usize, usize, usize)) -> f64) -> f64 {
        let classes = self.scored_classes();
        classes.iter().map(|&c| score(self.get(c))).sum::<f64>() / classes.len() as f64
    }

    fn precision(&self) -> f64 {
        self.average(|(tp, fp, _)| ratio(tp, tp + fp))
    }

    fn recall(&self) -> f64 {
        self.average(|(tp, _, fn_)| ratio(tp, tp + fn_))
    }

    fn f1(&self) -> f64 {
        self.average(|(tp, fp, fn_)| {
            let p = ratio(tp, tp + fp);
            let r = ratio(tp, tp + fn_);
            if p + r > 0.0 {
                2.0 * p * r / (p + r)
            } else {
                0.0
            }
        })
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

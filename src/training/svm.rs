//! Support Vector Machine classifier
//!
//! Kernel SVM trained with a simplified SMO (Sequential Minimal Optimization).

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::ModelKind;
use super::models::{class_labels, validate_fit_input, validate_predict_input, Model, ModelState};
use crate::error::{AutoOpError, Result};

/// Beyond this many samples the kernel matrix is not materialized
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    RBF { gamma: f64 },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::RBF { gamma: 1.0 }
    }
}

impl KernelType {
    fn apply(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, gamma, coef0 } => {
                (gamma * a.dot(&b) + coef0).powi(*degree as i32)
            }
            KernelType::RBF { gamma } => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * norm_sq).exp()
            }
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// Tolerance for the KKT check
    pub tol: f64,
    pub max_iter: usize,
    /// Seed for the working-pair selection
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::RBF { gamma: 1.0 },
            tol: 1e-3,
            max_iter: 1000,
            random_state: Some(42),
        }
    }
}

/// A single binary SVM, `+1` for the positive class
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` for each support vector
    dual_coef: Array1<f64>,
    bias: f64,
}

impl BinarySVM {
    fn score(&self, kernel: &KernelType, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, c)| c * kernel.apply(sample, sv))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier.
///
/// Two classes train a single machine for `classes[1]`; more classes use
/// one-vs-rest and pick the highest score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    classes: Vec<f64>,
    machines: Vec<BinarySVM>,
    n_features: Option<usize>,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            machines: Vec::new(),
            n_features: None,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Total number of support vectors across machines
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }

    /// Decision score of every machine for every row, `n x machines`
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        validate_predict_input(self.n_features, x)?;
        let kernel = &self.config.kernel;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.machines.iter().map(|m| m.score(kernel, x.row(i))).collect())
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), self.machines.len()), flat)?)
    }

    fn train_machine(&self, x: &Array2<f64>, kernel_matrix: &Array2<f64>, y: &Array1<f64>) -> BinarySVM {
        let (alphas, bias) = self.smo_train(kernel_matrix, y);

        let support: Vec<usize> = alphas
            .iter()
            .enumerate()
            .filter(|(_, &a)| a > 1e-8)
            .map(|(i, _)| i)
            .collect();

        let mut support_vectors = Array2::zeros((support.len(), x.ncols()));
        let mut dual_coef = Array1::zeros(support.len());
        for (row, &idx) in support.iter().enumerate() {
            support_vectors.row_mut(row).assign(&x.row(idx));
            dual_coef[row] = alphas[idx] * y[idx];
        }

        BinarySVM {
            support_vectors,
            dual_coef,
            bias,
        }
    }

    /// SMO over a precomputed kernel matrix, labels in {-1, +1}
    fn smo_train(&self, k: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;

        if n <= 1 {
            return (alphas, y.first().copied().unwrap_or(0.0));
        }

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut sum = bias;
            for i in 0..n {
                if alphas[i] != 0.0 {
                    sum += alphas[i] * y[i] * k[[i, idx]];
                }
            }
            sum
        };

        let max_passes = 5;
        let mut passes = 0;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];

                if !((y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0)) {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = decision(&alphas, bias, j) - y[j];

                let alpha_i_old = alphas[i];
                let alpha_j_old = alphas[j];

                let (l, h) = if y[i] != y[j] {
                    ((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
                } else {
                    ((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

                let b1 = bias
                    - e_i
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, i]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[i, j]];
                let b2 = bias
                    - e_j
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, j]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[j, j]];

                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                num_changed += 1;
            }

            total_iter += 1;
            passes = if num_changed == 0 { passes + 1 } else { 0 };
        }

        debug!(iterations = total_iter, "SMO finished");
        (alphas, bias)
    }

    /// Kernel matrix, rows computed in parallel
    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let kernel = &self.config.kernel;

        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| kernel.apply(x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, val) in row.into_iter().enumerate() {
                k[[i, j]] = val;
            }
        }
        k
    }
}

impl Model for SVMClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::SvmClassifier
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        if !(self.config.c > 0.0) {
            return Err(AutoOpError::invalid_param("c", self.config.c, "must be positive"));
        }
        if x.nrows() > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(AutoOpError::DataError(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                x.nrows(),
                MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let classes = class_labels(y);
        let positives: Vec<f64> = match classes.len() {
            1 => Vec::new(),
            2 => vec![classes[1]],
            _ => classes.clone(),
        };

        let kernel_matrix = if positives.is_empty() {
            Array2::zeros((0, 0))
        } else {
            self.compute_kernel_matrix(x)
        };

        self.machines = positives
            .iter()
            .map(|&class| {
                let y_signed = y.mapv(|v| if v == class { 1.0 } else { -1.0 });
                self.train_machine(x, &kernel_matrix, &y_signed)
            })
            .collect();
        self.classes = classes;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;

        match self.classes.len() {
            0 => Err(AutoOpError::ModelNotFitted),
            1 => Ok(Array1::from_elem(x.nrows(), self.classes[0])),
            2 => {
                let scores = self.decision_function(x)?;
                Ok(scores
                    .column(0)
                    .mapv(|s| if s >= 0.0 { self.classes[1] } else { self.classes[0] }))
            }
            _ => {
                let scores = self.decision_function(x)?;
                Ok(scores
                    .rows()
                    .into_iter()
                    .map(|row| self.classes[crate::preprocessing::argmax(row.iter().copied())])
                    .collect())
            }
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::SvmClassifier(self.clone())
    }
}

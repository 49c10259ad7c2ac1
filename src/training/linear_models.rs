//! Linear model implementations

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::ModelKind;
use super::models::{
    class_labels, is_binary_labels, one_vs_rest, sigmoid, validate_fit_input, validate_predict_input, Model,
    ModelState,
};
use crate::error::{AutoOpError, Result};

/// Cholesky factorization `A = L L^T`, `None` if `A` is not positive definite
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L L^T x = b` by forward then backward substitution
fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve a symmetric positive semi-definite system `A x = b`.
///
/// Singular systems (collinear or constant columns) are retried with a tiny
/// ridge on the diagonal, which picks a small-norm solution.
fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(AutoOpError::ShapeError {
            expected: format!("{n}x{n} system"),
            actual: format!("{}x{} matrix, {} rhs", a.nrows(), a.ncols(), b.len()),
        });
    }

    if let Some(l) = cholesky(a) {
        return Ok(cholesky_substitute(&l, b));
    }

    let mean_diag = a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let ridge = 1e-8 * mean_diag.max(1.0);
    let mut a_reg = a.clone();
    for k in 0..n {
        a_reg[[k, k]] += ridge;
    }
    debug!(ridge, "Normal equations are singular, retrying with ridge");

    cholesky(&a_reg)
        .map(|l| cholesky_substitute(&l, b))
        .ok_or_else(|| AutoOpError::ComputationError("Matrix is singular, cannot solve normal equations".to_string()))
}

/// Fit `y ~ x w + b` through the normal equations `(X^T X + alpha I) w = X^T y`
fn fit_normal_equations(
    x: &Array2<f64>,
    y: &Array1<f64>,
    alpha: f64,
    fit_intercept: bool,
) -> Result<(Array1<f64>, f64)> {
    let (x_c, y_c, x_mean, y_mean) = center(x, y, fit_intercept);

    let mut xtx = x_c.t().dot(&x_c);
    if alpha > 0.0 {
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += alpha;
        }
    }
    let xty = x_c.t().dot(&y_c);

    let coefficients = solve_symmetric(&xtx, &xty)?;
    let intercept = y_mean - coefficients.dot(&x_mean);
    Ok((coefficients, intercept))
}

/// Center columns and target; zero means when the intercept is not fitted
fn center(x: &Array2<f64>, y: &Array1<f64>, fit_intercept: bool) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    if fit_intercept {
        let x_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_c = x - &x_mean.view().insert_axis(Axis(0));
        let y_c = y - y_mean;
        (x_c, y_c, x_mean, y_mean)
    } else {
        (x.clone(), y.clone(), Array1::zeros(x.ncols()), 0.0)
    }
}

fn linear_predict(coefficients: &Array1<f64>, intercept: f64, x: &Array2<f64>) -> Array1<f64> {
    x.dot(coefficients) + intercept
}

/// Ordinary least squares regression solved with the normal equations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    n_features: Option<usize>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            n_features: None,
        }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Model for LinearRegression {
    fn kind(&self) -> ModelKind {
        ModelKind::LinearRegression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        let (coefficients, intercept) = fit_normal_equations(x, y, 0.0, self.fit_intercept)?;
        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        let coefficients = self.coefficients.as_ref().ok_or(AutoOpError::ModelNotFitted)?;
        Ok(linear_predict(coefficients, self.intercept.unwrap_or(0.0), x))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::LinearRegression(self.clone())
    }
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// L2 regularization strength
    pub alpha: f64,
    n_features: Option<usize>,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
            n_features: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

impl Model for RidgeRegression {
    fn kind(&self) -> ModelKind {
        ModelKind::RidgeRegression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        if !(self.alpha >= 0.0) {
            return Err(AutoOpError::invalid_param("alpha", self.alpha, "must be non-negative"));
        }
        let (coefficients, intercept) = fit_normal_equations(x, y, self.alpha, self.fit_intercept)?;
        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        let coefficients = self.coefficients.as_ref().ok_or(AutoOpError::ModelNotFitted)?;
        Ok(linear_predict(coefficients, self.intercept.unwrap_or(0.0), x))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::RidgeRegression(self.clone())
    }
}

/// Lasso Regression (L1-regularized via coordinate descent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// L1 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    n_features: Option<usize>,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
            max_iter: 1000,
            tol: 1e-6,
            n_features: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Soft-threshold operator for L1 proximal step
    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }
}

impl Model for LassoRegression {
    fn kind(&self) -> ModelKind {
        ModelKind::LassoRegression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        if !(self.alpha >= 0.0) {
            return Err(AutoOpError::invalid_param("alpha", self.alpha, "must be non-negative"));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let (x_c, y_c, x_mean, y_mean) = center(x, y, self.fit_intercept);

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut w = Array1::zeros(n_features);
        let lambda = self.alpha * n_samples as f64;
        let mut r = y_c.clone();

        for _iter in 0..self.max_iter {
            let mut max_delta = 0.0f64;

            for j in 0..n_features {
                if col_norms[j] < 1e-15 {
                    continue;
                }
                let rho = x_c.column(j).dot(&r) + col_norms[j] * w[j];
                let old_wj = w[j];
                w[j] = Self::soft_threshold(rho, lambda) / col_norms[j];
                let delta = old_wj - w[j];
                if delta != 0.0 {
                    r.scaled_add(delta, &x_c.column(j));
                }
                max_delta = max_delta.max(delta.abs());
            }

            if max_delta < self.tol {
                break;
            }
        }

        self.intercept = Some(y_mean - w.dot(&x_mean));
        self.coefficients = Some(w);
        self.n_features = Some(n_features);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        let coefficients = self.coefficients.as_ref().ok_or(AutoOpError::ModelNotFitted)?;
        Ok(linear_predict(coefficients, self.intercept.unwrap_or(0.0), x))
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::LassoRegression(self.clone())
    }
}

/// One binary logistic model: positive class vs the rest
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryLogistic {
    weights: Array1<f64>,
    bias: f64,
}

impl BinaryLogistic {
    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }
}

/// Logistic regression trained with gradient descent.
///
/// Two classes train a single model for `classes[1]`; more classes train one
/// model per class and predict the class with the highest score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// L2 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    pub learning_rate: f64,
    classes: Vec<f64>,
    estimators: Vec<BinaryLogistic>,
    n_features: Option<usize>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            classes: Vec::new(),
            estimators: Vec::new(),
            n_features: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn fit_binary(&self, x: &Array2<f64>, y: &Array1<f64>) -> BinaryLogistic {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _iter in 0..self.max_iter {
            let predictions = (x.dot(&weights) + bias).mapv(sigmoid);
            let errors = &predictions - y;
            let dw = x.t().dot(&errors) / n_samples + self.alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights.scaled_add(-self.learning_rate, &dw);
            bias -= self.learning_rate * db;
        }

        BinaryLogistic { weights, bias }
    }

    /// Probability of `classes[1]` for binary problems
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        match (self.classes.len(), self.estimators.first()) {
            (2, Some(est)) => Ok(est.decision(x).mapv(sigmoid)),
            (1, _) => Ok(Array1::zeros(x.nrows())),
            _ => Err(AutoOpError::ConfigError(
                "predict_proba is only defined for binary problems".to_string(),
            )),
        }
    }
}

impl Model for LogisticRegression {
    fn kind(&self) -> ModelKind {
        ModelKind::LogisticRegression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        if !(self.learning_rate > 0.0) {
            return Err(AutoOpError::invalid_param("learning_rate", self.learning_rate, "must be positive"));
        }
        if !(self.alpha >= 0.0) {
            return Err(AutoOpError::invalid_param("alpha", self.alpha, "must be non-negative"));
        }

        let classes = class_labels(y);
        let positives: Vec<f64> = match classes.len() {
            1 => Vec::new(),
            2 => vec![classes[1]],
            _ => classes.clone(),
        };

        self.estimators = positives
            .iter()
            .map(|&class| self.fit_binary(x, &one_vs_rest(y, class)))
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
                let proba = self.predict_proba(x)?;
                Ok(proba.mapv(|p| if p >= 0.5 { self.classes[1] } else { self.classes[0] }))
            }
            _ => {
                let scores: Vec<Array1<f64>> = self.estimators.iter().map(|e| e.decision(x)).collect();
                Ok((0..x.nrows())
                    .map(|i| {
                        let best = crate::preprocessing::argmax(scores.iter().map(|s| s[i]));
                        self.classes[best]
                    })
                    .collect())
            }
        }
    }

    fn positive_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        if !is_binary_labels(&self.classes) {
            return Ok(None);
        }
        match self.classes.len() {
            2 => Ok(Some(self.predict_proba(x)?)),
            _ => {
                validate_predict_input(self.n_features, x)?;
                Ok(Some(Array1::from_elem(x.nrows(), self.classes[0])))
            }
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::LogisticRegression(self.clone())
    }
}

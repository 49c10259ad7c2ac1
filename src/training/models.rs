//! Model trait and shared model plumbing

use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::config::{ModelKind, TaskType};
use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
use super::svm::SVMClassifier;
use crate::artifact::Artifact;
use crate::error::{AutoOpError, Result};

/// Trait for ML models
pub trait Model: Send + Sync + fmt::Debug {
    /// Registry entry this model belongs to
    fn kind(&self) -> ModelKind;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Probability of label `1` per row for models trained on `{0, 1}`
    /// labels; `None` when the model only emits hard labels
    fn positive_proba(&self, _x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        Ok(None)
    }

    /// Number of features seen at fit time, `None` before fitting
    fn n_features(&self) -> Option<usize>;

    /// Owned copy of the full model state
    fn state(&self) -> ModelState;

    /// Capability tag
    fn task(&self) -> TaskType {
        self.kind().task()
    }

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn is_fitted(&self) -> bool {
        self.n_features().is_some()
    }

    /// Snapshot of hyperparameters and fitted parameters.
    ///
    /// The value is built from a copy of the model, so mutating it never
    /// affects the trained model.
    fn parameters(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.state())?)
    }

    /// Save model to bytes
    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.state())?)
    }

    /// Package the model state as an artifact typed `model:<kind>`
    fn to_artifact(&self, name: &str) -> Result<Artifact> {
        let mut artifact = Artifact::new(name, self.to_bytes()?)
            .with_type(format!("model:{}", self.name()))
            .with_metadata("model", self.name())
            .with_metadata("task", self.task().as_str())
            .with_tag(self.task().as_str());
        if let Some(n) = self.n_features() {
            artifact = artifact.with_metadata("n_features", n.to_string());
        }
        Ok(artifact)
    }
}

/// Serializable state of any model in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    LinearRegression(LinearRegression),
    RidgeRegression(RidgeRegression),
    LassoRegression(LassoRegression),
    LogisticRegression(LogisticRegression),
    KnnRegressor(KNNRegressor),
    KnnClassifier(KNNClassifier),
    SvmClassifier(SVMClassifier),
    DecisionTree(DecisionTree),
    GradientBoostingRegressor(GradientBoostingRegressor),
    GradientBoostingClassifier(GradientBoostingClassifier),
}

impl ModelState {
    pub fn into_model(self) -> Box<dyn Model> {
        match self {
            ModelState::LinearRegression(m) => Box::new(m),
            ModelState::RidgeRegression(m) => Box::new(m),
            ModelState::LassoRegression(m) => Box::new(m),
            ModelState::LogisticRegression(m) => Box::new(m),
            ModelState::KnnRegressor(m) => Box::new(m),
            ModelState::KnnClassifier(m) => Box::new(m),
            ModelState::SvmClassifier(m) => Box::new(m),
            ModelState::DecisionTree(m) => Box::new(m),
            ModelState::GradientBoostingRegressor(m) => Box::new(m),
            ModelState::GradientBoostingClassifier(m) => Box::new(m),
        }
    }
}

/// Load model from bytes produced by [`Model::to_bytes`]
pub fn load_model(bytes: &[u8]) -> Result<Box<dyn Model>> {
    let state: ModelState = bincode::deserialize(bytes)?;
    Ok(state.into_model())
}

/// Check training inputs shared by every model
pub(crate) fn validate_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.ncols() == 0 {
        return Err(AutoOpError::ConfigError(
            "Design matrix has no feature columns".to_string(),
        ));
    }
    if x.nrows() == 0 {
        return Err(AutoOpError::DataError("Cannot fit on zero samples".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(AutoOpError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    Ok(())
}

/// Check prediction inputs against the fitted feature count
pub(crate) fn validate_predict_input(n_features: Option<usize>, x: &Array2<f64>) -> Result<()> {
    let expected = n_features.ok_or(AutoOpError::ModelNotFitted)?;
    if x.ncols() != expected {
        return Err(AutoOpError::FeatureMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// Sorted distinct labels of `y`
pub(crate) fn class_labels(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

/// `1.0` where `y == class`, `0.0` elsewhere
pub(crate) fn one_vs_rest(y: &Array1<f64>, class: f64) -> Array1<f64> {
    y.mapv(|v| if v == class { 1.0 } else { 0.0 })
}

/// Whether fitted class labels are a subset of `{0, 1}`
pub(crate) fn is_binary_labels(classes: &[f64]) -> bool {
    !classes.is_empty() && classes.iter().all(|&c| c == 0.0 || c == 1.0)
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

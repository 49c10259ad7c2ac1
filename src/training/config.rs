//! Task types and the model registry

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNConfig, KNNRegressor};
use super::linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
use super::models::Model;
use super::svm::{SVMClassifier, SVMConfig};
use crate::error::{AutoOpError, Result};

/// Type of ML task, also the capability tag of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = AutoOpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "classification" => Ok(TaskType::Classification),
            "regression" => Ok(TaskType::Regression),
            _ => Err(AutoOpError::ConfigError(format!("Invalid task type: {}", s))),
        }
    }
}

/// Every model the harness can train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    RidgeRegression,
    LassoRegression,
    KnnRegressor,
    DecisionTreeRegressor,
    GradientBoostingRegressor,
    LogisticRegression,
    KnnClassifier,
    SvmClassifier,
    DecisionTreeClassifier,
    GradientBoostingClassifier,
}

impl ModelKind {
    pub const ALL: [ModelKind; 11] = [
        ModelKind::LinearRegression,
        ModelKind::RidgeRegression,
        ModelKind::LassoRegression,
        ModelKind::KnnRegressor,
        ModelKind::DecisionTreeRegressor,
        ModelKind::GradientBoostingRegressor,
        ModelKind::LogisticRegression,
        ModelKind::KnnClassifier,
        ModelKind::SvmClassifier,
        ModelKind::DecisionTreeClassifier,
        ModelKind::GradientBoostingClassifier,
    ];

    /// Look up a model by its canonical name or a short alias
    pub fn from_name(name: &str) -> Result<Self> {
        let kind = match name.trim().to_lowercase().as_str() {
            "linear_regression" | "linear" | "multiple_linear_regression" => ModelKind::LinearRegression,
            "ridge_regression" | "ridge" => ModelKind::RidgeRegression,
            "lasso_regression" | "lasso" => ModelKind::LassoRegression,
            "knn_regressor" => ModelKind::KnnRegressor,
            "decision_tree_regressor" => ModelKind::DecisionTreeRegressor,
            "gradient_boosting_regressor" => ModelKind::GradientBoostingRegressor,
            "logistic_regression" | "logistic" => ModelKind::LogisticRegression,
            "knn_classifier" | "knn" => ModelKind::KnnClassifier,
            "svm_classifier" | "svm" => ModelKind::SvmClassifier,
            "decision_tree_classifier" | "decision_tree" => ModelKind::DecisionTreeClassifier,
            "gradient_boosting_classifier" => ModelKind::GradientBoostingClassifier,
            _ => return Err(AutoOpError::UnknownModel(name.to_string())),
        };
        Ok(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::RidgeRegression => "ridge_regression",
            ModelKind::LassoRegression => "lasso_regression",
            ModelKind::KnnRegressor => "knn_regressor",
            ModelKind::DecisionTreeRegressor => "decision_tree_regressor",
            ModelKind::GradientBoostingRegressor => "gradient_boosting_regressor",
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::KnnClassifier => "knn_classifier",
            ModelKind::SvmClassifier => "svm_classifier",
            ModelKind::DecisionTreeClassifier => "decision_tree_classifier",
            ModelKind::GradientBoostingClassifier => "gradient_boosting_classifier",
        }
    }

    /// Capability tag
    pub fn task(&self) -> TaskType {
        match self {
            ModelKind::LinearRegression
            | ModelKind::RidgeRegression
            | ModelKind::LassoRegression
            | ModelKind::KnnRegressor
            | ModelKind::DecisionTreeRegressor
            | ModelKind::GradientBoostingRegressor => TaskType::Regression,
            ModelKind::LogisticRegression
            | ModelKind::KnnClassifier
            | ModelKind::SvmClassifier
            | ModelKind::DecisionTreeClassifier
            | ModelKind::GradientBoostingClassifier => TaskType::Classification,
        }
    }

    /// Models able to handle `task`
    pub fn for_task(task: TaskType) -> Vec<ModelKind> {
        Self::ALL.iter().copied().filter(|m| m.task() == task).collect()
    }

    /// Unfitted model with default hyperparameters
    pub fn build(&self) -> Box<dyn Model> {
        match self {
            ModelKind::LinearRegression => Box::new(LinearRegression::new()),
            ModelKind::RidgeRegression => Box::new(RidgeRegression::default()),
            ModelKind::LassoRegression => Box::new(LassoRegression::default()),
            ModelKind::KnnRegressor => Box::new(KNNRegressor::new(KNNConfig::default())),
            ModelKind::DecisionTreeRegressor => Box::new(DecisionTree::new_regressor()),
            ModelKind::GradientBoostingRegressor => {
                Box::new(GradientBoostingRegressor::new(GradientBoostingConfig::default()))
            }
            ModelKind::LogisticRegression => Box::new(LogisticRegression::new()),
            ModelKind::KnnClassifier => Box::new(KNNClassifier::new(KNNConfig::default())),
            ModelKind::SvmClassifier => Box::new(SVMClassifier::new(SVMConfig::default())),
            ModelKind::DecisionTreeClassifier => Box::new(DecisionTree::new_classifier()),
            ModelKind::GradientBoostingClassifier => {
                Box::new(GradientBoostingClassifier::new(GradientBoostingConfig::default()))
            }
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = AutoOpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

//! Model training module
//!
//! Provides the model registry and the models it can build:
//! - Linear models (OLS, Ridge, Lasso, Logistic)
//! - K-Nearest Neighbors
//! - Support Vector Machines
//! - Decision trees
//! - Gradient boosting
//!
//! Every model implements [`Model`], so the pipeline drives them through a
//! `Box<dyn Model>` and persists them through [`ModelState`].

mod config;
mod models;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod svm;

pub use config::{ModelKind, TaskType};
pub use models::{load_model, Model, ModelState};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, KNNRegressor, WeightScheme};
pub use linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
pub use svm::{KernelType, SVMClassifier, SVMConfig};

//! Gradient Boosting implementation
//!
//! Gradient boosted regression trees with row and column subsampling.
//! The classifier boosts log-odds, one ensemble per class beyond two.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::ModelKind;
use super::decision_tree::DecisionTree;
use super::models::{
    class_labels, one_vs_rest, sigmoid, validate_fit_input, validate_predict_input, Model, ModelState,
};
use crate::error::{AutoOpError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio for each tree
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

impl GradientBoostingConfig {
    fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(AutoOpError::invalid_param("learning_rate", self.learning_rate, "must be positive"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(AutoOpError::invalid_param("subsample", self.subsample, "must be in (0, 1]"));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(AutoOpError::invalid_param(
                "colsample_bytree",
                self.colsample_bytree,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        match self.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }
}

/// Random sorted subset of `0..n` of size `ceil(n * ratio)`
fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let sample_size = (((n as f64) * ratio).ceil() as usize).clamp(1, n);
    let mut indices: Vec<usize> = (0..n).collect();
    if sample_size < n {
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
    }
    indices
}

/// A boosted sum of regression trees over a raw score
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ensemble {
    initial: f64,
    /// Each tree with the columns it was trained on
    trees: Vec<(DecisionTree, Vec<usize>)>,
}

impl Ensemble {
    /// Boost from `initial`; `gradient(y, score)` gives the pseudo-residual
    fn fit(
        config: &GradientBoostingConfig,
        x: &Array2<f64>,
        y: &Array1<f64>,
        initial: f64,
        gradient: impl Fn(f64, f64) -> f64,
        rng: &mut Xoshiro256PlusPlus,
        importances: &mut [f64],
    ) -> Result<Self> {
        let n_samples = x.nrows();
        let mut scores = Array1::from_elem(n_samples, initial);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let residuals: Array1<f64> = y
                .iter()
                .zip(scores.iter())
                .map(|(&yi, &si)| gradient(yi, si))
                .collect();

            let rows = sample_indices(n_samples, config.subsample, rng);
            let cols = sample_indices(x.ncols(), config.colsample_bytree, rng);

            let x_cols = x.select(Axis(1), &cols);
            let x_sub = x_cols.select(Axis(0), &rows);
            let y_sub = residuals.select(Axis(0), &rows);

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(config.max_depth)
                .with_min_samples_leaf(config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;

            // every row moves, sampled or not
            let update = tree.predict(&x_cols)?;
            scores.scaled_add(config.learning_rate, &update);

            if let Some(tree_importance) = tree.feature_importances() {
                for (j, &col) in cols.iter().enumerate() {
                    importances[col] += tree_importance[j];
                }
            }
            trees.push((tree, cols));
        }

        Ok(Self { initial, trees })
    }

    fn raw_predict(&self, x: &Array2<f64>, learning_rate: f64) -> Result<Array1<f64>> {
        let mut scores = Array1::from_elem(x.nrows(), self.initial);
        for (tree, cols) in &self.trees {
            let update = tree.predict(&x.select(Axis(1), cols))?;
            scores.scaled_add(learning_rate, &update);
        }
        Ok(scores)
    }
}

fn normalize(importances: &mut [f64]) {
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        importances.iter_mut().for_each(|imp| *imp /= total);
    }
}

/// Gradient Boosting Regressor (squared loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    ensemble: Option<Ensemble>,
    feature_importances: Vec<f64>,
    n_features: Option<usize>,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            ensemble: None,
            feature_importances: Vec::new(),
            n_features: None,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

impl Model for GradientBoostingRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoostingRegressor
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        self.config.validate()?;

        let mut rng = self.config.rng();
        let mut importances = vec![0.0; x.ncols()];
        let initial = y.mean().unwrap_or(0.0);

        let ensemble = Ensemble::fit(&self.config, x, y, initial, |yi, si| yi - si, &mut rng, &mut importances)?;
        debug!(trees = ensemble.trees.len(), "Boosted regressor fitted");

        normalize(&mut importances);
        self.ensemble = Some(ensemble);
        self.feature_importances = importances;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        let ensemble = self.ensemble.as_ref().ok_or(AutoOpError::ModelNotFitted)?;
        ensemble.raw_predict(x, self.config.learning_rate)
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::GradientBoostingRegressor(self.clone())
    }
}

/// Gradient Boosting Classifier (log loss).
///
/// Two classes boost the log-odds of `classes[1]`; more classes boost one
/// ensemble per class and predict the highest score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    classes: Vec<f64>,
    ensembles: Vec<Ensemble>,
    feature_importances: Vec<f64>,
    n_features: Option<usize>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            ensembles: Vec::new(),
            feature_importances: Vec::new(),
            n_features: None,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Probability of `classes[1]` for binary problems
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        match (self.classes.len(), self.ensembles.first()) {
            (2, Some(ensemble)) => Ok(ensemble.raw_predict(x, self.config.learning_rate)?.mapv(sigmoid)),
            (1, _) => Ok(Array1::zeros(x.nrows())),
            _ => Err(AutoOpError::ConfigError(
                "predict_proba is only defined for binary problems".to_string(),
            )),
        }
    }
}

impl Model for GradientBoostingClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoostingClassifier
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        self.config.validate()?;

        let classes = class_labels(y);
        let positives: Vec<f64> = match classes.len() {
            1 => Vec::new(),
            2 => vec![classes[1]],
            _ => classes.clone(),
        };

        let mut rng = self.config.rng();
        let mut importances = vec![0.0; x.ncols()];
        let mut ensembles = Vec::with_capacity(positives.len());

        for &class in &positives {
            let target = one_vs_rest(y, class);
            let p = target.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
            let initial = (p / (1.0 - p)).ln();

            let ensemble = Ensemble::fit(
                &self.config,
                x,
                &target,
                initial,
                |yi, si| yi - sigmoid(si),
                &mut rng,
                &mut importances,
            )?;
            ensembles.push(ensemble);
        }
        debug!(classes = classes.len(), "Boosted classifier fitted");

        normalize(&mut importances);
        self.classes = classes;
        self.ensembles = ensembles;
        self.feature_importances = importances;
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
                let scores = self
                    .ensembles
                    .iter()
                    .map(|e| e.raw_predict(x, self.config.learning_rate))
                    .collect::<Result<Vec<_>>>()?;
                Ok((0..x.nrows())
                    .map(|i| self.classes[crate::preprocessing::argmax(scores.iter().map(|s| s[i]))])
                    .collect())
            }
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::GradientBoostingClassifier(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| row[0] * 2.0 + row[1] * 0.5 + 1.0)
            .collect();
        (x, y)
    }

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + row[1] > 10.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    fn small_config() -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_gradient_boosting_regressor() {
        let (x, y) = create_regression_data();
        let mut model = GradientBoostingRegressor::new(small_config());
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        let mse: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(yi, pi)| (yi - pi).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        let y_var = y.var(0.0);
        assert!(mse < y_var, "MSE ({}) should be less than variance ({})", mse, y_var);
    }

    #[test]
    fn test_gradient_boosting_classifier() {
        let (x, y) = create_classification_data();
        let mut model = GradientBoostingClassifier::new(small_config());
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        let correct = y.iter().zip(predictions.iter()).filter(|(a, b)| a == b).count();
        let accuracy = correct as f64 / y.len() as f64;
        assert!(accuracy > 0.9, "Accuracy ({}) should be above 90%", accuracy);
    }

    #[test]
    fn test_multiclass_and_single_class() {
        let x = array![[0.0], [0.1], [5.0], [5.1], [10.0], [10.1]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            subsample: 1.0,
            ..small_config()
        });
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        model.fit(&array![[1.0], [2.0]], &array![4.0, 4.0]).unwrap();
        assert_eq!(model.predict(&array![[3.0]]).unwrap(), array![4.0]);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (x, y) = create_regression_data();
        let mut a = GradientBoostingRegressor::new(small_config());
        let mut b = GradientBoostingRegressor::new(small_config());
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_feature_importances() {
        let (x, y) = create_regression_data();
        let mut model = GradientBoostingRegressor::new(small_config());
        model.fit(&x, &y).unwrap();

        let importances = model.feature_importances();
        assert_eq!(importances.len(), 2);
        let sum: f64 = importances.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_subsample() {
        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig {
            subsample: 0.0,
            ..Default::default()
        });
        let err = model.fit(&array![[1.0]], &array![1.0]).unwrap_err();
        assert!(matches!(err, AutoOpError::InvalidParameter { .. }));
    }
}

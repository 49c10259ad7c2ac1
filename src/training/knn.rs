//! K-Nearest Neighbors implementation
//!
//! KNN classifier and regressor with distance metrics.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::ModelKind;
use super::models::{
    class_labels, is_binary_labels, validate_fit_input, validate_predict_input, Model, ModelState,
};
use crate::error::{AutoOpError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

impl KNNConfig {
    fn validate(&self) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(AutoOpError::invalid_param("n_neighbors", 0, "must be at least 1"));
        }
        if let DistanceMetric::Minkowski(p) = self.metric {
            if !(p >= 1.0) {
                return Err(AutoOpError::invalid_param("p", p, "Minkowski order must be >= 1"));
            }
        }
        Ok(())
    }
}

/// Stored training set shared by both estimators
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainingSet {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl TrainingSet {
    fn neighbors(&self, point: ArrayView1<f64>, config: &KNNConfig) -> Vec<Neighbor> {
        // k never exceeds the number of stored samples
        let k = config.n_neighbors.min(self.x.nrows());
        find_k_nearest(point, &self.x, &self.y, k, config.metric)
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    train: Option<TrainingSet>,
    classes: Vec<f64>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            train: None,
            classes: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Predict class probabilities, columns ordered like [`Self::classes`]
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        validate_predict_input(self.n_features(), x)?;
        let train = self.train.as_ref().ok_or(AutoOpError::ModelNotFitted)?;
        let n_classes = self.classes.len();

        let probs: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = train.neighbors(x.row(i), &self.config);
                class_probs_from(&neighbors, &self.classes, self.config.weights)
            })
            .collect();

        let flat: Vec<f64> = probs.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }
}

impl Model for KNNClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::KnnClassifier
    }

    /// Stores the training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        self.config.validate()?;
        self.classes = class_labels(y);
        self.train = Some(TrainingSet {
            x: x.clone(),
            y: y.clone(),
        });
        Ok(())
    }

    /// Predict class labels (parallelized over test samples)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features(), x)?;
        let train = self.train.as_ref().ok_or(AutoOpError::ModelNotFitted)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = train.neighbors(x.row(i), &self.config);
                vote_classify(&neighbors, self.config.weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    /// Neighbor vote share of label `1`
    fn positive_proba(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        if !is_binary_labels(&self.classes) {
            return Ok(None);
        }
        let proba = self.predict_proba(x)?;
        Ok(Some(match self.classes.iter().position(|&c| c == 1.0) {
            Some(col) => proba.column(col).to_owned(),
            None => Array1::zeros(x.nrows()),
        }))
    }

    fn n_features(&self) -> Option<usize> {
        self.train.as_ref().map(|t| t.x.ncols())
    }

    fn state(&self) -> ModelState {
        ModelState::KnnClassifier(self.clone())
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    train: Option<TrainingSet>,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self { config, train: None }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }
}

impl Model for KNNRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::KnnRegressor
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        self.config.validate()?;
        self.train = Some(TrainingSet {
            x: x.clone(),
            y: y.clone(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features(), x)?;
        let train = self.train.as_ref().ok_or(AutoOpError::ModelNotFitted)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = train.neighbors(x.row(i), &self.config);
                weighted_mean_from(&neighbors, self.config.weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn n_features(&self) -> Option<usize> {
        self.train.as_ref().map(|t| t.x.ncols())
    }

    fn state(&self) -> ModelState {
        ModelState::KnnRegressor(self.clone())
    }
}

/// Neighbor candidate; ties on distance go to the earlier training row
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    dist: f64,
    index: usize,
    label: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.index.cmp(&other.index))
    }
}

/// Find k nearest neighbors with a max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<Neighbor> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (index, row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor {
            dist: compute_distance(point, row, metric),
            index,
            label: y_train[index],
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(top) = heap.peek() {
            if candidate < *top {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec()
}

/// Compute distance between two points using the specified metric
fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    let diffs = a.iter().zip(b.iter()).map(|(ai, bi)| ai - bi);
    match metric {
        DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
        DistanceMetric::Manhattan => diffs.map(f64::abs).sum(),
        DistanceMetric::Minkowski(p) => diffs.map(|d| d.abs().powf(p)).sum::<f64>().powf(1.0 / p),
    }
}

fn neighbor_weight(dist: f64, weights: WeightScheme) -> f64 {
    match weights {
        WeightScheme::Uniform => 1.0,
        WeightScheme::Distance => 1.0 / (dist + 1e-10),
    }
}

/// Classify by weighted majority vote, ties go to the smaller label
fn vote_classify(neighbors: &[Neighbor], weights: WeightScheme) -> f64 {
    let mut votes: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for n in neighbors {
        let entry = votes.entry(n.label as i64).or_insert((n.label, 0.0));
        entry.1 += neighbor_weight(n.dist, weights);
    }

    let mut best: Option<(f64, f64)> = None;
    for (label, weight) in votes.into_values() {
        match best {
            Some((_, w)) if weight <= w => {}
            _ => best = Some((label, weight)),
        }
    }
    best.map(|(label, _)| label).unwrap_or(0.0)
}

fn class_probs_from(neighbors: &[Neighbor], classes: &[f64], weights: WeightScheme) -> Vec<f64> {
    let mut counts = vec![0.0; classes.len()];
    let mut total = 0.0;
    for n in neighbors {
        if let Some(idx) = classes.iter().position(|&c| c == n.label) {
            let weight = neighbor_weight(n.dist, weights);
            counts[idx] += weight;
            total += weight;
        }
    }
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

fn weighted_mean_from(neighbors: &[Neighbor], weights: WeightScheme) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for n in neighbors {
        let w = neighbor_weight(n.dist, weights);
        weighted_sum += w * n.label;
        weight_total += w;
    }
    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((20, 2), vec![
            // Class 0 (low values)
            1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0,
            1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
            // Class 1 (high values)
            8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0,
            8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
        ]).unwrap();

        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        ]);

        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_knn_regressor() {
        let x = Array2::from_shape_vec((10, 2), (0..20).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = x.rows().into_iter().map(|row| row[0] + row[1]).collect();

        let mut knn = KNNRegressor::with_k(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        let mse: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(yi, pi)| (yi - pi).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 10.0, "MSE ({}) should be low", mse);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let mut knn = KNNRegressor::with_k(10);
        knn.fit(&array![[0.0], [1.0]], &array![2.0, 4.0]).unwrap();
        let pred = knn.predict(&array![[0.5]]).unwrap();
        assert!((pred[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let mut knn = KNNClassifier::with_k(0);
        let err = knn.fit(&array![[0.0]], &array![1.0]).unwrap_err();
        assert!(matches!(err, AutoOpError::InvalidParameter { .. }));
    }

    #[test]
    fn test_distance_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Euclidean) - 5.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Manhattan) - 7.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Minkowski(2.0)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_knn_proba() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::new(KNNConfig {
            n_neighbors: 5,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&array![[1.0, 1.0], [9.0, 9.0]]).unwrap();
        assert_eq!(proba.dim(), (2, 2));
        assert!(proba[[0, 0]] > 0.99);
        assert!(proba[[1, 1]] > 0.99);

        let positive = knn.positive_proba(&array![[1.0, 1.0], [9.0, 9.0]]).unwrap().unwrap();
        assert_eq!(positive, proba.column(1).to_owned());
    }

    #[test]
    fn test_vote_tie_prefers_smaller_label() {
        let mut knn = KNNClassifier::with_k(2);
        knn.fit(&array![[-1.0], [1.0]], &array![1.0, 0.0]).unwrap();
        assert_eq!(knn.predict(&array![[0.0]]).unwrap(), array![0.0]);
    }
}

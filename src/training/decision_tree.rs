//! Decision tree implementation

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::ModelKind;
use super::models::{class_labels, validate_fit_input, validate_predict_input, Model, ModelState};
use crate::error::{AutoOpError, Result};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Sufficient statistics of a set of targets
#[derive(Debug, Clone)]
struct NodeStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    /// Per-class counts, empty for regression
    class_counts: Vec<usize>,
}

impl NodeStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64, class: Option<usize>) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
        if let Some(c) = class {
            self.class_counts[c] += 1;
        }
    }

    fn remove(&mut self, y: f64, class: Option<usize>) {
        self.count -= 1;
        self.sum -= y;
        self.sq_sum -= y * y;
        if let Some(c) = class {
            self.class_counts[c] -= 1;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]²
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// Decision tree model (CART)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    n_features: Option<usize>,
    feature_importances: Option<Array1<f64>>,
    is_classification: bool,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            n_features: None,
            feature_importances: None,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn is_classification(&self) -> bool {
        self.is_classification
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Normalized impurity decrease per feature
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    fn validate_params(&self) -> Result<()> {
        let classification_criterion = matches!(self.criterion, Criterion::Gini | Criterion::Entropy);
        if classification_criterion != self.is_classification {
            return Err(AutoOpError::ConfigError(format!(
                "Criterion {:?} does not match a {} tree",
                self.criterion,
                if self.is_classification { "classification" } else { "regression" }
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(AutoOpError::invalid_param("min_samples_leaf", 0, "must be at least 1"));
        }
        Ok(())
    }

    fn class_index(&self, y: f64) -> Option<usize> {
        if self.is_classification {
            self.classes.binary_search_by(|c| c.total_cmp(&y)).ok()
        } else {
            None
        }
    }

    fn stats(&self, y: &Array1<f64>, indices: &[usize]) -> NodeStats {
        let mut stats = NodeStats::empty(self.classes.len());
        for &i in indices {
            stats.add(y[i], self.class_index(y[i]));
        }
        stats
    }

    fn leaf_value(&self, stats: &NodeStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        if self.is_classification {
            // mode, ties go to the smaller class
            let mut best = 0;
            for (c, &count) in stats.class_counts.iter().enumerate() {
                if count > stats.class_counts[best] {
                    best = c;
                }
            }
            self.classes.get(best).copied().unwrap_or(0.0)
        } else {
            stats.sum / stats.count as f64
        }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.stats(y, indices);
        let impurity = stats.impurity(self.criterion);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        let leaf = || TreeNode::Leaf {
            value: self.leaf_value(&stats),
            n_samples,
        };

        if should_stop {
            return leaf();
        }

        let Some((feature_idx, threshold, gain)) = self.find_best_split(x, y, indices, &stats) else {
            return leaf();
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return leaf();
        }

        importances[feature_idx] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Best `(feature, threshold, gain)` by a sorted sweep over every feature
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &NodeStats,
    ) -> Option<(usize, f64, f64)> {
        let parent_impurity = parent.impurity(self.criterion);
        let n = indices.len() as f64;

        let feature_results: Vec<Option<(usize, f64, f64)>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature_idx| {
                let mut sorted = indices.to_vec();
                sorted.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

                let mut left = NodeStats::empty(self.classes.len());
                let mut right = parent.clone();
                let mut best: Option<(f64, f64)> = None;

                for pos in 0..sorted.len() - 1 {
                    let idx = sorted[pos];
                    let class = self.class_index(y[idx]);
                    left.add(y[idx], class);
                    right.remove(y[idx], class);

                    let value = x[[idx, feature_idx]];
                    let next = x[[sorted[pos + 1], feature_idx]];
                    if value == next
                        || left.count < self.min_samples_leaf
                        || right.count < self.min_samples_leaf
                    {
                        continue;
                    }

                    let weighted = (left.count as f64 * left.impurity(self.criterion)
                        + right.count as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        // the midpoint of adjacent floats can round up to `next`
                        let mid = (value + next) / 2.0;
                        let threshold = if mid < next { mid } else { value };
                        best = Some((gain, threshold));
                    }
                }

                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        // ties go to the lower feature index
        let mut best: Option<(usize, f64, f64)> = None;
        for candidate in feature_results.into_iter().flatten() {
            if best.map_or(true, |b| candidate.2 > b.2) {
                best = Some(candidate);
            }
        }
        best
    }
}

impl Model for DecisionTree {
    fn kind(&self) -> ModelKind {
        if self.is_classification {
            ModelKind::DecisionTreeClassifier
        } else {
            ModelKind::DecisionTreeRegressor
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_input(x, y)?;
        self.validate_params()?;

        let n_features = x.ncols();
        self.classes = if self.is_classification { class_labels(y) } else { Vec::new() };

        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|imp| *imp /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        self.n_features = Some(n_features);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        validate_predict_input(self.n_features, x)?;
        let root = self.root.as_ref().ok_or(AutoOpError::ModelNotFitted)?;
        Ok(x.rows().into_iter().map(|row| root.predict(row)).collect())
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn state(&self) -> ModelState {
        ModelState::DecisionTree(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.kind(), ModelKind::DecisionTreeClassifier);
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 1e-12, "MSE too high: {}", mse);
        assert_eq!(tree.kind(), ModelKind::DecisionTreeRegressor);
    }

    #[test]
    fn test_single_sample_is_a_leaf() {
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&array![[1.0]], &array![4.0]).unwrap();
        assert_eq!(tree.get_n_leaves(), 1);
        assert_eq!(tree.predict(&array![[9.0]]).unwrap(), array![4.0]);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 2);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_split_between_adjacent_floats() {
        let a = 1.0 + f64::EPSILON;
        let b = 1.0 + 2.0 * f64::EPSILON;
        let x = array![[a], [b]];
        let y = array![0.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_n_leaves(), 2);
        assert_eq!(tree.predict(&x).unwrap(), y);

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &array![3.0, 5.0]).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), array![3.0, 5.0]);
    }

    #[test]
    fn test_criterion_mismatch() {
        let mut tree = DecisionTree::new_regressor().with_criterion(Criterion::Gini);
        let err = tree.fit(&array![[1.0], [2.0]], &array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, AutoOpError::ConfigError(_)));
    }
}

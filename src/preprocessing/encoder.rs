//! One-hot encoding for categorical columns

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{AutoOpError, Result};

/// One-hot encoder over a single column.
///
/// Categories are kept in lexicographic order, so column `j` of the encoded
/// matrix stands for `categories()[j]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<String>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the set of categories observed in `values`
    pub fn fit<S: AsRef<str>>(&mut self, values: &[S]) -> Result<&mut Self> {
        if values.is_empty() {
            return Err(AutoOpError::DataError(
                "Cannot fit one-hot encoder on an empty column".to_string(),
            ));
        }

        let unique: BTreeSet<&str> = values.iter().map(|v| v.as_ref()).collect();
        self.categories = unique.into_iter().map(str::to_string).collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Encode `values` as an `n x n_categories` indicator matrix
    pub fn transform<S: AsRef<str>>(&self, values: &[S]) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(AutoOpError::ModelNotFitted);
        }

        let mut out = Array2::zeros((values.len(), self.categories.len()));
        for (i, v) in values.iter().enumerate() {
            let j = self.category_index(v.as_ref()).ok_or_else(|| {
                AutoOpError::DataError(format!("Unknown category '{}'", v.as_ref()))
            })?;
            out[[i, j]] = 1.0;
        }
        Ok(out)
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, values: &[S]) -> Result<Array2<f64>> {
        self.fit(values)?;
        self.transform(values)
    }

    /// Decode an indicator matrix back into categories (argmax per row)
    pub fn inverse_transform(&self, encoded: &Array2<f64>) -> Result<Vec<String>> {
        if !self.is_fitted {
            return Err(AutoOpError::ModelNotFitted);
        }
        if encoded.ncols() != self.categories.len() {
            return Err(AutoOpError::ShapeError {
                expected: format!("{} columns", self.categories.len()),
                actual: format!("{} columns", encoded.ncols()),
            });
        }

        Ok(encoded
            .rows()
            .into_iter()
            .map(|row| self.categories[argmax(row.iter().copied())].clone())
            .collect())
    }

    /// Position of `category` in the sorted category list
    pub fn category_index(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Index of the first maximum
pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}

//! Standard scaling for numerical columns

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{AutoOpError, Result};

/// Zero-mean, unit-variance scaler over a single column.
///
/// Uses the population standard deviation. A constant column gets
/// `scale = 1.0`, so it transforms to all zeros instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
    is_fitted: bool,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self {
            mean: 0.0,
            scale: 1.0,
            is_fitted: false,
        }
    }
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, values: &[f64]) -> Result<&mut Self> {
        if values.is_empty() {
            return Err(AutoOpError::DataError(
                "Cannot fit standard scaler on an empty column".to_string(),
            ));
        }

        // a constant column keeps its exact value as mean so it maps to 0
        if values.iter().all(|&v| v == values[0]) {
            self.mean = values[0];
            self.scale = 1.0;
            self.is_fitted = true;
            return Ok(self);
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();

        self.mean = mean;
        self.scale = if std > 0.0 { std } else { 1.0 };
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, values: &[f64]) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(AutoOpError::ModelNotFitted);
        }
        Ok(values.iter().map(|v| (v - self.mean) / self.scale).collect())
    }

    pub fn fit_transform(&mut self, values: &[f64]) -> Result<Array1<f64>> {
        self.fit(values)?;
        self.transform(values)
    }

    /// Map standardized values back to the original units
    pub fn inverse_transform(&self, values: &[f64]) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(AutoOpError::ModelNotFitted);
        }
        Ok(values.iter().map(|v| v * self.scale + self.mean).collect())
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

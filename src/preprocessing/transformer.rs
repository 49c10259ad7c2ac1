//! Per-column preprocessing into numeric matrices

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::encoder::OneHotEncoder;
use super::scaler::StandardScaler;
use crate::artifact::Artifact;
use crate::dataset::Dataset;
use crate::error::{AutoOpError, Result};
use crate::feature::{Feature, FeatureType};

/// Which transform a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    OneHot,
    StandardScale,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::OneHot => "one_hot",
            TransformKind::StandardScale => "standard_scale",
        }
    }
}

/// Fitted state of a transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedTransform {
    OneHot(OneHotEncoder),
    StandardScale(StandardScaler),
}

/// Fitted preprocessing state of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub feature_name: String,
    pub transform: FittedTransform,
}

impl TransformRecord {
    pub fn kind(&self) -> TransformKind {
        match self.transform {
            FittedTransform::OneHot(_) => TransformKind::OneHot,
            FittedTransform::StandardScale(_) => TransformKind::StandardScale,
        }
    }

    /// Apply the fitted transform to a column, e.g. of new data
    pub fn apply(&self, column: &Column) -> Result<Array2<f64>> {
        match &self.transform {
            FittedTransform::OneHot(encoder) => encoder.transform(&column_as_strings(column)?),
            FittedTransform::StandardScale(scaler) => Ok(scaler
                .transform(&column_as_f64(column)?)?
                .insert_axis(Axis(1))),
        }
    }

    /// Categories seen at fit time, `None` for scaled columns
    pub fn n_categories(&self) -> Option<usize> {
        match &self.transform {
            FittedTransform::OneHot(encoder) => Some(encoder.n_categories()),
            FittedTransform::StandardScale(_) => None,
        }
    }

    /// Map single-column values back to the feature's own units.
    ///
    /// Scaled values are unscaled. One-hot values are class indices and are
    /// returned as-is once checked against the fitted categories.
    pub fn inverse(&self, values: &[f64]) -> Result<Array1<f64>> {
        match &self.transform {
            FittedTransform::StandardScale(scaler) => scaler.inverse_transform(values),
            FittedTransform::OneHot(encoder) => {
                let n = encoder.n_categories();
                if let Some(bad) = values
                    .iter()
                    .find(|&&v| v.fract() != 0.0 || v < 0.0 || v >= n as f64)
                {
                    return Err(AutoOpError::DataError(format!(
                        "{} is not a class index of '{}' ({} categories)",
                        bad, self.feature_name, n
                    )));
                }
                Ok(Array1::from(values.to_vec()))
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Artifact named after the feature, typed `transform:<kind>`
    pub fn to_artifact(&self) -> Result<Artifact> {
        Ok(Artifact::new(self.feature_name.clone(), self.to_bytes()?)
            .with_type(format!("transform:{}", self.kind().as_str()))
            .with_metadata("feature", self.feature_name.clone())
            .with_metadata("kind", self.kind().as_str()))
    }
}

/// Output of preprocessing one feature
#[derive(Debug, Clone)]
pub struct PreprocessedFeature {
    pub name: String,
    pub data: Array2<f64>,
    pub record: TransformRecord,
}

/// Converts feature columns into numeric matrices.
///
/// Categorical features are one-hot encoded, numerical features standardized.
/// Each column is fitted independently.
#[derive(Debug, Clone, Default)]
pub struct ColumnTransformer;

impl ColumnTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Fit and transform every feature, returning results sorted by name
    pub fn fit_transform(
        &self,
        features: &[Feature],
        dataset: &Dataset,
    ) -> Result<Vec<PreprocessedFeature>> {
        let mut results = features
            .iter()
            .map(|feature| self.fit_transform_one(feature, dataset))
            .collect::<Result<Vec<_>>>()?;
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    fn fit_transform_one(&self, feature: &Feature, dataset: &Dataset) -> Result<PreprocessedFeature> {
        let column = dataset.column(&feature.name)?;

        let (data, transform) = match feature.feature_type {
            FeatureType::Categorical => {
                let mut encoder = OneHotEncoder::new();
                let data = encoder.fit_transform(&column_as_strings(column)?)?;
                (data, FittedTransform::OneHot(encoder))
            }
            FeatureType::Numerical => {
                let mut scaler = StandardScaler::new();
                let data = scaler
                    .fit_transform(&column_as_f64(column)?)?
                    .insert_axis(Axis(1));
                (data, FittedTransform::StandardScale(scaler))
            }
        };

        debug!(
            feature = %feature.name,
            kind = %feature.feature_type,
            width = data.ncols(),
            "Preprocessed feature"
        );

        Ok(PreprocessedFeature {
            name: feature.name.clone(),
            data,
            record: TransformRecord {
                feature_name: feature.name.clone(),
                transform,
            },
        })
    }
}

/// Preprocess `features` of `dataset`, sorted by feature name
pub fn preprocess_features(features: &[Feature], dataset: &Dataset) -> Result<Vec<PreprocessedFeature>> {
    ColumnTransformer::new().fit_transform(features, dataset)
}

fn column_as_f64(column: &Column) -> Result<Vec<f64>> {
    let series = column
        .as_materialized_series()
        .strict_cast(&DataType::Float64)
        .map_err(|e| AutoOpError::DataError(format!("Column '{}' is not numeric: {}", column.name(), e)))?;
    series
        .f64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| AutoOpError::DataError(format!("Column '{}' has missing values", column.name())))
        })
        .collect()
}

fn column_as_strings(column: &Column) -> Result<Vec<String>> {
    let series = column.as_materialized_series().cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::to_string)
                .ok_or_else(|| AutoOpError::DataError(format!("Column '{}' has missing values", column.name())))
        })
        .collect()
}

//! Feature type detection

use polars::prelude::*;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::feature::{Feature, FeatureType};

/// Infers a [`Feature`] per column from the column's storage dtype.
///
/// Integer and float columns are numerical, everything else (strings,
/// booleans, dates) is categorical. Columns must not contain missing values;
/// nulls are reported with a warning but do not change the detected type.
#[derive(Debug, Clone, Default)]
pub struct FeatureTypeDetector;

impl FeatureTypeDetector {
    pub fn new() -> Self {
        Self
    }

    /// One feature per column, in column order
    pub fn detect(&self, dataset: &Dataset) -> Vec<Feature> {
        self.detect_frame(dataset.read())
    }

    pub fn detect_frame(&self, df: &DataFrame) -> Vec<Feature> {
        df.get_columns()
            .iter()
            .map(|col| {
                if col.null_count() > 0 {
                    warn!(column = %col.name(), nulls = col.null_count(), "Column contains missing values");
                }
                let feature_type = Self::classify(col.dtype());
                debug!(column = %col.name(), dtype = ?col.dtype(), kind = %feature_type, "Detected feature type");
                Feature::new(col.name().as_str(), feature_type)
            })
            .collect()
    }

    /// Semantic type for a storage dtype
    pub fn classify(dtype: &DataType) -> FeatureType {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64 => FeatureType::Numerical,
            _ => FeatureType::Categorical,
        }
    }
}

/// Detect the feature types of every column of `dataset`
pub fn detect_feature_types(dataset: &Dataset) -> Vec<Feature> {
    FeatureTypeDetector::new().detect(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(df: DataFrame) -> Dataset {
        Dataset::from_dataframe(df, "test", "", "1.0.0")
    }

    #[test]
    fn test_detect_numeric() {
        let df = df!(
            "a" => &[1i64, 2, 3],
            "b" => &[1.5f64, 2.5, 3.5],
            "c" => &[1i32, 0, 1],
            "d" => &[7u8, 8, 9]
        )
        .unwrap();

        let features = detect_feature_types(&dataset(df));
        assert_eq!(features.len(), 4);
        assert!(features.iter().all(|f| f.feature_type == FeatureType::Numerical));
    }

    #[test]
    fn test_detect_categorical() {
        let df = df!(
            "city" => &["paris", "rome", "oslo"],
            "flag" => &[true, false, true]
        )
        .unwrap();

        let features = detect_feature_types(&dataset(df));
        assert!(features.iter().all(|f| f.feature_type == FeatureType::Categorical));
    }

    #[test]
    fn test_preserves_column_order_and_is_idempotent() {
        let df = df!(
            "z" => &["x", "y"],
            "a" => &[1.0, 2.0],
            "m" => &[3i64, 4]
        )
        .unwrap();
        let ds = dataset(df);
        let detector = FeatureTypeDetector::new();

        let first = detector.detect(&ds);
        let second = detector.detect(&ds);
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                Feature::categorical("z"),
                Feature::numerical("a"),
                Feature::numerical("m"),
            ]
        );
    }
}

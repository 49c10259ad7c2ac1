//! Integration test: feature detection and per-column preprocessing

use autoop::autopipeline::detect_feature_types;
use autoop::dataset::Dataset;
use autoop::error::AutoOpError;
use autoop::feature::{Feature, FeatureType};
use autoop::preprocessing::{preprocess_features, FittedTransform, OneHotEncoder, TransformKind, TransformRecord};
use ndarray::array;
use polars::prelude::*;

fn sample_dataset() -> Dataset {
    let df = df!(
        "age" => &[25i64, 30, 35, 40],
        "income" => &[30000.0, 45000.0, 55000.0, 70000.0],
        "city" => &["Paris", "Lyon", "Paris", "Nice"],
        "member" => &[true, false, true, true],
    )
    .unwrap();
    Dataset::from_dataframe(df, "customers", "datasets/customers.csv", "1.0.0")
}

#[test]
fn test_detects_numeric_and_string_columns() {
    let features = detect_feature_types(&sample_dataset());
    assert_eq!(
        features,
        vec![
            Feature::numerical("age"),
            Feature::numerical("income"),
            Feature::categorical("city"),
            Feature::categorical("member"),
        ]
    );
}

#[test]
fn test_detection_is_idempotent() {
    let dataset = sample_dataset();
    assert_eq!(detect_feature_types(&dataset), detect_feature_types(&dataset));
}

#[test]
fn test_one_hot_roundtrip() {
    let values = ["A", "B", "A", "C"];
    let mut encoder = OneHotEncoder::new();
    let encoded = encoder.fit_transform(&values).unwrap();

    assert_eq!(encoded.dim(), (4, 3));
    assert_eq!(encoder.categories(), &["A", "B", "C"]);
    assert_eq!(encoder.inverse_transform(&encoded).unwrap(), vec!["A", "B", "A", "C"]);
}

#[test]
fn test_results_sorted_by_name_and_rows_preserved() {
    let dataset = sample_dataset();
    let features = vec![Feature::numerical("income"), Feature::categorical("city")];
    let processed = preprocess_features(&features, &dataset).unwrap();

    let names: Vec<&str> = processed.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["city", "income"]);

    // categories sorted: Lyon, Nice, Paris
    let city = &processed[0];
    assert_eq!(city.record.kind(), TransformKind::OneHot);
    assert_eq!(
        city.data,
        array![
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0]
        ]
    );

    let income = &processed[1];
    assert_eq!(income.data.dim(), (4, 1));
    let mean = income.data.column(0).mean().unwrap();
    let var = income.data.column(0).var(0.0);
    assert!(mean.abs() < 1e-12);
    assert!((var - 1.0).abs() < 1e-12);
}

#[test]
fn test_single_category_column() {
    let df = df!("kind" => &["x", "x", "x"]).unwrap();
    let dataset = Dataset::from_dataframe(df, "d", "", "1.0.0");
    let processed = preprocess_features(&[Feature::categorical("kind")], &dataset).unwrap();
    assert_eq!(processed[0].data, array![[1.0], [1.0], [1.0]]);
}

#[test]
fn test_zero_variance_column() {
    let df = df!("flat" => &[3.0, 3.0, 3.0]).unwrap();
    let dataset = Dataset::from_dataframe(df, "d", "", "1.0.0");
    let processed = preprocess_features(&[Feature::numerical("flat")], &dataset).unwrap();

    assert_eq!(processed[0].data, array![[0.0], [0.0], [0.0]]);
    match &processed[0].record.transform {
        FittedTransform::StandardScale(scaler) => {
            assert_eq!(scaler.mean(), 3.0);
            assert_eq!(scaler.scale(), 1.0);
        }
        other => panic!("unexpected transform {:?}", other),
    }
}

#[test]
fn test_record_applies_to_new_data() {
    let dataset = sample_dataset();
    let processed = preprocess_features(&[Feature::categorical("city")], &dataset).unwrap();
    let record = &processed[0].record;

    let restored = TransformRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
    assert_eq!(&restored, record);

    let new_rows = Column::from(Series::new("city".into(), &["Nice", "Lyon"]));
    assert_eq!(restored.apply(&new_rows).unwrap(), array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);

    let unseen = Column::from(Series::new("city".into(), &["Rome"]));
    assert!(matches!(restored.apply(&unseen), Err(AutoOpError::DataError(_))));
}

#[test]
fn test_unknown_feature() {
    let err = preprocess_features(&[Feature::numerical("height")], &sample_dataset()).unwrap_err();
    assert!(matches!(err, AutoOpError::FeatureNotFound(_)));
}

#[test]
fn test_feature_display() {
    let feature = detect_feature_types(&sample_dataset()).remove(2);
    assert_eq!(feature.feature_type, FeatureType::Categorical);
    assert_eq!(feature.to_string(), "Column city is categorical");
}

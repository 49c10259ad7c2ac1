//! Integration test: end-to-end pipeline runs and artifact packaging

use std::fs;

use autoop::autopipeline::{split_point, Pipeline, PipelineConfig, PipelineStage, PIPELINE_CONFIG_ARTIFACT};
use autoop::cli::{cmd_train, write_artifacts, RunConfig};
use autoop::dataset::Dataset;
use autoop::error::AutoOpError;
use autoop::feature::Feature;
use autoop::metrics::MetricKind;
use autoop::preprocessing::{FittedTransform, TransformRecord};
use autoop::training::{load_model, ModelKind, ModelState};
use polars::prelude::*;

fn doubling_dataset() -> Dataset {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0],
        "y" => &[2.0, 4.0, 6.0, 8.0],
    )
    .unwrap();
    Dataset::from_dataframe(df, "doubling", "datasets/doubling.csv", "1.0.0")
}

fn sizes_dataset() -> Dataset {
    let df = df!(
        "size" => &[1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 1.5, 11.5],
        "weight" => &[0.1, 0.2, 0.3, 1.0, 1.1, 1.2, 0.15, 1.15],
        "label" => &["small", "small", "small", "big", "big", "big", "small", "big"],
    )
    .unwrap();
    Dataset::from_dataframe(df, "sizes", "datasets/sizes.csv", "1.0.0")
}

fn doubling_pipeline(model: ModelKind) -> Pipeline {
    Pipeline::new(
        vec![MetricKind::MeanSquaredError, MetricKind::R2Score],
        doubling_dataset(),
        model.build(),
        vec![Feature::numerical("x")],
        Feature::numerical("y"),
        0.75,
    )
    .unwrap()
}

fn scaler_of(record: &TransformRecord) -> (f64, f64) {
    match &record.transform {
        FittedTransform::StandardScale(scaler) => (scaler.mean(), scaler.scale()),
        other => panic!("expected a scaler, got {:?}", other),
    }
}

#[test]
fn test_linear_regression_recovers_the_line() {
    let mut pipeline = doubling_pipeline(ModelKind::LinearRegression);
    let result = pipeline.execute().unwrap();

    assert_eq!(pipeline.stage(), PipelineStage::Complete);
    assert_eq!(pipeline.split_sizes(), Some((3, 1)));
    assert!(result.test_metric(MetricKind::MeanSquaredError).unwrap() < 1e-10);
    assert_eq!(result.predictions.len(), 1);

    let prediction = pipeline.predictions_in_target_units().unwrap().unwrap()[0];
    assert!((prediction - 8.0).abs() < 1e-9, "prediction = {}", prediction);

    let (_, y_scale) = scaler_of(pipeline.target_record().unwrap());

    let (_, x_scale) = scaler_of(&pipeline.input_records()[0]);
    match pipeline.model().state() {
        ModelState::LinearRegression(model) => {
            let coef = model.coefficients.unwrap()[0];
            let intercept = model.intercept.unwrap();
            assert!((coef - 1.0).abs() < 1e-9, "coef = {}", coef);
            assert!(intercept.abs() < 1e-9, "intercept = {}", intercept);
            // slope in raw units
            assert!((coef * y_scale / x_scale - 2.0).abs() < 1e-9);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    for kind in [ModelKind::GradientBoostingClassifier, ModelKind::SvmClassifier] {
        let mut pipeline = Pipeline::new(
            vec![MetricKind::Accuracy, MetricKind::F1Score],
            sizes_dataset(),
            kind.build(),
            vec![Feature::numerical("size"), Feature::numerical("weight")],
            Feature::categorical("label"),
            0.75,
        )
        .unwrap();

        let first = pipeline.execute().unwrap();
        let second = pipeline.execute().unwrap();
        assert_eq!(first, second, "{}", kind);
    }
}

#[test]
fn test_categorical_target_classification() {
    let mut pipeline = Pipeline::new(
        vec![MetricKind::Accuracy],
        sizes_dataset(),
        ModelKind::DecisionTreeClassifier.build(),
        vec![Feature::numerical("size")],
        Feature::categorical("label"),
        0.75,
    )
    .unwrap();

    let result = pipeline.execute().unwrap();
    assert_eq!(pipeline.split_sizes(), Some((6, 2)));

    // categories sort as big = 0, small = 1
    assert_eq!(result.predictions.to_vec(), vec![1.0, 0.0]);
    assert_eq!(result.test_metric(MetricKind::Accuracy), Some(1.0));
    assert_eq!(result.train_metric(MetricKind::Accuracy), Some(1.0));

    let classes = pipeline.predictions_in_target_units().unwrap().unwrap();
    assert_eq!(classes, result.predictions);

    match &pipeline.target_record().unwrap().transform {
        FittedTransform::OneHot(encoder) => assert_eq!(encoder.categories(), &["big", "small"]),
        other => panic!("unexpected transform {:?}", other),
    }
}

#[test]
fn test_categorical_inputs_are_one_hot_encoded() {
    let df = df!(
        "color" => &["red", "blue", "red", "green", "blue", "red"],
        "price" => &[3.0, 1.0, 3.0, 2.0, 1.0, 3.0],
    )
    .unwrap();
    let dataset = Dataset::from_dataframe(df, "paint", "", "1.0.0");

    let mut pipeline = Pipeline::new(
        vec![MetricKind::MeanAbsoluteError],
        dataset,
        ModelKind::RidgeRegression.build(),
        vec![Feature::categorical("color")],
        Feature::numerical("price"),
        0.5,
    )
    .unwrap();

    let result = pipeline.execute().unwrap();
    assert_eq!(pipeline.model().n_features(), Some(3));
    assert_eq!(result.predictions.len(), 3);
    assert!(result.predictions.iter().all(|p| p.is_finite()));
    assert!(result.test_metric(MetricKind::MeanAbsoluteError).unwrap().is_finite());
}

#[test]
fn test_task_mismatch_is_rejected() {
    let err = Pipeline::new(
        vec![MetricKind::Accuracy],
        sizes_dataset(),
        ModelKind::RidgeRegression.build(),
        vec![Feature::numerical("size")],
        Feature::categorical("label"),
        0.75,
    )
    .unwrap_err();
    assert!(matches!(err, AutoOpError::IncompatibleTask(_)));

    let err = Pipeline::new(
        vec![MetricKind::Accuracy],
        doubling_dataset(),
        ModelKind::LinearRegression.build(),
        vec![Feature::numerical("x")],
        Feature::numerical("y"),
        0.75,
    )
    .unwrap_err();
    assert!(matches!(err, AutoOpError::IncompatibleTask(_)));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    for split in [0.0, 1.0, -0.5, f64::NAN] {
        let err = Pipeline::new(
            vec![MetricKind::MeanSquaredError],
            doubling_dataset(),
            ModelKind::LinearRegression.build(),
            vec![Feature::numerical("x")],
            Feature::numerical("y"),
            split,
        )
        .unwrap_err();
        assert!(matches!(err, AutoOpError::ConfigError(_)), "split {}", split);
    }

    let err = Pipeline::new(
        vec![MetricKind::MeanSquaredError],
        doubling_dataset(),
        ModelKind::LinearRegression.build(),
        vec![],
        Feature::numerical("y"),
        0.75,
    )
    .unwrap_err();
    assert!(matches!(err, AutoOpError::ConfigError(_)));
}

#[test]
fn test_empty_partition_fails_without_state() {
    let mut pipeline = Pipeline::new(
        vec![MetricKind::MeanSquaredError],
        doubling_dataset(),
        ModelKind::LinearRegression.build(),
        vec![Feature::numerical("x")],
        Feature::numerical("y"),
        0.1,
    )
    .unwrap();

    let err = pipeline.execute().unwrap_err();
    assert!(matches!(err, AutoOpError::ConfigError(_)));
    assert_eq!(pipeline.stage(), PipelineStage::Constructed);
    assert!(pipeline.result().is_none());
    assert!(pipeline.target_record().is_none());
    assert!(!pipeline.model().is_fitted());

    let artifacts = pipeline.artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].name, PIPELINE_CONFIG_ARTIFACT);
}

#[test]
fn test_missing_column_fails_at_execute() {
    let mut pipeline = Pipeline::new(
        vec![MetricKind::MeanSquaredError],
        doubling_dataset(),
        ModelKind::LinearRegression.build(),
        vec![Feature::numerical("height")],
        Feature::numerical("y"),
        0.75,
    )
    .unwrap();

    let err = pipeline.execute().unwrap_err();
    assert!(matches!(err, AutoOpError::FeatureNotFound(_)));
    assert_eq!(pipeline.stage(), PipelineStage::Constructed);
}

#[test]
fn test_failed_rerun_clears_previous_run() {
    let mut pipeline = doubling_pipeline(ModelKind::LinearRegression);
    pipeline.execute().unwrap();
    assert!(pipeline.model().is_fitted());

    let config = PipelineConfig::new(Feature::numerical("y"))
        .with_input(Feature::numerical("x"))
        .with_split(0.75);
    let other = Dataset::from_dataframe(df!("x" => &[1.0, 2.0]).unwrap(), "no_target", "", "1.0.0");
    let mut broken = Pipeline::from_config(
        config,
        vec![MetricKind::MeanSquaredError],
        other,
        pipeline.model().state().into_model(),
    )
    .unwrap();
    assert!(broken.model().is_fitted());

    assert!(broken.execute().is_err());
    assert!(broken.result().is_none());
    assert_eq!(broken.artifacts().unwrap().len(), 1);
}

#[test]
fn test_split_sizes() {
    assert_eq!(split_point(10, 0.75), 7);
    assert_eq!(split_point(10, 0.8), 8);
    assert_eq!(split_point(3, 0.5), 1);
    assert_eq!(split_point(4, 0.1), 0);
}

#[test]
fn test_artifact_order() {
    let mut pipeline = Pipeline::new(
        vec![MetricKind::Accuracy],
        sizes_dataset(),
        ModelKind::KnnClassifier.build(),
        vec![Feature::numerical("weight"), Feature::numerical("size")],
        Feature::categorical("label"),
        0.75,
    )
    .unwrap();

    let names: Vec<String> = pipeline.artifacts().unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec![PIPELINE_CONFIG_ARTIFACT]);

    pipeline.execute().unwrap();
    let artifacts = pipeline.artifacts().unwrap();
    let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["label", "size", "weight", PIPELINE_CONFIG_ARTIFACT, "pipeline_model_knn_classifier"]
    );

    let config = PipelineConfig::from_json(std::str::from_utf8(artifacts[3].read()).unwrap()).unwrap();
    assert_eq!(&config, pipeline.config());
    assert_eq!(artifacts[3].metadata.get("model").map(String::as_str), Some("knn_classifier"));

    let restored = load_model(artifacts[4].read()).unwrap();
    assert_eq!(restored.n_features(), Some(2));
}

#[test]
fn test_write_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = doubling_pipeline(ModelKind::RidgeRegression);
    pipeline.execute().unwrap();

    let written = write_artifacts(&pipeline, dir.path()).unwrap();
    assert_eq!(written, 5);
    assert!(dir.path().join("00_y.bin").exists());
    assert!(dir.path().join("01_x.bin").exists());
    assert!(dir.path().join("02_pipeline_config.bin").exists());

    let model_bytes = fs::read(dir.path().join("03_pipeline_model_ridge_regression.bin")).unwrap();
    assert_eq!(load_model(&model_bytes).unwrap().kind(), ModelKind::RidgeRegression);

    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest.as_array().unwrap().len(), 4);
    assert_eq!(manifest[1]["name"], "x");
}

#[test]
fn test_train_command_with_run_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("doubling.csv");
    fs::write(&data, "x,y\n1,2\n2,4\n3,6\n4,8\n").unwrap();

    let out = dir.path().join("artifacts");
    let run_file = dir.path().join("run.json");
    fs::write(
        &run_file,
        serde_json::json!({
            "data": data,
            "target": "y",
            "model": "linear",
            "metrics": ["mse"],
            "split": 0.75,
            "artifacts": out,
        })
        .to_string(),
    )
    .unwrap();

    cmd_train(RunConfig::default(), Some(&run_file)).unwrap();
    assert!(out.join("manifest.json").exists());
    assert!(out.join("03_pipeline_model_linear_regression.bin").exists());
}

#[test]
fn test_train_command_multiclass_default_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("shapes.csv");
    fs::write(
        &data,
        "x,shape\n1,a\n2,b\n3,c\n4,a\n5,b\n6,c\n7,a\n8,b\n",
    )
    .unwrap();

    let flags = RunConfig {
        data: Some(data),
        target: Some("shape".into()),
        model: Some("knn_classifier".into()),
        split: Some(0.75),
        ..Default::default()
    };
    cmd_train(flags, None).unwrap();
}

#[test]
fn test_log_loss_on_binary_target() {
    let mut pipeline = Pipeline::new(
        vec![MetricKind::LogLoss],
        sizes_dataset(),
        ModelKind::LogisticRegression.build(),
        vec![Feature::numerical("size")],
        Feature::categorical("label"),
        0.75,
    )
    .unwrap();

    let result = pipeline.execute().unwrap();
    let loss = result.test_metric(MetricKind::LogLoss).unwrap();
    assert!(loss.is_finite() && loss > 0.0 && loss < 1.0, "log_loss = {}", loss);
}

//! End-to-end training pipeline
//!
//! A [`Pipeline`] preprocesses the configured features, splits rows into a
//! training prefix and a holdout suffix, fits its model and evaluates every
//! metric on both partitions. A run either completes or leaves no state
//! behind.

use std::fmt;

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use crate::artifact::Artifact;
use crate::dataset::Dataset;
use crate::error::{AutoOpError, Result};
use crate::feature::{Feature, FeatureType};
use crate::metrics::{MetricKind, MetricResult};
use crate::preprocessing::{argmax, preprocess_features, TransformRecord};
use crate::training::Model;

/// Stages of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Constructed,
    Preprocessed,
    Split,
    Trained,
    EvaluatedTest,
    EvaluatedTrain,
    Complete,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Constructed => "constructed",
            PipelineStage::Preprocessed => "preprocessed",
            PipelineStage::Split => "split",
            PipelineStage::Trained => "trained",
            PipelineStage::EvaluatedTest => "evaluated_test",
            PipelineStage::EvaluatedTrain => "evaluated_train",
            PipelineStage::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Outcome of [`Pipeline::execute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub train_metrics: Vec<MetricResult>,
    pub test_metrics: Vec<MetricResult>,
    /// Holdout predictions in the target's transformed space
    pub predictions: Array1<f64>,
}

impl PipelineResult {
    pub fn test_metric(&self, metric: MetricKind) -> Option<f64> {
        find_metric(&self.test_metrics, metric)
    }

    pub fn train_metric(&self, metric: MetricKind) -> Option<f64> {
        find_metric(&self.train_metrics, metric)
    }
}

fn find_metric(results: &[MetricResult], metric: MetricKind) -> Option<f64> {
    results.iter().find(|r| r.metric == metric).map(|r| r.value)
}

/// Row partitions of one run
#[derive(Debug, Clone)]
struct Partitions {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

/// State owned by a completed run
#[derive(Debug)]
struct RunState {
    target_record: TransformRecord,
    input_records: Vec<TransformRecord>,
    n_train: usize,
    n_test: usize,
    trained: Box<dyn Model>,
    result: PipelineResult,
}

/// Training pipeline over one dataset and one model
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    metrics: Vec<MetricKind>,
    dataset: Dataset,
    model: Box<dyn Model>,
    stage: PipelineStage,
    run: Option<RunState>,
}

impl Pipeline {
    /// Validate the configuration and build a pipeline; no data is read
    pub fn new(
        metrics: Vec<MetricKind>,
        dataset: Dataset,
        model: Box<dyn Model>,
        input_features: Vec<Feature>,
        target_feature: Feature,
        split: f64,
    ) -> Result<Self> {
        let config = PipelineConfig::new(target_feature)
            .with_input_features(input_features)
            .with_split(split);
        Self::from_config(config, metrics, dataset, model)
    }

    pub fn from_config(
        config: PipelineConfig,
        metrics: Vec<MetricKind>,
        dataset: Dataset,
        model: Box<dyn Model>,
    ) -> Result<Self> {
        let task = config.target_feature.feature_type.task();

        if model.task() != task {
            return Err(AutoOpError::IncompatibleTask(format!(
                "Target '{}' is {} and needs a {} model, but {} is a {} model",
                config.target_feature.name,
                config.target_feature.feature_type,
                task,
                model.name(),
                model.task()
            )));
        }

        config.validate()?;

        if let Some(metric) = metrics.iter().find(|m| m.task() != task) {
            return Err(AutoOpError::IncompatibleTask(format!(
                "Metric {} is a {} metric, target '{}' needs {} metrics",
                metric,
                metric.task(),
                config.target_feature.name,
                task
            )));
        }

        Ok(Self {
            config,
            metrics,
            dataset,
            model,
            stage: PipelineStage::Constructed,
            run: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Trained model after a completed run, the untrained one before
    pub fn model(&self) -> &dyn Model {
        match &self.run {
            Some(run) => run.trained.as_ref(),
            None => self.model.as_ref(),
        }
    }

    /// Result of the last completed run
    pub fn result(&self) -> Option<&PipelineResult> {
        self.run.as_ref().map(|r| &r.result)
    }

    /// Transform record of the target from the last completed run
    pub fn target_record(&self) -> Option<&TransformRecord> {
        self.run.as_ref().map(|r| &r.target_record)
    }

    /// Holdout predictions of the last completed run mapped back through the
    /// target transform: target units for a numerical target, class indices
    /// for a categorical one
    pub fn predictions_in_target_units(&self) -> Result<Option<Array1<f64>>> {
        self.run
            .as_ref()
            .map(|run| run.target_record.inverse(&run.result.predictions.to_vec()))
            .transpose()
    }

    /// Input transform records, sorted by feature name
    pub fn input_records(&self) -> &[TransformRecord] {
        match &self.run {
            Some(run) => &run.input_records,
            None => &[],
        }
    }

    /// `(train, holdout)` row counts of the last completed run
    pub fn split_sizes(&self) -> Option<(usize, usize)> {
        self.run.as_ref().map(|r| (r.n_train, r.n_test))
    }

    /// Run every stage; on failure the pipeline returns to `Constructed`
    pub fn execute(&mut self) -> Result<PipelineResult> {
        self.run = None;
        self.stage = PipelineStage::Constructed;

        info!(
            dataset = %self.dataset.name(),
            model = self.model.name(),
            target = %self.config.target_feature.name,
            n_inputs = self.config.input_features.len(),
            "Executing pipeline"
        );

        match self.run_stages() {
            Ok(run) => {
                let result = run.result.clone();
                self.run = Some(run);
                self.stage = PipelineStage::Complete;
                info!("Pipeline complete");
                Ok(result)
            }
            Err(err) => {
                warn!(stage = %self.stage, error = %err, "Pipeline run failed");
                self.stage = PipelineStage::Constructed;
                Err(err)
            }
        }
    }

    fn run_stages(&mut self) -> Result<RunState> {
        let (target_record, y, input_records, x) = self.preprocess()?;
        self.stage = PipelineStage::Preprocessed;

        // class count is only known once the target is encoded
        if let Some(n_classes) = target_record.n_categories().filter(|&n| n > 2) {
            if let Some(metric) = self.metrics.iter().find(|m| m.is_binary_only()) {
                return Err(AutoOpError::IncompatibleTask(format!(
                    "Metric {} needs a binary target, '{}' has {} classes",
                    metric, self.config.target_feature.name, n_classes
                )));
            }
        }

        let parts = self.split(&x, &y)?;
        self.stage = PipelineStage::Split;
        let n_train = parts.y_train.len();
        let n_test = parts.y_test.len();

        // fit a copy so a failed run leaves the configured model untouched
        let mut trained = self.model.state().into_model();
        trained.fit(&parts.x_train, &parts.y_train)?;
        self.stage = PipelineStage::Trained;
        info!(model = trained.name(), rows = n_train, "Model trained");

        let predictions = trained.predict(&parts.x_test)?;
        let test_metrics = self.evaluate(trained.as_ref(), &parts.x_test, &predictions, &parts.y_test)?;
        self.stage = PipelineStage::EvaluatedTest;

        let train_predictions = trained.predict(&parts.x_train)?;
        let train_metrics =
            self.evaluate(trained.as_ref(), &parts.x_train, &train_predictions, &parts.y_train)?;
        self.stage = PipelineStage::EvaluatedTrain;

        for (train, test) in train_metrics.iter().zip(test_metrics.iter()) {
            info!(metric = %train.metric, train = train.value, test = test.value, "Evaluated");
        }

        Ok(RunState {
            target_record,
            input_records,
            n_train,
            n_test,
            trained,
            result: PipelineResult {
                train_metrics,
                test_metrics,
                predictions,
            },
        })
    }

    /// Target vector and design matrix with their transform records
    fn preprocess(&self) -> Result<(TransformRecord, Array1<f64>, Vec<TransformRecord>, Array2<f64>)> {
        let target = &self.config.target_feature;
        let mut processed = preprocess_features(std::slice::from_ref(target), &self.dataset)?;
        let target_out = processed.pop().ok_or_else(|| {
            AutoOpError::ComputationError(format!("No output for target '{}'", target.name))
        })?;

        let y: Array1<f64> = match target.feature_type {
            FeatureType::Numerical => target_out.data.column(0).to_owned(),
            FeatureType::Categorical => target_out
                .data
                .rows()
                .into_iter()
                .map(|row| argmax(row.iter().copied()) as f64)
                .collect(),
        };

        let inputs = preprocess_features(&self.config.input_features, &self.dataset)?;
        let views: Vec<ArrayView2<f64>> = inputs.iter().map(|p| p.data.view()).collect();
        let x = concatenate(Axis(1), &views)?;
        let input_records = inputs.into_iter().map(|p| p.record).collect();

        debug!(rows = x.nrows(), columns = x.ncols(), "Design matrix assembled");
        Ok((target_out.record, y, input_records, x))
    }

    /// Prefix of `floor(split * n)` rows for training, the rest for holdout
    fn split(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Partitions> {
        let n = x.nrows();
        let n_train = split_point(n, self.config.split);

        if n_train == 0 || n_train == n {
            return Err(AutoOpError::ConfigError(format!(
                "Split {} of {} rows leaves an empty partition ({} train, {} holdout)",
                self.config.split,
                n,
                n_train,
                n - n_train
            )));
        }

        debug!(train = n_train, holdout = n - n_train, "Rows split");
        Ok(Partitions {
            x_train: x.slice(s![..n_train, ..]).to_owned(),
            y_train: y.slice(s![..n_train]).to_owned(),
            x_test: x.slice(s![n_train.., ..]).to_owned(),
            y_test: y.slice(s![n_train..]).to_owned(),
        })
    }

    /// Score every metric; binary-only metrics read the model's label-1
    /// probabilities when it has them, hard predictions otherwise
    fn evaluate(
        &self,
        model: &dyn Model,
        x: &Array2<f64>,
        predictions: &Array1<f64>,
        ground_truth: &Array1<f64>,
    ) -> Result<Vec<MetricResult>> {
        let proba = if self.metrics.iter().any(|m| m.is_binary_only()) {
            model.positive_proba(x)?
        } else {
            None
        };

        self.metrics
            .iter()
            .map(|&metric| {
                let scored = match &proba {
                    Some(p) if metric.is_binary_only() => p,
                    _ => predictions,
                };
                Ok(MetricResult {
                    metric,
                    value: metric.evaluate(scored, ground_truth)?,
                })
            })
            .collect()
    }

    /// Artifacts of the pipeline: one per transform record (target first),
    /// the configuration, then the trained model once a run has completed
    pub fn artifacts(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();

        if let Some(run) = &self.run {
            artifacts.push(run.target_record.to_artifact()?);
            for record in &run.input_records {
                artifacts.push(record.to_artifact()?);
            }
        }

        let metric_names: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        artifacts.push(
            self.config
                .to_artifact()?
                .with_metadata("model", self.model.name())
                .with_metadata("metrics", metric_names.join(",")),
        );

        if let Some(run) = &self.run {
            let name = format!("pipeline_model_{}", run.trained.name());
            artifacts.push(run.trained.to_artifact(&name)?);
        }

        Ok(artifacts)
    }
}

/// Number of training rows for `n` rows at ratio `split`
pub fn split_point(n: usize, split: f64) -> usize {
    ((split * n as f64).floor() as usize).min(n)
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<&str> = self
            .config
            .sorted_inputs()
            .iter()
            .map(|feature| feature.name.as_str())
            .collect();
        let metrics: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        write!(
            f,
            "Pipeline(model={}, inputs=[{}], target={}, split={}, metrics=[{}])",
            self.model.name(),
            inputs.join(", "),
            self.config.target_feature.name,
            self.config.split,
            metrics.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ModelKind;
    use polars::prelude::*;

    fn line_dataset() -> Dataset {
        let df = df! {
            "x" => [1.0, 2.0, 3.0, 4.0],
            "y" => [2.0, 4.0, 6.0, 8.0],
        }
        .unwrap();
        Dataset::from_dataframe(df, "line", "datasets/line.csv", "1.0.0")
    }

    fn line_pipeline(split: f64) -> Result<Pipeline> {
        Pipeline::new(
            vec![MetricKind::MeanSquaredError],
            line_dataset(),
            ModelKind::LinearRegression.build(),
            vec![Feature::numerical("x")],
            Feature::numerical("y"),
            split,
        )
    }

    #[test]
    fn test_split_point() {
        assert_eq!(split_point(4, 0.75), 3);
        assert_eq!(split_point(10, 0.8), 8);
        assert_eq!(split_point(3, 0.5), 1);
    }

    #[test]
    fn test_stage_progression() {
        let mut pipeline = line_pipeline(0.75).unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Constructed);
        assert!(!pipeline.model().is_fitted());

        pipeline.execute().unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Complete);
        assert_eq!(pipeline.split_sizes(), Some((3, 1)));
        assert!(pipeline.model().is_fitted());
    }

    #[test]
    fn test_empty_partition_resets_stage() {
        // floor(0.1 * 4) == 0 training rows
        let mut pipeline = line_pipeline(0.1).unwrap();
        let err = pipeline.execute().unwrap_err();
        assert!(matches!(err, AutoOpError::ConfigError(_)));
        assert_eq!(pipeline.stage(), PipelineStage::Constructed);
        assert!(pipeline.result().is_none());
    }

    #[test]
    fn test_regression_model_for_categorical_target() {
        let df = df! { "x" => [1.0, 2.0], "label" => ["a", "b"] }.unwrap();
        let err = Pipeline::new(
            vec![],
            Dataset::from_dataframe(df, "d", "", "1.0.0"),
            ModelKind::LinearRegression.build(),
            vec![Feature::numerical("x")],
            Feature::categorical("label"),
            0.5,
        )
        .unwrap_err();
        assert!(matches!(err, AutoOpError::IncompatibleTask(_)));
    }

    #[test]
    fn test_metric_family_mismatch() {
        let err = Pipeline::new(
            vec![MetricKind::Accuracy],
            line_dataset(),
            ModelKind::LinearRegression.build(),
            vec![Feature::numerical("x")],
            Feature::numerical("y"),
            0.75,
        )
        .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }

    fn label_dataset(labels: &[&str]) -> Dataset {
        let x: Vec<f64> = (0..labels.len()).map(|i| i as f64).collect();
        let df = df! { "x" => x, "label" => labels }.unwrap();
        Dataset::from_dataframe(df, "labels", "", "1.0.0")
    }

    #[test]
    fn test_log_loss_rejected_for_multiclass_target() {
        let labels = ["a", "b", "c", "a", "b", "c", "a", "b", "c", "a"];
        let mut pipeline = Pipeline::new(
            vec![MetricKind::Accuracy, MetricKind::LogLoss],
            label_dataset(&labels),
            ModelKind::KnnClassifier.build(),
            vec![Feature::numerical("x")],
            Feature::categorical("label"),
            0.8,
        )
        .unwrap();

        let err = pipeline.execute().unwrap_err();
        assert!(matches!(err, AutoOpError::IncompatibleTask(_)));
        assert_eq!(pipeline.stage(), PipelineStage::Constructed);
        assert!(pipeline.result().is_none());
        assert!(!pipeline.model().is_fitted());
    }

    #[test]
    fn test_log_loss_uses_probabilities_for_binary_target() {
        let labels = ["a", "a", "a", "a", "a", "b", "b", "b", "b", "b"];
        let mut pipeline = Pipeline::new(
            vec![MetricKind::Accuracy, MetricKind::LogLoss],
            label_dataset(&labels),
            ModelKind::LogisticRegression.build(),
            vec![Feature::numerical("x")],
            Feature::categorical("label"),
            0.6,
        )
        .unwrap();

        let result = pipeline.execute().unwrap();
        let loss = result.train_metric(MetricKind::LogLoss).unwrap();
        // hard 0/1 predictions would give either ~0 or ~34.5 per row
        assert!(loss > 1e-6 && loss < 1.0, "log_loss = {}", loss);
    }

    #[test]
    fn test_predictions_in_target_units() {
        let mut pipeline = line_pipeline(0.75).unwrap();
        assert!(pipeline.predictions_in_target_units().unwrap().is_none());

        pipeline.execute().unwrap();
        let predictions = pipeline.predictions_in_target_units().unwrap().unwrap();
        assert_eq!(predictions.len(), 1);
        assert!((predictions[0] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_artifacts_before_and_after_run() {
        let mut pipeline = line_pipeline(0.75).unwrap();
        let before = pipeline.artifacts().unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].name, "pipeline_config");

        pipeline.execute().unwrap();
        let after = pipeline.artifacts().unwrap();
        let names: Vec<&str> = after.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["y", "x", "pipeline_config", "pipeline_model_linear_regression"]);
        assert_eq!(after[3].artifact_type, "model:linear_regression");
    }

    #[test]
    fn test_display() {
        let pipeline = line_pipeline(0.75).unwrap();
        assert_eq!(
            pipeline.to_string(),
            "Pipeline(model=linear_regression, inputs=[x], target=y, split=0.75, metrics=[mean_squared_error])"
        );
    }
}

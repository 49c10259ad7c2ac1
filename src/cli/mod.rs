//! autoop CLI Module
//!
//! Command-line harness: inspect a dataset, train a pipeline, list the
//! model and metric registries.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use serde::{Deserialize, Serialize};

use crate::autopipeline::{detect_feature_types, Pipeline, PipelineConfig, DEFAULT_SPLIT};
use crate::dataset::Dataset;
use crate::feature::Feature;
use crate::metrics::{MetricKind, MetricResult};
use crate::training::{ModelKind, TaskType};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "autoop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AutoML experimentation harness")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the detected type of every column
    Features {
        /// Input data file (CSV or line-delimited JSON)
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Train and evaluate a pipeline
    Train {
        /// Input data file (CSV or line-delimited JSON)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Target column name
        #[arg(short, long)]
        target: Option<String>,

        /// Comma-separated input columns (default: every other column)
        #[arg(short, long, value_delimiter = ',')]
        inputs: Option<Vec<String>>,

        /// Model name, see `autoop models`
        #[arg(short, long)]
        model: Option<String>,

        /// Comma-separated metric names, see `autoop metrics`
        #[arg(long, value_delimiter = ',')]
        metrics: Option<Vec<String>>,

        /// Share of rows used for training
        #[arg(short, long)]
        split: Option<f64>,

        /// Directory to write artifacts and manifest.json into
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// JSON run file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List models
    Models {
        /// Only models for this task (classification, regression)
        #[arg(long)]
        task: Option<String>,
    },

    /// List metrics
    Metrics {
        /// Only metrics for this task (classification, regression)
        #[arg(long)]
        task: Option<String>,
    },
}

/// Contents of a `--config` run file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data: Option<PathBuf>,
    pub target: Option<String>,
    pub inputs: Option<Vec<String>>,
    pub model: Option<String>,
    pub metrics: Option<Vec<String>>,
    pub split: Option<f64>,
    pub artifacts: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fill unset fields from `other`
    pub fn or(self, other: RunConfig) -> Self {
        Self {
            data: self.data.or(other.data),
            target: self.target.or(other.target),
            inputs: self.inputs.or(other.inputs),
            model: self.model.or(other.model),
            metrics: self.metrics.or(other.metrics),
            split: self.split.or(other.split),
            artifacts: self.artifacts.or(other.artifacts),
        }
    }
}

/// Record of a written artifact, without its payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub version: String,
    pub asset_path: String,
    pub size: usize,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn parse_task(task: Option<&str>) -> anyhow::Result<Option<TaskType>> {
    Ok(task.map(|t| t.parse::<TaskType>()).transpose()?)
}

pub fn cmd_features(data_path: &Path) -> anyhow::Result<()> {
    section("Features");

    let dataset = Dataset::from_path(data_path)?;
    for feature in detect_feature_types(&dataset) {
        println!("  {}", feature);
    }
    println!();
    Ok(())
}

pub fn cmd_models(task: Option<&str>) -> anyhow::Result<()> {
    section("Models");
    let kinds = match parse_task(task)? {
        Some(task) => ModelKind::for_task(task),
        None => ModelKind::ALL.to_vec(),
    };
    for kind in kinds {
        println!("  {:<32} {}", kind.name().white(), muted(kind.task().as_str()));
    }
    println!();
    Ok(())
}

pub fn cmd_metrics(task: Option<&str>) -> anyhow::Result<()> {
    section("Metrics");
    let kinds = match parse_task(task)? {
        Some(task) => MetricKind::for_task(task),
        None => MetricKind::ALL.to_vec(),
    };
    for kind in kinds {
        println!("  {:<32} {}", kind.name().white(), muted(kind.task().as_str()));
    }
    println!();
    Ok(())
}

pub fn cmd_train(flags: RunConfig, config_path: Option<&Path>) -> anyhow::Result<()> {
    let run = match config_path {
        Some(path) => flags.or(RunConfig::from_file(path)?),
        None => flags,
    };

    let Some(data_path) = run.data.as_deref() else {
        bail!("No data file given (--data or \"data\" in the run file)");
    };
    let Some(target) = run.target.as_deref() else {
        bail!("No target column given (--target or \"target\" in the run file)");
    };
    let Some(model_name) = run.model.as_deref() else {
        bail!("No model given (--model or \"model\" in the run file)");
    };

    section("Train");

    step_run("Loading data");
    let start = Instant::now();
    let dataset = Dataset::from_path(data_path)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_rows(),
        dataset.column_names().len(),
        start.elapsed()
    ));

    let detected = detect_feature_types(&dataset);
    let config = pipeline_config(&detected, target, run.inputs.as_deref(), run.split)?;

    let model = ModelKind::from_name(model_name)?;
    let metrics = match &run.metrics {
        Some(names) => names
            .iter()
            .map(|name| MetricKind::from_name(name))
            .collect::<crate::error::Result<Vec<_>>>()?,
        None => default_metrics(&dataset, &config.target_feature)?,
    };

    let mut pipeline = Pipeline::from_config(config, metrics, dataset, model.build())?;
    println!("  {}", muted(&pipeline.to_string()));

    step_run(&format!("Training {}", model.name().cyan()));
    let start = Instant::now();
    let result = pipeline.execute()?;
    step_done(&format!("{:?}", start.elapsed()));

    print_metrics("Train", &result.train_metrics);
    print_metrics("Test", &result.test_metrics);

    if let Some(dir) = run.artifacts.as_deref() {
        step_run(&format!("Saving artifacts → {}", dir.display()));
        let written = write_artifacts(&pipeline, dir)?;
        step_done(&format!("{} files", written));
    }

    println!();
    Ok(())
}

/// Every metric of the target's family, minus binary-only metrics when a
/// categorical target has more than two classes
pub fn default_metrics(dataset: &Dataset, target: &Feature) -> crate::error::Result<Vec<MetricKind>> {
    let mut metrics = MetricKind::for_task(target.feature_type.task());
    if target.is_categorical() && dataset.column(&target.name)?.n_unique()? > 2 {
        metrics.retain(|m| !m.is_binary_only());
    }
    Ok(metrics)
}

/// Pipeline configuration from detected features and the requested columns
pub fn pipeline_config(
    detected: &[Feature],
    target: &str,
    inputs: Option<&[String]>,
    split: Option<f64>,
) -> crate::error::Result<PipelineConfig> {
    let find = |name: &str| {
        detected
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| crate::error::AutoOpError::FeatureNotFound(name.to_string()))
    };

    let target_feature = find(target)?;
    let input_features = match inputs {
        Some(names) => names.iter().map(|n| find(n.trim())).collect::<crate::error::Result<Vec<_>>>()?,
        None => detected.iter().filter(|f| f.name != target).cloned().collect(),
    };

    Ok(PipelineConfig::new(target_feature)
        .with_input_features(input_features)
        .with_split(split.unwrap_or(DEFAULT_SPLIT)))
}

fn print_metrics(label: &str, results: &[MetricResult]) {
    println!();
    println!("  {}", label.white().bold());
    for result in results {
        println!(
            "  {:<24} {}",
            muted(result.metric.name()),
            format!("{:.4}", result.value).white().bold()
        );
    }
}

fn file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Write every artifact's bytes plus a `manifest.json`, returns the file count
pub fn write_artifacts(pipeline: &Pipeline, dir: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(dir)?;

    let mut manifest = Vec::new();
    for (i, artifact) in pipeline.artifacts()?.into_iter().enumerate() {
        let path = dir.join(format!("{:02}_{}.bin", i, file_name(&artifact.name)));
        fs::write(&path, artifact.read())?;

        let artifact = artifact.with_asset_path(path.to_string_lossy());
        manifest.push(ManifestEntry {
            id: artifact.id(),
            name: artifact.name.clone(),
            artifact_type: artifact.artifact_type.clone(),
            version: artifact.version.clone(),
            asset_path: artifact.asset_path.clone(),
            size: artifact.len(),
            metadata: artifact.metadata.clone(),
            tags: artifact.tags.clone(),
        });
    }

    fs::write(dir.join("manifest.json"), serde_json::to_vec_pretty(&manifest)?)?;
    Ok(manifest.len() + 1)
}

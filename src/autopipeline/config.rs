//! Pipeline configuration

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::{AutoOpError, Result};
use crate::feature::Feature;

/// Default share of rows used for training
pub const DEFAULT_SPLIT: f64 = 0.8;

/// Artifact name and type of the serialized configuration
pub const PIPELINE_CONFIG_ARTIFACT: &str = "pipeline_config";

/// Which columns feed a pipeline and how rows are split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input_features: Vec<Feature>,
    pub target_feature: Feature,
    /// Share of rows (prefix) used for training
    #[serde(default = "default_split")]
    pub split: f64,
}

fn default_split() -> f64 {
    DEFAULT_SPLIT
}

impl PipelineConfig {
    pub fn new(target_feature: Feature) -> Self {
        Self {
            input_features: Vec::new(),
            target_feature,
            split: DEFAULT_SPLIT,
        }
    }

    pub fn with_input_features(mut self, features: Vec<Feature>) -> Self {
        self.input_features = features;
        self
    }

    pub fn with_input(mut self, feature: Feature) -> Self {
        self.input_features.push(feature);
        self
    }

    pub fn with_split(mut self, split: f64) -> Self {
        self.split = split;
        self
    }

    /// Checks that need no data
    pub fn validate(&self) -> Result<()> {
        if self.input_features.is_empty() {
            return Err(AutoOpError::ConfigError(
                "At least one input feature is required".to_string(),
            ));
        }

        if !(self.split > 0.0 && self.split < 1.0) {
            return Err(AutoOpError::ConfigError(format!(
                "Split ratio must be strictly between 0 and 1, got {}",
                self.split
            )));
        }

        let mut seen = BTreeSet::new();
        for feature in &self.input_features {
            if !seen.insert(feature.name.as_str()) {
                return Err(AutoOpError::ConfigError(format!(
                    "Input feature '{}' is listed more than once",
                    feature.name
                )));
            }
        }

        if seen.contains(self.target_feature.name.as_str()) {
            return Err(AutoOpError::ConfigError(format!(
                "Target feature '{}' cannot also be an input",
                self.target_feature.name
            )));
        }

        Ok(())
    }

    /// Input features ordered by name, the column order of the design matrix
    pub fn sorted_inputs(&self) -> Vec<&Feature> {
        let mut inputs: Vec<&Feature> = self.input_features.iter().collect();
        inputs.sort_by(|a, b| a.name.cmp(&b.name));
        inputs
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_artifact(&self) -> Result<Artifact> {
        Ok(Artifact::new(PIPELINE_CONFIG_ARTIFACT, serde_json::to_vec(self)?)
            .with_type(PIPELINE_CONFIG_ARTIFACT)
            .with_metadata("target", self.target_feature.name.clone())
            .with_metadata("n_inputs", self.input_features.len().to_string())
            .with_metadata("split", self.split.to_string()))
    }
}

//! Automated ML Pipeline module
//!
//! Provides:
//! - Feature type detection from column dtypes
//! - Pipeline configuration and validation
//! - The training pipeline state machine

mod config;
mod detector;
mod pipeline;

pub use config::{PipelineConfig, DEFAULT_SPLIT, PIPELINE_CONFIG_ARTIFACT};
pub use detector::{detect_feature_types, FeatureTypeDetector};
pub use pipeline::{split_point, Pipeline, PipelineResult, PipelineStage};

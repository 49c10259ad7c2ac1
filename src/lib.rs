//! autoop - AutoML experimentation harness
//!
//! Select a tabular dataset, designate input and target columns, pick a model
//! and metrics; the harness trains, evaluates and packages the result as
//! artifacts.
//!
//! # Modules
//!
//! ## Data
//! - [`dataset`] - Named, versioned polars tables
//! - [`feature`] - Feature descriptors (numerical | categorical)
//! - [`artifact`] - Persistable byte blobs with metadata
//!
//! ## Core ML Modules
//! - [`preprocessing`] - One-hot encoding and standardization per column
//! - [`training`] - Model registry and model implementations
//! - [`metrics`] - Metric registry
//! - [`autopipeline`] - Feature detection and the training pipeline
//!
//! ## Services
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use autoop::prelude::*;
//!
//! # fn main() -> autoop::Result<()> {
//! let dataset = Dataset::from_path(std::path::Path::new("houses.csv"))?;
//! let features = detect_feature_types(&dataset);
//! let (target, inputs): (Vec<Feature>, Vec<Feature>) =
//!     features.into_iter().partition(|f| f.name == "price");
//!
//! let mut pipeline = Pipeline::new(
//!     vec![MetricKind::MeanSquaredError, MetricKind::R2Score],
//!     dataset,
//!     ModelKind::RidgeRegression.build(),
//!     inputs,
//!     target[0].clone(),
//!     0.8,
//! )?;
//! let result = pipeline.execute()?;
//! println!("{:?}", result.test_metrics);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Data
pub mod artifact;
pub mod dataset;
pub mod feature;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod metrics;
pub mod autopipeline;

// Services
pub mod cli;

pub use error::{AutoOpError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{AutoOpError, ErrorCategory, Result};

    // Data
    pub use crate::artifact::Artifact;
    pub use crate::dataset::Dataset;
    pub use crate::feature::{Feature, FeatureType};

    // Preprocessing
    pub use crate::preprocessing::{preprocess_features, OneHotEncoder, StandardScaler, TransformRecord};

    // Training
    pub use crate::training::{load_model, Model, ModelKind, TaskType};

    // Metrics
    pub use crate::metrics::{MetricKind, MetricResult};

    // Auto pipeline
    pub use crate::autopipeline::{detect_feature_types, Pipeline, PipelineConfig, PipelineResult, PipelineStage};
}

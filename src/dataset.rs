//! Tabular datasets
//!
//! A [`Dataset`] is a named, versioned polars `DataFrame`. It converts to and
//! from an [`Artifact`] holding the table as CSV bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use crate::artifact::{Artifact, DEFAULT_VERSION};
use crate::error::{AutoOpError, Result};

/// Artifact type tag for datasets
pub const DATASET_TYPE: &str = "dataset";

/// A named tabular resource
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    asset_path: String,
    version: String,
    frame: DataFrame,
    metadata: BTreeMap<String, String>,
    tags: Vec<String>,
}

impl Dataset {
    /// Wrap a dataframe
    pub fn from_dataframe(
        frame: DataFrame,
        name: impl Into<String>,
        asset_path: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            asset_path: asset_path.into(),
            version: version.into(),
            frame,
            metadata: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Parse CSV bytes (with header row)
    pub fn from_csv_bytes(
        bytes: Vec<u8>,
        name: impl Into<String>,
        asset_path: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let frame = read_csv(bytes)?;
        Ok(Self::from_dataframe(frame, name, asset_path, version))
    }

    /// Load a CSV or line-delimited JSON file, using the file stem as name
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let frame = match ext.as_str() {
            "csv" => read_csv(std::fs::read(path)?)?,
            "json" | "jsonl" => JsonReader::new(File::open(path)?)
                .with_json_format(JsonFormat::JsonLines)
                .finish()?,
            other => {
                return Err(AutoOpError::DataError(format!(
                    "Unsupported file format: {}",
                    other
                )))
            }
        };

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset")
            .to_string();
        debug!(path = %path.display(), rows = frame.height(), "Loaded dataset");
        Ok(Self::from_dataframe(
            frame,
            name,
            path.display().to_string(),
            DEFAULT_VERSION,
        ))
    }

    /// Rebuild a dataset from its artifact form
    pub fn from_artifact(artifact: &Artifact) -> Result<Self> {
        if artifact.artifact_type != DATASET_TYPE {
            return Err(AutoOpError::DataError(format!(
                "Artifact '{}' has type '{}', expected '{}'",
                artifact.name, artifact.artifact_type, DATASET_TYPE
            )));
        }
        let mut dataset = Self::from_csv_bytes(
            artifact.data.clone(),
            artifact.name.clone(),
            artifact.asset_path.clone(),
            artifact.version.clone(),
        )?;
        dataset.metadata = artifact.metadata.clone();
        dataset.tags = artifact.tags.clone();
        Ok(dataset)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The underlying table
    pub fn read(&self) -> &DataFrame {
        &self.frame
    }

    /// Replace the underlying table
    pub fn save(&mut self, frame: DataFrame) {
        self.frame = frame;
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.frame
            .column(name)
            .map_err(|_| AutoOpError::FeatureNotFound(name.to_string()))
    }

    /// Serialize to a `dataset` artifact holding CSV bytes
    pub fn to_artifact(&self) -> Result<Artifact> {
        let mut frame = self.frame.clone();
        let mut buf = Vec::new();
        CsvWriter::new(&mut buf)
            .include_header(true)
            .finish(&mut frame)?;

        let mut artifact = Artifact::new(self.name.clone(), buf)
            .with_type(DATASET_TYPE)
            .with_version(self.version.clone())
            .with_asset_path(self.asset_path.clone());
        artifact.metadata = self.metadata.clone();
        artifact.tags = self.tags.clone();
        Ok(artifact)
    }
}

fn read_csv(bytes: Vec<u8>) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| AutoOpError::DataError(e.to_string()))
}

//! Artifacts: named, versioned byte blobs handed to the storage layer
//!
//! An [`Artifact`] is the unit of persistence. Datasets, transform records,
//! pipeline configuration and trained models all convert into one.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Default artifact version
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Default artifact type
pub const DEFAULT_TYPE: &str = "artifact";

/// An opaque persisted object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    /// Storage location, used to derive [`Artifact::id`]
    pub asset_path: String,
    pub version: String,
    /// Kind of payload, e.g. `dataset`, `transform:one_hot`, `model:linear_regression`
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub data: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

impl Default for Artifact {
    fn default() -> Self {
        Self {
            name: String::new(),
            asset_path: String::new(),
            version: DEFAULT_VERSION.to_string(),
            artifact_type: DEFAULT_TYPE.to_string(),
            data: Vec::new(),
            metadata: BTreeMap::new(),
            tags: Vec::new(),
        }
    }
}

impl Artifact {
    /// Create an artifact holding `data`
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = artifact_type.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_asset_path(mut self, asset_path: impl Into<String>) -> Self {
        self.asset_path = asset_path.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Identifier of the form `base64(asset_path):version`
    pub fn id(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.asset_path.as_bytes());
        format!("{}:{}", encoded, self.version)
    }

    pub fn read(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload, returning the stored bytes
    pub fn save(&mut self, data: Vec<u8>) -> &[u8] {
        self.data = data;
        &self.data
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Artifact(name={}, type={}, version={}, {} bytes)",
            self.name,
            self.artifact_type,
            self.version,
            self.data.len()
        )
    }
}

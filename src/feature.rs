//! Feature descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::training::TaskType;

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Numerical,
    Categorical,
}

impl FeatureType {
    /// Task a model must support to predict a target of this type
    pub fn task(&self) -> TaskType {
        match self {
            FeatureType::Numerical => TaskType::Regression,
            FeatureType::Categorical => TaskType::Classification,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Numerical => "numerical",
            FeatureType::Categorical => "categorical",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named column together with its semantic type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
}

impl Feature {
    pub fn new(name: impl Into<String>, feature_type: FeatureType) -> Self {
        Self {
            name: name.into(),
            feature_type,
        }
    }

    pub fn numerical(name: impl Into<String>) -> Self {
        Self::new(name, FeatureType::Numerical)
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, FeatureType::Categorical)
    }

    pub fn is_categorical(&self) -> bool {
        self.feature_type == FeatureType::Categorical
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column {} is {}", self.name, self.feature_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Feature::numerical("age").to_string(), "Column age is numerical");
        assert_eq!(Feature::categorical("city").to_string(), "Column city is categorical");
    }

    #[test]
    fn test_task_mapping() {
        assert_eq!(FeatureType::Numerical.task(), TaskType::Regression);
        assert_eq!(FeatureType::Categorical.task(), TaskType::Classification);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Feature::categorical("c")).unwrap();
        assert_eq!(json, r#"{"name":"c","type":"categorical"}"#);
    }
}

//! Data preprocessing module
//!
//! Turns dataset columns into numeric matrices:
//! - Categorical columns are one-hot encoded ([`OneHotEncoder`])
//! - Numerical columns are standardized ([`StandardScaler`])
//!
//! [`preprocess_features`] fits one transform per feature and returns the
//! transformed matrices together with their [`TransformRecord`]s, sorted by
//! feature name.

mod encoder;
mod scaler;
mod transformer;

pub use encoder::OneHotEncoder;
pub use scaler::StandardScaler;
pub use transformer::{
    preprocess_features, ColumnTransformer, FittedTransform, PreprocessedFeature,
    TransformKind, TransformRecord,
};

pub(crate) use encoder::argmax;

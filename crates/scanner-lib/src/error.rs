//! Error taxonomy for the scanning pipeline
//!
//! Only [`LoadError`] may change the scan loop's terminal state. Prediction
//! failures stay inside a single tick and persistence failures are reported
//! to whoever requested the write.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal classifier load failure. There is no automatic retry.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("failed to read model from {path:?}: {reason}")]
    ModelUnreadable { path: PathBuf, reason: String },

    #[error("model at {path:?} is not a usable classifier: {reason}")]
    ModelInvalid { path: PathBuf, reason: String },

    #[error("failed to read classifier metadata from {path:?}: {reason}")]
    MetadataUnreadable { path: PathBuf, reason: String },

    #[error("classifier metadata at {path:?} is malformed: {reason}")]
    MetadataInvalid { path: PathBuf, reason: String },

    #[error("classifier load already failed: {0}")]
    PreviouslyFailed(Box<LoadError>),
}

/// Per-tick prediction failure, treated as "no predictions this tick"
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("frame could not be converted to model input: {0}")]
    Frame(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("prediction did not complete within {0:?}")]
    Timeout(Duration),

    #[error("model produced {actual} outputs for {expected} labels")]
    OutputShape { expected: usize, actual: usize },
}

/// Failure to durably save the override layer.
///
/// The in-memory override stays applied when this is returned.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize override layer: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write override layer: {0}")]
    Io(#[from] std::io::Error),
}

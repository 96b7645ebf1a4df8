//! Classifier adapters
//!
//! A classifier is an explicitly owned handle injected into the scan loop.
//! It is loaded once per session; a failed load is permanent for that
//! instance and callers are expected to surface it instead of retrying.

mod onnx;
mod scripted;

pub use onnx::{ClassifierMetadata, InferenceStats, OnnxClassifier, DEFAULT_IMAGE_SIZE};
pub use scripted::{ScriptedOutput, ScriptedClassifier};

use crate::error::{LoadError, PredictError};
use crate::frames::Frame;
use crate::models::{Label, Prediction};
use async_trait::async_trait;
use std::path::Path;

/// Trait for single-frame image classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Load the model definition and label metadata.
    ///
    /// A second call after success is a no-op. After a failure every call
    /// returns [`LoadError::PreviouslyFailed`] without touching the resources.
    async fn load(&self, model_location: &Path, metadata_location: &Path)
        -> Result<(), LoadError>;

    /// Classify one frame. Returns an empty set when nothing is loaded yet.
    async fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, PredictError>;

    /// Whether a load has completed successfully
    fn is_ready(&self) -> bool;

    /// Labels in the classifier's output space (empty before load)
    fn list_labels(&self) -> Vec<Label>;
}

/// Load lifecycle shared by the classifier implementations
#[derive(Debug)]
enum LoadState<T> {
    Unloaded,
    Loaded(T),
    Failed(LoadError),
}

impl<T> LoadState<T> {
    /// Decide whether a load call should proceed
    ///
    /// `Ok(false)` means already loaded, `Err` replays an earlier failure.
    fn check_load(&self) -> Result<bool, LoadError> {
        match self {
            LoadState::Unloaded => Ok(true),
            LoadState::Loaded(_) => Ok(false),
            LoadState::Failed(e) => Err(LoadError::PreviouslyFailed(Box::new(e.clone()))),
        }
    }
}

//! In-memory classifier with scripted output
//!
//! Used to drive the scan loop without a model on disk: tests, demos and
//! API integration tests.

use super::{Classifier, LoadState};
use crate::error::{LoadError, PredictError};
use crate::frames::Frame;
use crate::models::{Label, Prediction};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// One scripted predict outcome; `Err` becomes an inference failure
pub type ScriptedOutput = Result<Vec<Prediction>, String>;

/// Classifier returning fixed or scripted predictions
///
/// Scripted outputs are consumed first, in order; once the script is empty
/// every call returns the current default predictions.
pub struct ScriptedClassifier {
    labels: Vec<Label>,
    fail_load: Option<LoadError>,
    delay: Option<Duration>,
    state: RwLock<LoadState<()>>,
    predictions: Mutex<Vec<Prediction>>,
    script: Mutex<VecDeque<ScriptedOutput>>,
    predict_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(labels: Vec<Label>, predictions: Vec<Prediction>) -> Self {
        Self {
            labels,
            fail_load: None,
            delay: None,
            state: RwLock::new(LoadState::Unloaded),
            predictions: Mutex::new(predictions),
            script: Mutex::new(VecDeque::new()),
            predict_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
        }
    }

    /// Make every load fail with the given error
    pub fn failing_load(mut self, error: LoadError) -> Self {
        self.fail_load = Some(error);
        self
    }

    /// Delay each prediction, simulating slow inference
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one-off outputs ahead of the default predictions
    pub fn with_script(self, outputs: Vec<ScriptedOutput>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(outputs);
        self
    }

    /// Replace the default predictions returned once the script runs out
    pub fn set_predictions(&self, predictions: Vec<Prediction>) {
        *self.predictions.lock().unwrap_or_else(|e| e.into_inner()) = predictions;
    }

    /// Number of predict calls that reached the classifier
    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    /// Number of load calls, including replays of a failure
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    fn next_output(&self) -> ScriptedOutput {
        if let Some(output) = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return output;
        }
        Ok(self
            .predictions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn load(&self, _model: &Path, _metadata: &Path) -> Result<(), LoadError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.check_load()? {
            return Ok(());
        }

        match &self.fail_load {
            Some(e) => {
                *state = LoadState::Failed(e.clone());
                Err(e.clone())
            }
            None => {
                *state = LoadState::Loaded(());
                Ok(())
            }
        }
    }

    async fn predict(&self, _frame: &Frame) -> Result<Vec<Prediction>, PredictError> {
        if !self.is_ready() {
            return Ok(Vec::new());
        }

        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        let output = self.next_output();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        output.map_err(PredictError::Inference)
    }

    fn is_ready(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(|e| e.into_inner()),
            LoadState::Loaded(_)
        )
    }

    fn list_labels(&self) -> Vec<Label> {
        if self.is_ready() {
            self.labels.clone()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn frame() -> Frame {
        Arc::new(DynamicImage::new_rgb8(2, 2))
    }

    #[tokio::test]
    async fn test_predict_before_load_returns_empty() {
        let classifier =
            ScriptedClassifier::new(vec!["A".to_string()], vec![Prediction::new("A", 0.9)]);

        assert!(classifier.predict(&frame()).await.unwrap().is_empty());
        assert_eq!(classifier.predict_calls(), 0);
        assert!(classifier.list_labels().is_empty());
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let classifier =
            ScriptedClassifier::new(vec!["A".to_string()], vec![Prediction::new("A", 0.9)])
                .with_script(vec![Err("boom".to_string()), Ok(vec![])]);
        classifier
            .load(Path::new("m"), Path::new("meta"))
            .await
            .unwrap();

        assert!(classifier.predict(&frame()).await.is_err());
        assert!(classifier.predict(&frame()).await.unwrap().is_empty());
        assert_eq!(classifier.predict(&frame()).await.unwrap().len(), 1);
        assert_eq!(classifier.list_labels(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_load_replays_failure() {
        let error = LoadError::ModelUnreadable {
            path: PathBuf::from("model.onnx"),
            reason: "offline".to_string(),
        };
        let classifier = ScriptedClassifier::new(vec![], vec![]).failing_load(error);

        assert!(matches!(
            classifier.load(Path::new("m"), Path::new("meta")).await,
            Err(LoadError::ModelUnreadable { .. })
        ));
        assert!(matches!(
            classifier.load(Path::new("m"), Path::new("meta")).await,
            Err(LoadError::PreviouslyFailed(_))
        ));
        assert!(!classifier.is_ready());
    }

    #[tokio::test]
    async fn test_repeated_load_is_noop() {
        let classifier = ScriptedClassifier::new(vec!["A".to_string()], vec![]);
        classifier.load(Path::new("m"), Path::new("meta")).await.unwrap();
        classifier.load(Path::new("m"), Path::new("meta")).await.unwrap();

        assert!(classifier.is_ready());
        assert_eq!(classifier.load_calls(), 2);
    }
}

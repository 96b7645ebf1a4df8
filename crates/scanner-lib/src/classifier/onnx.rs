//! ONNX image classifier using tract
//!
//! Loads an exported image model plus a JSON metadata file listing the class
//! labels in output order. Frames are resized to the model's square input and
//! normalised to `[-1, 1]` in NHWC layout.

use super::{Classifier, LoadState};
use crate::error::{LoadError, PredictError};
use crate::frames::Frame;
use crate::models::{Label, Prediction};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Input edge length used when the metadata does not name one
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 100;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Label metadata shipped next to the model
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierMetadata {
    pub labels: Vec<Label>,
    #[serde(default)]
    pub image_size: Option<u32>,
}

impl ClassifierMetadata {
    /// Parse and validate metadata JSON
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, LoadError> {
        let metadata: ClassifierMetadata =
            serde_json::from_slice(bytes).map_err(|e| LoadError::MetadataInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if metadata.labels.is_empty() {
            return Err(LoadError::MetadataInvalid {
                path: path.to_path_buf(),
                reason: "no labels listed".to_string(),
            });
        }

        if metadata.image_size == Some(0) {
            return Err(LoadError::MetadataInvalid {
                path: path.to_path_buf(),
                reason: "imageSize must be positive".to_string(),
            });
        }

        Ok(metadata)
    }

    pub fn image_size(&self) -> u32 {
        self.image_size.unwrap_or(DEFAULT_IMAGE_SIZE)
    }
}

struct LoadedModel {
    plan: TractModel,
    labels: Vec<Label>,
    image_size: u32,
}

impl LoadedModel {
    fn run(&self, frame: &DynamicImage) -> Result<Vec<Prediction>, PredictError> {
        let input = frame_to_tensor(frame, self.image_size);

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| PredictError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| PredictError::Inference("model returned no outputs".to_string()))?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        let values: Vec<f32> = scores.iter().copied().collect();
        if values.len() < self.labels.len() {
            return Err(PredictError::OutputShape {
                expected: self.labels.len(),
                actual: values.len(),
            });
        }

        Ok(self
            .labels
            .iter()
            .zip(values)
            .map(|(label, probability)| Prediction::new(label.clone(), probability))
            .collect())
    }
}

/// Resize a frame and pack it as a `[1, size, size, 3]` tensor in `[-1, 1]`
fn frame_to_tensor(frame: &DynamicImage, size: u32) -> Tensor {
    let rgb = frame.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let edge = size as usize;

    tract_ndarray::Array4::from_shape_fn((1, edge, edge, 3), |(_, y, x, c)| {
        let pixel = rgb.get_pixel(x as u32, y as u32);
        pixel[c] as f32 / 127.5 - 1.0
    })
    .into_tensor()
}

/// ONNX-backed classifier
pub struct OnnxClassifier {
    state: RwLock<LoadState<Arc<LoadedModel>>>,
    load_guard: tokio::sync::Mutex<()>,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl Default for OnnxClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl OnnxClassifier {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LoadState::Unloaded),
            load_guard: tokio::sync::Mutex::new(()),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    /// Build and optimize the runnable plan for a square NHWC input
    fn build_plan(
        model_bytes: &[u8],
        image_size: u32,
        path: &Path,
    ) -> Result<TractModel, LoadError> {
        let edge = image_size as usize;
        let invalid = |e: TractError| LoadError::ModelInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(invalid)?
            .with_input_fact(0, f32::fact([1, edge, edge, 3]).into())
            .map_err(invalid)?
            .into_optimized()
            .map_err(invalid)?
            .into_runnable()
            .map_err(invalid)
    }

    async fn load_model(
        model_location: &Path,
        metadata_location: &Path,
    ) -> Result<LoadedModel, LoadError> {
        let metadata_bytes = tokio::fs::read(metadata_location).await.map_err(|e| {
            LoadError::MetadataUnreadable {
                path: metadata_location.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        let metadata = ClassifierMetadata::parse(&metadata_bytes, metadata_location)?;

        let model_bytes = tokio::fs::read(model_location).await.map_err(|e| {
            LoadError::ModelUnreadable {
                path: model_location.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let image_size = metadata.image_size();
        let path = model_location.to_path_buf();
        let plan =
            tokio::task::spawn_blocking(move || Self::build_plan(&model_bytes, image_size, &path))
                .await
                .map_err(|e| LoadError::ModelInvalid {
                    path: model_location.to_path_buf(),
                    reason: e.to_string(),
                })??;

        Ok(LoadedModel {
            plan,
            labels: metadata.labels,
            image_size,
        })
    }

    fn loaded(&self) -> Option<Arc<LoadedModel>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            LoadState::Loaded(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Get inference statistics
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    async fn load(
        &self,
        model_location: &Path,
        metadata_location: &Path,
    ) -> Result<(), LoadError> {
        let _guard = self.load_guard.lock().await;

        let should_load = self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .check_load()?;
        if !should_load {
            warn!("Classifier already loaded, ignoring repeated load");
            return Ok(());
        }

        let result = Self::load_model(model_location, metadata_location).await;

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match result {
            Ok(model) => {
                info!(
                    model = %model_location.display(),
                    labels = model.labels.len(),
                    image_size = model.image_size,
                    "Classifier loaded"
                );
                *state = LoadState::Loaded(Arc::new(model));
                Ok(())
            }
            Err(e) => {
                *state = LoadState::Failed(e.clone());
                Err(e)
            }
        }
    }

    async fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, PredictError> {
        let model = match self.loaded() {
            Some(m) => m,
            None => {
                debug!("Predict called before classifier load");
                return Ok(Vec::new());
            }
        };

        let start = Instant::now();
        let frame = frame.clone();
        let predictions = tokio::task::spawn_blocking(move || model.run(&frame))
            .await
            .map_err(|e| PredictError::Inference(e.to_string()))??;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis(),
                "Inference exceeded {}ms target", SLOW_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(predictions)
    }

    fn is_ready(&self) -> bool {
        self.loaded().is_some()
    }

    fn list_labels(&self) -> Vec<Label> {
        self.loaded()
            .map(|model| model.labels.clone())
            .unwrap_or_default()
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    #[test]
    fn test_metadata_parse() {
        let json = br#"{"labels": ["Hollandia 50g", "Class 1"], "imageSize": 96}"#;
        let metadata = ClassifierMetadata::parse(json, Path::new("metadata.json")).unwrap();

        assert_eq!(metadata.labels, vec!["Hollandia 50g", "Class 1"]);
        assert_eq!(metadata.image_size(), 96);
    }

    #[test]
    fn test_metadata_default_image_size() {
        let json = br#"{"labels": ["A"], "modelName": "tm-my-image-model"}"#;
        let metadata = ClassifierMetadata::parse(json, Path::new("metadata.json")).unwrap();

        assert_eq!(metadata.image_size(), DEFAULT_IMAGE_SIZE);
    }

    #[test]
    fn test_metadata_rejects_empty_labels() {
        let result = ClassifierMetadata::parse(br#"{"labels": []}"#, Path::new("m.json"));
        assert!(matches!(result, Err(LoadError::MetadataInvalid { .. })));
    }

    #[test]
    fn test_metadata_rejects_garbage() {
        let result = ClassifierMetadata::parse(b"<html>404</html>", Path::new("m.json"));
        assert!(matches!(result, Err(LoadError::MetadataInvalid { .. })));
    }

    #[test]
    fn test_frame_to_tensor_shape_and_range() {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(50, 30, Rgb([255, 0, 128]));
        let tensor = frame_to_tensor(&DynamicImage::ImageRgb8(img), 16);

        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);

        let values = tensor.as_slice::<f32>().unwrap();
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[1] + 1.0).abs() < 1e-6);
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_predict_before_load_is_empty() {
        let classifier = OnnxClassifier::new();
        let frame: Frame = Arc::new(DynamicImage::new_rgb8(4, 4));

        assert!(!classifier.is_ready());
        assert!(classifier.predict(&frame).await.unwrap().is_empty());
        assert!(classifier.list_labels().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_metadata_fails() {
        let dir = TempDir::new().unwrap();
        let classifier = OnnxClassifier::new();

        let result = classifier
            .load(&dir.path().join("model.onnx"), &dir.path().join("metadata.json"))
            .await;

        assert!(matches!(result, Err(LoadError::MetadataUnreadable { .. })));
        assert!(!classifier.is_ready());
    }

    #[tokio::test]
    async fn test_load_invalid_model_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("metadata.json"), r#"{"labels": ["A"]}"#).unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"definitely not protobuf").unwrap();

        let classifier = OnnxClassifier::new();
        let result = classifier
            .load(&dir.path().join("model.onnx"), &dir.path().join("metadata.json"))
            .await;

        assert!(matches!(result, Err(LoadError::ModelInvalid { .. })));
    }

    #[tokio::test]
    async fn test_failed_load_is_permanent() {
        let dir = TempDir::new().unwrap();
        let classifier = OnnxClassifier::new();
        let model = dir.path().join("model.onnx");
        let metadata = dir.path().join("metadata.json");

        assert!(classifier.load(&model, &metadata).await.is_err());

        // Fixing the files does not help this instance
        std::fs::write(&metadata, r#"{"labels": ["A"]}"#).unwrap();
        let second = classifier.load(&model, &metadata).await;

        assert!(matches!(second, Err(LoadError::PreviouslyFailed(_))));
    }
}

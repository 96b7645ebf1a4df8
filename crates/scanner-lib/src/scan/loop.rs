//! The scan loop
//!
//! One task drives the whole pipeline. The next tick is scheduled only
//! after the previous one finished, so a slow classifier lowers the frame
//! rate instead of piling up overlapping predictions.

use super::{LoopState, ScanConfig, ScanHandle, Shared};
use crate::catalog::OverrideStore;
use crate::classifier::Classifier;
use crate::error::{LoadError, PredictError};
use crate::frames::FrameSource;
use crate::health::{components, HealthRegistry};
use crate::models::{Label, Prediction};
use crate::observability::{ScannerMetrics, StructuredLogger};
use crate::publisher::ResultPublisher;
use crate::resolver::{resolve, ResolvedResult};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Periodic frame → predict → resolve → publish loop
pub struct ScanLoop {
    classifier: Arc<dyn Classifier>,
    frames: Arc<dyn FrameSource>,
    store: Arc<OverrideStore>,
    publisher: ResultPublisher,
    config: ScanConfig,
    shared: Arc<Shared>,
    health: Option<HealthRegistry>,
    metrics: ScannerMetrics,
    logger: StructuredLogger,
    /// Label of the last published detection, for change logging
    last_label: Option<Label>,
    /// Whether the last tick found a frame
    frame_ready: bool,
}

impl ScanLoop {
    /// Load the classifier, then tick until stopped.
    ///
    /// Returns the load error if the classifier could not be loaded; the
    /// loop is `Stopped` in that case and never ticks.
    pub async fn run(mut self) -> Result<(), LoadError> {
        let cancel = self.shared.cancel.clone();
        if cancel.is_cancelled() {
            self.set_state(LoopState::Stopped);
            return Ok(());
        }

        self.set_state(LoopState::Loading);
        match self.load(&cancel).await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.fail(&e).await;
                return Err(e);
            }
            None => {
                info!("Scan loop stopped while loading classifier");
                self.set_state(LoopState::Stopped);
                return Ok(());
            }
        }

        info!(
            interval_ms = self.config.frame_interval.as_millis() as u64,
            threshold = self.config.confidence_threshold,
            "Starting scan loop"
        );

        let mut pause_rx = self.shared.pause_tx.subscribe();
        self.set_state(LoopState::Running);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.shared.ticks.fetch_add(1, Ordering::SeqCst);
            let paused = *pause_rx.borrow_and_update();
            if paused {
                self.enter_suspended();
            } else {
                self.leave_suspended();
                self.tick(&cancel, &mut pause_rx).await;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = pause_rx.changed() => {}
                _ = tokio::time::sleep(self.config.frame_interval) => {}
            }
        }

        info!(ticks = self.shared.ticks.load(Ordering::SeqCst), "Shutting down scan loop");
        self.set_state(LoopState::Stopped);
        Ok(())
    }

    /// Load the classifier, racing cancellation. `None` means stopped first.
    async fn load(&self, cancel: &CancellationToken) -> Option<Result<(), LoadError>> {
        let start = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            r = self.classifier.load(&self.config.model_location, &self.config.metadata_location) => r,
        };

        if result.is_ok() {
            let labels = self.classifier.list_labels().len();
            self.logger
                .log_classifier_loaded(labels, start.elapsed().as_millis());
            self.metrics.set_model_info(labels);
            if let Some(health) = &self.health {
                health.set_healthy(components::CLASSIFIER).await;
                health.set_ready(true).await;
            }
        }
        Some(result)
    }

    async fn fail(&mut self, error: &LoadError) {
        self.logger.log_classifier_load_failed(&error.to_string());
        *self.shared.fatal.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.clone());
        if let Some(health) = &self.health {
            health
                .set_unhealthy(components::CLASSIFIER, error.to_string())
                .await;
        }
        self.set_state(LoopState::Stopped);
    }

    /// One resolution tick. Publishes nothing when no frame is ready, or
    /// when a pause or stop lands while the frame or prediction is pending.
    async fn tick(&mut self, cancel: &CancellationToken, pause_rx: &mut watch::Receiver<bool>) {
        let start = Instant::now();
        let generation = self.shared.next_generation();

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = pause_rx.wait_for(|paused| *paused) => return,
            frame = self.frames.next_frame() => frame,
        };
        let Some(frame) = next else {
            self.metrics.inc_frames_skipped();
            self.note_frame_ready(false).await;
            trace!(generation, "No frame ready, skipping tick");
            return;
        };
        self.note_frame_ready(true).await;

        // Stop or pause may have landed while the frame was being fetched
        if cancel.is_cancelled() || *pause_rx.borrow() {
            debug!(generation, "Skipping predict after stop or pause");
            return;
        }

        let predict_start = Instant::now();
        let timeout = self.config.predict_timeout;
        let predicted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "Discarding in-flight prediction after stop");
                return;
            }
            _ = pause_rx.wait_for(|paused| *paused) => {
                debug!(generation, "Discarding in-flight prediction after pause");
                return;
            }
            r = tokio::time::timeout(timeout, self.classifier.predict(&frame)) => {
                r.unwrap_or(Err(PredictError::Timeout(timeout)))
            }
        };
        self.metrics
            .observe_predict_latency(predict_start.elapsed().as_secs_f64());

        let predictions = self.predictions_or_empty(generation, predicted);

        let mapping = self.store.effective();
        let result = resolve(&predictions, &mapping, self.config.confidence_threshold);
        self.publish(generation, result);

        self.metrics
            .observe_tick_latency(start.elapsed().as_secs_f64());
    }

    /// A failed predict counts as an empty prediction set for this tick
    fn predictions_or_empty(
        &self,
        generation: u64,
        predicted: Result<Vec<Prediction>, PredictError>,
    ) -> Vec<Prediction> {
        match predicted {
            Ok(predictions) => predictions,
            Err(e) => {
                self.metrics.inc_predict_errors();
                match e {
                    PredictError::Timeout(_) => {
                        warn!(generation, error = %e, "Classifier timed out")
                    }
                    _ => debug!(generation, error = %e, "Prediction failed"),
                }
                Vec::new()
            }
        }
    }

    fn publish(&mut self, generation: u64, result: ResolvedResult) {
        if result.is_empty() {
            self.metrics.inc_empty_results();
        } else {
            self.metrics.inc_detections();
        }

        let label = result.label().map(str::to_string);
        if label != self.last_label {
            let detection = result.detection();
            self.logger.log_detection_changed(
                self.last_label.as_deref(),
                label.as_deref(),
                detection.map(|d| d.confidence),
                detection.map(|d| d.record.price.as_str()),
            );
            self.last_label = label;
        }

        if !self.publisher.publish_at(generation, result) {
            trace!(generation, "Publication superseded by a newer tick");
        }
    }

    fn enter_suspended(&mut self) {
        if self.state() == LoopState::Suspended {
            return;
        }
        self.set_state(LoopState::Suspended);
        self.logger.log_scan_paused();

        let generation = self.shared.next_generation();
        self.publish(generation, ResolvedResult::Empty);
    }

    fn leave_suspended(&mut self) {
        if self.state() == LoopState::Suspended {
            self.set_state(LoopState::Running);
            self.logger.log_scan_resumed();
        }
    }

    async fn note_frame_ready(&mut self, ready: bool) {
        if ready == self.frame_ready {
            return;
        }
        self.frame_ready = ready;
        if let Some(health) = &self.health {
            if ready {
                health.set_healthy(components::FRAME_SOURCE).await;
            } else {
                health
                    .set_degraded(components::FRAME_SOURCE, "No frame available")
                    .await;
            }
        }
    }

    fn state(&self) -> LoopState {
        *self.shared.state_tx.borrow()
    }

    fn set_state(&self, state: LoopState) {
        let previous = self.shared.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Scan loop state changed");
        }
        self.metrics.set_loop_state(state.index());
    }
}

/// Builder for creating the scan loop and its control handle
pub struct ScanLoopBuilder {
    classifier: Option<Arc<dyn Classifier>>,
    frames: Option<Arc<dyn FrameSource>>,
    store: Option<Arc<OverrideStore>>,
    publisher: Option<ResultPublisher>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: ScanConfig,
}

impl ScanLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            classifier: None,
            frames: None,
            store: None,
            publisher: None,
            health: None,
            logger: None,
            config: ScanConfig::default(),
        }
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn frame_source(mut self, frames: Arc<dyn FrameSource>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn store(mut self, store: Arc<OverrideStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn publisher(mut self, publisher: ResultPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Report classifier and frame source health into this registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.config.frame_interval = interval;
        self
    }

    pub fn predict_timeout(mut self, timeout: Duration) -> Self {
        self.config.predict_timeout = timeout;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn model_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_location = path.into();
        self
    }

    pub fn metadata_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.metadata_location = path.into();
        self
    }

    /// Build the scan loop
    pub fn build(self) -> Result<(ScanLoop, ScanHandle)> {
        let classifier = self
            .classifier
            .ok_or_else(|| anyhow::anyhow!("Classifier is required"))?;
        let frames = self
            .frames
            .ok_or_else(|| anyhow::anyhow!("Frame source is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Override store is required"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| anyhow::anyhow!("Publisher is required"))?;

        if !(0.0..=1.0).contains(&self.config.confidence_threshold) {
            anyhow::bail!(
                "Confidence threshold must be within [0, 1], got {}",
                self.config.confidence_threshold
            );
        }

        let shared = Arc::new(Shared::new());
        let handle = ScanHandle::new(shared.clone());
        let scan_loop = ScanLoop {
            classifier,
            frames,
            store,
            publisher,
            config: self.config,
            shared,
            health: self.health,
            metrics: ScannerMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("price-scanner")),
            last_label: None,
            frame_ready: true,
        };

        Ok((scan_loop, handle))
    }
}

impl Default for ScanLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

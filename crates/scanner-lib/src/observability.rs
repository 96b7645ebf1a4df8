//! Observability infrastructure for the price scanner
//!
//! Provides:
//! - Prometheus metrics (tick and predict latency, detection counters, loop state)
//! - Event-tagged structured logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, GaugeVec,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScannerMetricsInner> = OnceLock::new();

struct ScannerMetricsInner {
    tick_latency_seconds: Histogram,
    predict_latency_seconds: Histogram,
    detections: IntCounter,
    empty_results: IntCounter,
    frames_skipped: IntCounter,
    predict_errors: IntCounter,
    persist_errors: IntCounter,
    overrides: IntGauge,
    loop_state: IntGauge,
    model_info: GaugeVec,
}

impl ScannerMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "price_scanner_tick_latency_seconds",
                "Wall time of one resolution tick, frame to publish",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            predict_latency_seconds: register_histogram!(
                "price_scanner_predict_latency_seconds",
                "Time spent in the classifier per frame",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register predict_latency_seconds"),

            detections: register_int_counter!(
                "price_scanner_detections_total",
                "Ticks that published a detected product"
            )
            .expect("Failed to register detections_total"),

            empty_results: register_int_counter!(
                "price_scanner_empty_results_total",
                "Ticks that published an empty result"
            )
            .expect("Failed to register empty_results_total"),

            frames_skipped: register_int_counter!(
                "price_scanner_frames_skipped_total",
                "Ticks skipped because no frame was ready"
            )
            .expect("Failed to register frames_skipped_total"),

            predict_errors: register_int_counter!(
                "price_scanner_predict_errors_total",
                "Failed or timed out classifier calls"
            )
            .expect("Failed to register predict_errors_total"),

            persist_errors: register_int_counter!(
                "price_scanner_persist_errors_total",
                "Override saves that failed to reach durable storage"
            )
            .expect("Failed to register persist_errors_total"),

            overrides: register_int_gauge!(
                "price_scanner_overrides",
                "Number of labels with a user override"
            )
            .expect("Failed to register overrides"),

            loop_state: register_int_gauge!(
                "price_scanner_loop_state",
                "Scan loop state (0 idle, 1 loading, 2 running, 3 suspended, 4 stopped)"
            )
            .expect("Failed to register loop_state"),

            model_info: register_gauge_vec!(
                "price_scanner_model_info",
                "Information about the loaded classifier",
                &["labels"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Lightweight handle to the global scanner metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ScannerMetrics {
    _private: (),
}

impl Default for ScannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScannerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScannerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScannerMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn observe_predict_latency(&self, duration_secs: f64) {
        self.inner().predict_latency_seconds.observe(duration_secs);
    }

    pub fn inc_detections(&self) {
        self.inner().detections.inc();
    }

    pub fn inc_empty_results(&self) {
        self.inner().empty_results.inc();
    }

    pub fn inc_frames_skipped(&self) {
        self.inner().frames_skipped.inc();
    }

    pub fn inc_predict_errors(&self) {
        self.inner().predict_errors.inc();
    }

    pub fn inc_persist_errors(&self) {
        self.inner().persist_errors.inc();
    }

    pub fn set_overrides(&self, count: usize) {
        self.inner().overrides.set(count as i64);
    }

    pub fn set_loop_state(&self, index: i64) {
        self.inner().loop_state.set(index);
    }

    /// Record the loaded classifier's label count
    pub fn set_model_info(&self, label_count: usize) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[&label_count.to_string()])
            .set(1.0);
    }
}

/// Structured logger for scanner events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, model_path: &str) {
        info!(
            event = "scanner_started",
            instance = %self.instance,
            scanner_version = %version,
            model_path = %model_path,
            "Price scanner started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scanner_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Price scanner shutting down"
        );
    }

    pub fn log_classifier_loaded(&self, label_count: usize, elapsed_ms: u128) {
        info!(
            event = "classifier_loaded",
            instance = %self.instance,
            labels = label_count,
            elapsed_ms = elapsed_ms,
            "Classifier loaded"
        );
    }

    pub fn log_classifier_load_failed(&self, error: &str) {
        warn!(
            event = "classifier_load_failed",
            instance = %self.instance,
            error = %error,
            "Classifier failed to load, scanning stopped"
        );
    }

    /// Log a change of the detected label; `None` means nothing is detected
    pub fn log_detection_changed(
        &self,
        previous: Option<&str>,
        current: Option<&str>,
        confidence: Option<f32>,
        price: Option<&str>,
    ) {
        info!(
            event = "detection_changed",
            instance = %self.instance,
            previous = ?previous,
            current = ?current,
            confidence = ?confidence,
            price = ?price,
            "Detected product changed"
        );
    }

    pub fn log_override_saved(&self, label: &str, price: &str, persisted: bool) {
        if persisted {
            info!(
                event = "override_saved",
                instance = %self.instance,
                label = %label,
                price = %price,
                "Price override saved"
            );
        } else {
            warn!(
                event = "override_save_failed",
                instance = %self.instance,
                label = %label,
                price = %price,
                "Price override applied but not persisted"
            );
        }
    }

    pub fn log_scan_paused(&self) {
        info!(event = "scan_paused", instance = %self.instance, "Scanning paused");
    }

    pub fn log_scan_resumed(&self) {
        info!(event = "scan_resumed", instance = %self.instance, "Scanning resumed");
    }
}

//! Scanner configuration

use anyhow::{Context, Result};
use scanner_lib::catalog::DEFAULT_OVERRIDE_KEY;
use scanner_lib::resolver::DEFAULT_CONFIDENCE_THRESHOLD;
use scanner_lib::scan::ScanConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Scanner configuration, read from `SCANNER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// ONNX model file
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Classifier metadata (labels, input size)
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Directory polled for camera frames
    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,

    /// Directory holding the persisted override layer
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_override_key")]
    pub override_key: String,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_predict_timeout")]
    pub predict_timeout_ms: u64,

    /// API server port for results, settings, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "price-scanner".to_string())
}

fn default_model_path() -> PathBuf {
    PathBuf::from("./my_model/model.onnx")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./my_model/metadata.json")
}

fn default_frames_dir() -> PathBuf {
    PathBuf::from("./frames")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_override_key() -> String {
    DEFAULT_OVERRIDE_KEY.to_string()
}

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_frame_interval() -> u64 {
    33
}

fn default_predict_timeout() -> u64 {
    2000
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            model_path: default_model_path(),
            metadata_path: default_metadata_path(),
            frames_dir: default_frames_dir(),
            storage_dir: default_storage_dir(),
            override_key: default_override_key(),
            confidence_threshold: default_confidence_threshold(),
            frame_interval_ms: default_frame_interval(),
            predict_timeout_ms: default_predict_timeout(),
            api_port: default_api_port(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SCANNER"))
            .build()?;

        let config: ScannerConfig = config
            .try_deserialize()
            .context("Invalid SCANNER_* configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if self.predict_timeout_ms == 0 {
            anyhow::bail!("predict_timeout_ms must be greater than zero");
        }
        if self.override_key.is_empty() {
            anyhow::bail!("override_key must not be empty");
        }
        Ok(())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            predict_timeout: Duration::from_millis(self.predict_timeout_ms),
            confidence_threshold: self.confidence_threshold,
            model_location: self.model_path.clone(),
            metadata_location: self.metadata_path.clone(),
        }
    }
}

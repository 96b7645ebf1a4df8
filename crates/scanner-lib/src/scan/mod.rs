//! Scan loop controller
//!
//! This module provides:
//! - The self-throttling tick loop: frame, predict, resolve, publish
//! - Pause/resume for settings edits, with the result forced to Empty while paused
//! - Cancellation that drops an in-flight predict instead of publishing it

mod handle;
mod r#loop;
mod state;


pub use handle::{ScanHandle, ScanStatus};
pub use r#loop::{ScanLoop, ScanLoopBuilder};
pub use state::LoopState;

use crate::error::LoadError;
use crate::resolver::DEFAULT_CONFIDENCE_THRESHOLD;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Configuration for the scan loop
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Wait between the end of one tick and the start of the next (default: 33ms)
    pub frame_interval: Duration,
    /// Upper bound on a single classifier call (default: 2s)
    pub predict_timeout: Duration,
    /// A prediction must be strictly above this to be shown (default: 0.85)
    pub confidence_threshold: f32,
    pub model_location: PathBuf,
    pub metadata_location: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            predict_timeout: Duration::from_secs(2),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            model_location: PathBuf::from("./my_model/model.onnx"),
            metadata_location: PathBuf::from("./my_model/metadata.json"),
        }
    }
}

/// State shared between the loop and its handles
struct Shared {
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    state_tx: watch::Sender<LoopState>,
    fatal: Mutex<Option<LoadError>>,
    ticks: AtomicU64,
    /// Last generation handed out; publications are ordered by it
    generation: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        let (pause_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(LoopState::Idle);
        Self {
            cancel: CancellationToken::new(),
            pause_tx,
            state_tx,
            fatal: Mutex::new(None),
            ticks: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

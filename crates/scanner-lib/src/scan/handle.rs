use super::{LoopState, Shared};
use crate::error::LoadError;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;

/// Point-in-time view of the scan loop, as reported over the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub state: LoopState,
    pub paused: bool,
    pub tick_count: u64,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

/// Cloneable control handle for a running scan loop
#[derive(Clone)]
pub struct ScanHandle {
    shared: Arc<Shared>,
}

impl ScanHandle {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Assert the pause flag. Returns `false` if it was already asserted.
    ///
    /// The loop enters `Suspended` and publishes an empty result; a predict
    /// already in flight is discarded.
    pub fn pause(&self) -> bool {
        !self.shared.pause_tx.send_replace(true)
    }

    /// Release the pause flag. Returns `false` if it was not asserted.
    pub fn resume(&self) -> bool {
        self.shared.pause_tx.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.pause_tx.borrow()
    }

    /// Cancel the loop. Takes effect before the next predict; an in-flight
    /// predict is dropped and its result never published.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    pub fn state(&self) -> LoopState {
        *self.shared.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.shared.state_tx.subscribe()
    }

    /// The load failure that stopped the loop, if any
    pub fn fatal_error(&self) -> Option<LoadError> {
        self.shared
            .fatal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ticks scheduled since the loop started running, including skipped ones
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ScanStatus {
        ScanStatus {
            state: self.state(),
            paused: self.is_paused(),
            tick_count: self.tick_count(),
            generation: self.shared.generation.load(Ordering::SeqCst),
            fatal_error: self.fatal_error().map(|e| e.to_string()),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the scan loop
///
/// `Idle → Loading → Running ⇄ Suspended`, with `Stopped` reachable from
/// every state and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Loading,
    Running,
    Suspended,
    Stopped,
}

impl LoopState {
    /// Numeric value exported through the loop state gauge
    pub fn index(&self) -> i64 {
        match self {
            LoopState::Idle => 0,
            LoopState::Loading => 1,
            LoopState::Running => 2,
            LoopState::Suspended => 3,
            LoopState::Stopped => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Loading => "loading",
            LoopState::Running => "running",
            LoopState::Suspended => "suspended",
            LoopState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

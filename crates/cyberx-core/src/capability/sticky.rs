use std::sync::OnceLock;

use serde::Serialize;
use tracing::warn;

/// Mode a pipeline stage is operating in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "reason", rename_all = "snake_case")]
pub enum StageMode {
    Primary,
    Fallback(String),
}

impl std::fmt::Display for StageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageMode::Primary => write!(f, "primary"),
            StageMode::Fallback(reason) => write!(f, "fallback ({})", reason),
        }
    }
}

/// Once tripped, a stage stays in fallback mode for the rest of the run
///
/// Shared between concurrent workers of the same stage; the first reason wins.
#[derive(Debug)]
pub struct StickyFallback {
    stage: &'static str,
    reason: OnceLock<String>,
}

impl StickyFallback {
    /// A stage that starts on its primary path
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            reason: OnceLock::new(),
        }
    }

    /// A stage that starts (and stays) in fallback mode
    pub fn tripped(stage: &'static str, reason: impl Into<String>) -> Self {
        let sticky = Self::new(stage);
        let _ = sticky.reason.set(reason.into());
        sticky
    }

    /// Switch to fallback; later calls keep the first reason
    pub fn trip(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.reason.set(reason.clone()).is_ok() {
            warn!(
                stage = self.stage,
                reason = %reason,
                "Stage switched to fallback for the rest of the run"
            );
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn mode(&self) -> StageMode {
        match self.reason.get() {
            Some(reason) => StageMode::Fallback(reason.clone()),
            None => StageMode::Primary,
        }
    }
}

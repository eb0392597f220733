//! Per-user stop signal for tracker tasks.
//!
//! Each tracker owns one [`CompletionSignal`]; the registry keeps a clone in
//! the user's slot. Firing it wakes that tracker's wait and no other, so a
//! completion event for one user can never cancel another user's reminders.

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Why a tracker was told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user reached their goal.
    GoalCompleted,
    /// A newer tracker for the same user replaced this one.
    Superseded,
    /// Tracking was stopped explicitly.
    Stopped,
    /// The registry is shutting down.
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GoalCompleted => write!(f, "goal completed"),
            Self::Superseded => write!(f, "superseded"),
            Self::Stopped => write!(f, "stopped"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// One-shot stop handle shared by a registry slot and its tracker task.
///
/// Only the first [`fire`](Self::fire) records a reason; later calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl CompletionSignal {
    /// Unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` if this call was the one that fired it.
    pub fn fire(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Returns `true` once any [`fire`](Self::fire) call has happened.
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason recorded by the first `fire`, `None` while unfired.
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Resolves once the signal fires, yielding the recorded reason.
    pub async fn fired(&self) -> StopReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(StopReason::Stopped)
    }
}

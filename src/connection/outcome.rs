//! Single-assignment outcome slot shared by the parties racing to resolve
//! an attempt.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFuture;

use super::ConnectResult;

#[derive(Debug, Default)]
pub struct AttemptControl {
    outcome: OnceLock<ConnectResult>,
    resolved: CancellationToken,
}

impl AttemptControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the outcome. Returns true for the first caller only; later
    /// calls leave the outcome untouched.
    pub fn resolve(&self, result: ConnectResult) -> bool {
        let won = self.outcome.set(result).is_ok();
        if won {
            self.resolved.cancel();
        }
        won
    }

    pub fn outcome(&self) -> Option<ConnectResult> {
        self.outcome.get().copied()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Completes once some party has claimed the outcome.
    pub fn resolved(&self) -> WaitForCancellationFuture<'_> {
        self.resolved.cancelled()
    }
}

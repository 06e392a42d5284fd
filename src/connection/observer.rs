//! Hooks for watching attempts move through their stages.

use std::fmt;

use tracing::debug;
use tracing::info;

use super::AttemptId;
use super::AttemptStage;
use crate::peer::PeerNode;

/// Receives every stage transition of every attempt. Called from executor
/// threads, so implementations must not block.
pub trait AttemptObserver: Send + Sync + fmt::Debug {
    fn on_transition(&self, attempt: AttemptId, node: &PeerNode, stage: AttemptStage);
}

/// Logs transitions through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn on_transition(&self, attempt: AttemptId, node: &PeerNode, stage: AttemptStage) {
        match stage {
            AttemptStage::Accepted => info!("Connected to {node} ({attempt})"),
            AttemptStage::Failed(result) => {
                info!("Connection to {node} failed: {result} ({attempt})");
            }
            stage => debug!("{attempt} to {node}: {stage}"),
        }
    }
}

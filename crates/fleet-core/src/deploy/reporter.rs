//! Progress events emitted by the orchestrator.
//!
//! The orchestrator never logs pipeline progress through a global; it hands
//! each event to the [`Reporter`] it was constructed with.

use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    RemoteCacheUnavailable {
        reason: String,
    },
    BuildFailed {
        function: String,
        error: String,
    },
    Skipped {
        function: String,
    },
    DeployStarted {
        function: String,
        attempt: u32,
    },
    Deployed {
        function: String,
        attempt: u32,
    },
    DeployFailed {
        function: String,
        attempt: u32,
        error: String,
    },
    RetryRoundStarted {
        round: u32,
        functions: Vec<String>,
    },
    CacheWriteFailed {
        error: String,
    },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: &DeployEvent);
}

/// Writes every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &DeployEvent) {
        match event {
            DeployEvent::RemoteCacheUnavailable { reason } => {
                warn!(%reason, "remote checksum cache unavailable; treating all functions as unknown");
            }
            DeployEvent::BuildFailed { function, error } => {
                warn!(%function, %error, "build failed");
            }
            DeployEvent::Skipped { function } => info!(%function, "unchanged, skipping"),
            DeployEvent::DeployStarted { function, attempt } => {
                info!(%function, attempt, "deploying");
            }
            DeployEvent::Deployed { function, attempt } => info!(%function, attempt, "deployed"),
            DeployEvent::DeployFailed {
                function,
                attempt,
                error,
            } => warn!(%function, attempt, %error, "deploy failed"),
            DeployEvent::RetryRoundStarted { round, functions } => {
                info!(round, count = functions.len(), ?functions, "retrying failed deploys");
            }
            DeployEvent::CacheWriteFailed { error } => warn!(%error, "checksum cache write failed"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<DeployEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeployEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &DeployEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

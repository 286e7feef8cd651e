//! Per-function state machine.

use std::time::Duration;

use serde::Serialize;

use crate::error::{FunctionError, PipelineError};
use crate::types::{BuildArtifact, FunctionDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionState {
    Pending,
    Built,
    Skipped,
    Deploying,
    Deployed,
    Failed,
}

impl std::fmt::Display for FunctionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Built => "built",
            Self::Skipped => "skipped",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Everything the pipeline tracks for one function during a run.
#[derive(Debug)]
pub struct FunctionRun {
    pub descriptor: FunctionDescriptor,
    state: FunctionState,
    /// Checksum of the last successful deploy, from either cache tier
    prior_checksum: Option<String>,
    /// Checksum of this run's artifact, when it could be computed
    new_checksum: Option<String>,
    artifact: Option<BuildArtifact>,
    error: Option<FunctionError>,
    attempts: u32,
    elapsed: Duration,
}

impl FunctionRun {
    pub fn new(descriptor: FunctionDescriptor) -> Self {
        Self {
            descriptor,
            state: FunctionState::Pending,
            prior_checksum: None,
            new_checksum: None,
            artifact: None,
            error: None,
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.function_name
    }

    pub fn state(&self) -> FunctionState {
        self.state
    }

    pub fn prior_checksum(&self) -> Option<&str> {
        self.prior_checksum.as_deref()
    }

    pub fn artifact(&self) -> Option<&BuildArtifact> {
        self.artifact.as_ref()
    }

    pub fn error(&self) -> Option<&FunctionError> {
        self.error.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Failed after a successful build, so a retry round may pick it up.
    pub fn is_retryable(&self) -> bool {
        self.state == FunctionState::Failed && self.artifact.is_some()
    }

    /// Deployed with a checksum that differs from the prior one.
    pub fn changed_checksum(&self) -> Option<&str> {
        if self.state != FunctionState::Deployed {
            return None;
        }
        let new = self.new_checksum.as_deref()?;
        (self.prior_checksum.as_deref() != Some(new)).then_some(new)
    }

    pub(crate) fn set_prior_checksum(&mut self, checksum: Option<String>) {
        self.prior_checksum = checksum;
    }

    pub(crate) fn add_elapsed(&mut self, elapsed: Duration) {
        self.elapsed += elapsed;
    }

    pub(crate) fn mark_built(&mut self, artifact: BuildArtifact) -> Result<(), PipelineError> {
        self.transition(FunctionState::Built)?;
        self.artifact = Some(artifact);
        Ok(())
    }

    pub(crate) fn mark_build_failed(&mut self, message: String) -> Result<(), PipelineError> {
        self.transition(FunctionState::Failed)?;
        self.error = Some(FunctionError::Build(message));
        Ok(())
    }

    pub(crate) fn mark_skipped(&mut self, checksum: String) -> Result<(), PipelineError> {
        self.transition(FunctionState::Skipped)?;
        self.descriptor.checksum = Some(checksum.clone());
        self.new_checksum = Some(checksum);
        Ok(())
    }

    /// Record the changed checksum. The function stays `Built` until its
    /// deploy round begins, which moves the whole round to `Deploying`
    /// before the scheduler admits any of it.
    pub(crate) fn mark_changed(&mut self, checksum: Option<String>) {
        if let Some(checksum) = &checksum {
            self.descriptor.checksum = Some(checksum.clone());
        }
        self.new_checksum = checksum;
    }

    pub(crate) fn begin_deploy(&mut self) -> Result<u32, PipelineError> {
        self.transition(FunctionState::Deploying)?;
        self.attempts += 1;
        Ok(self.attempts)
    }

    pub(crate) fn mark_deployed(&mut self) -> Result<(), PipelineError> {
        self.transition(FunctionState::Deployed)?;
        self.error = None;
        Ok(())
    }

    pub(crate) fn mark_deploy_failed(&mut self, message: String) -> Result<(), PipelineError> {
        self.transition(FunctionState::Failed)?;
        self.error = Some(FunctionError::Deploy(message));
        Ok(())
    }

    fn transition(&mut self, to: FunctionState) -> Result<(), PipelineError> {
        use FunctionState::*;

        let allowed = match (self.state, to) {
            (Pending, Built) | (Pending, Failed) => true,
            (Built, Skipped) | (Built, Deploying) => true,
            (Deploying, Deployed) | (Deploying, Failed) => true,
            // Only deploy failures are retried; build failures have no artifact
            (Failed, Deploying) => self.artifact.is_some(),
            _ => false,
        };

        if !allowed {
            return Err(PipelineError::InvalidTransition {
                function: self.descriptor.function_name.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

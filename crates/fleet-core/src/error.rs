//! Error types for the deploy pipeline.
//!
//! Only [`PipelineError`] ever escapes a run. Per-function failures are
//! captured as [`FunctionError`] on that function's result, checksum failures
//! downgrade to "changed", and cache write failures are reported and dropped.

use std::path::PathBuf;

use thiserror::Error;

use crate::deploy::FunctionState;
use crate::scheduler::SchedulerError;

/// Infrastructure-level faults that abort the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Function discovery failed.
    #[error("failed to scan functions under {path}: {message}")]
    Scan {
        /// Source root being scanned.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Two descriptors share a function name.
    #[error("duplicate function name: {0}")]
    DuplicateFunction(String),

    /// A requested function has no descriptor.
    #[error("unknown function requested: {0}")]
    UnknownFunction(String),

    /// The per-function state machine was driven out of order.
    #[error("invalid state transition for {function}: {from} -> {to}")]
    InvalidTransition {
        /// Function name.
        function: String,
        /// Current state.
        from: FunctionState,
        /// Requested state.
        to: FunctionState,
    },

    /// Invalid scheduler setup.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Terminal error recorded on a single function.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FunctionError {
    /// The artifact could not be built. Never retried.
    #[error("build failed: {0}")]
    Build(String),

    /// The platform rejected the deploy or the transport failed. Retryable.
    #[error("deploy failed: {0}")]
    Deploy(String),
}

/// Artifact content could not be hashed.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// Reading the artifact failed.
    #[error("failed to checksum {path}: {message}")]
    Unreadable {
        /// Artifact path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The hashing task did not complete.
    #[error("checksum task aborted: {0}")]
    Aborted(String),
}

/// A cache write failed. Logged, never escalated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheWriteError {
    /// Writing a per-function checksum file failed.
    #[error("failed to write local checksum for {function}: {message}")]
    Local {
        /// Function name.
        function: String,
        /// Error message.
        message: String,
    },

    /// Merging into the shared remote map failed.
    #[error("failed to update remote checksum cache: {0}")]
    Remote(String),
}

/// Result alias for pipeline-level operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

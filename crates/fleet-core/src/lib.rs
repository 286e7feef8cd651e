//! Fleet Core Library
//!
//! Deploy orchestration for large sets of independently built serverless
//! functions: bounded-concurrency scheduling, checksum-based change detection
//! against a local and a shared cache, and failure-isolated retries.

pub mod cache;
pub mod config;
pub mod context;
pub mod deploy;
pub mod detect;
pub mod error;
pub mod external;
pub mod fs;
pub mod scan;
pub mod scheduler;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, FleetConfig, RemoteCacheKind};
    pub use crate::context::AppContext;

    // Pipeline
    pub use crate::deploy::{
        DeployEvent, DeployOptions, DeployOrchestrator, DeployOutcome, DeployReport,
        DeployResult, Reporter, TracingReporter,
    };
    pub use crate::detect::{ChangeDecision, ChangeDetector, ChangeReason};
    pub use crate::scheduler::{TaskFailure, TaskScheduler};

    // Caches
    pub use crate::cache::{
        FileRemoteStore, HttpRemoteStore, InMemoryRemoteStore, LocalChecksumStore,
        RemoteCacheStore, RemoteCacheSync,
    };

    // Collaborators
    pub use crate::external::{Bundler, CommandBundler, CommandPlatformClient, PlatformClient};
    pub use crate::scan::ProjectScanner;

    // Shared types
    pub use crate::error::{CacheWriteError, FunctionError, PipelineError};
    pub use crate::types::{BuildArtifact, ChecksumMap, FunctionDescriptor, TriggerKind, TriggerSpec};
}

//! Deploy coordination: per-function state, orchestration, and reporting.

pub mod orchestrator;
pub mod report;
pub mod reporter;
pub mod state;

pub use orchestrator::{DeployOptions, DeployOrchestrator};
pub use report::{CacheSummary, DeployOutcome, DeployReport, DeployResult};
pub use reporter::{DeployEvent, RecordingReporter, Reporter, TracingReporter};
pub use state::{FunctionRun, FunctionState};

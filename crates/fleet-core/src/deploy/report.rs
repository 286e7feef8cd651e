//! Per-function results and the aggregate run report.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::state::{FunctionRun, FunctionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployOutcome {
    Skipped,
    Deployed,
    Failed,
}

impl std::fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Deployed => write!(f, "deployed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployResult {
    pub function_name: String,
    pub outcome: DeployOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Deploy attempts, including retries
    pub attempts: u32,
}

impl DeployResult {
    pub(crate) fn from_run(run: &FunctionRun) -> Self {
        let outcome = match run.state() {
            FunctionState::Deployed => DeployOutcome::Deployed,
            FunctionState::Skipped => DeployOutcome::Skipped,
            // Anything not settled successfully is a failure
            _ => DeployOutcome::Failed,
        };
        Self {
            function_name: run.name().to_string(),
            outcome,
            error: run.error().map(|e| e.to_string()),
            elapsed: run.elapsed(),
            attempts: run.attempts(),
        }
    }
}

/// What happened to the checksum caches after the deploys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub local_written: usize,
    pub local_failed: usize,
    /// Entries merged into the remote cache
    pub remote_updated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub started_at: DateTime<Utc>,
    pub results: Vec<DeployResult>,
    pub retry_rounds_run: u32,
    pub cache: CacheSummary,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl DeployReport {
    /// True iff no function ended `Failed`.
    pub fn success(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome != DeployOutcome::Failed)
    }

    pub fn count(&self, outcome: DeployOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn result(&self, function_name: &str) -> Option<&DeployResult> {
        self.results
            .iter()
            .find(|r| r.function_name == function_name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DeployResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == DeployOutcome::Failed)
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

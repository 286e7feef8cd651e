//! Build, diff, deploy, and persist for every function, independently.
//!
//! Sequence for one run:
//! 1. Fetch the remote checksum map (best-effort) and resolve each
//!    function's prior checksum: remote entry first, then the local file.
//! 2. Build everything through a [`TaskScheduler`] bounded by
//!    `build_concurrency`. Build failures are terminal.
//! 3. Hash each artifact; unchanged functions are skipped.
//! 4. Deploy changed functions, bounded by `deploy_concurrency`.
//! 5. Retry only the failed deploys, for up to `retry_rounds` rounds.
//! 6. Persist checksums of functions that deployed with a new checksum,
//!    locally and as one merge batch to the remote cache.
//!
//! Every per-function error ends up on that function's result. Only
//! [`PipelineError`] escapes.

use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::report::{CacheSummary, DeployOutcome, DeployReport, DeployResult};
use super::reporter::{DeployEvent, Reporter, TracingReporter};
use super::state::{FunctionRun, FunctionState};
use crate::cache::{LocalChecksumStore, RemoteCacheSync, RemoteFetch};
use crate::detect::{ChangeDecision, ChangeDetector, ChangeReason};
use crate::error::{CacheWriteError, PipelineError, PipelineResult};
use crate::external::{Bundler, PlatformClient};
use crate::scheduler::{TaskFailure, TaskScheduler};
use crate::types::{ChecksumMap, FunctionDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub project_id: String,
    pub build_concurrency: usize,
    pub deploy_concurrency: usize,
    /// Extra passes over failed deploys; 0 disables retries
    pub retry_rounds: u32,
    /// Pause before each retry round
    pub retry_delay: Duration,
    /// Redeploy even when the checksum is unchanged
    pub force: bool,
    /// Restrict the run to these functions; empty means all
    pub only: Vec<String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            build_concurrency: 4,
            deploy_concurrency: 2,
            retry_rounds: 0,
            retry_delay: Duration::ZERO,
            force: false,
            only: Vec::new(),
        }
    }
}

/// A failed attempt, with how long it ran.
#[derive(Debug)]
struct AttemptError {
    message: String,
    elapsed: Duration,
}

type Attempt<T> = Result<(T, Duration), AttemptError>;

async fn timed<T>(operation: impl Future<Output = anyhow::Result<T>>) -> Attempt<T> {
    let started = Instant::now();
    match operation.await {
        Ok(value) => Ok((value, started.elapsed())),
        Err(err) => Err(AttemptError {
            message: format!("{err:#}"),
            elapsed: started.elapsed(),
        }),
    }
}

fn failure_parts(failure: TaskFailure<AttemptError>) -> (String, Duration) {
    match failure {
        TaskFailure::Failed(err) => (err.message, err.elapsed),
        TaskFailure::Panicked(message) => (format!("panicked: {message}"), Duration::ZERO),
    }
}

pub struct DeployOrchestrator {
    bundler: Arc<dyn Bundler>,
    platform: Arc<dyn PlatformClient>,
    remote: RemoteCacheSync,
    local: LocalChecksumStore,
    reporter: Arc<dyn Reporter>,
    options: DeployOptions,
}

impl std::fmt::Debug for DeployOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployOrchestrator")
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DeployOrchestrator {
    /// Orchestrator without a remote cache, reporting through `tracing`.
    pub fn new(
        bundler: Arc<dyn Bundler>,
        platform: Arc<dyn PlatformClient>,
        options: DeployOptions,
    ) -> Self {
        Self {
            bundler,
            platform,
            remote: RemoteCacheSync::disabled(),
            local: LocalChecksumStore::new(),
            reporter: Arc::new(TracingReporter),
            options,
        }
    }

    pub fn with_remote_cache(mut self, remote: RemoteCacheSync) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run the whole pipeline over `descriptors`.
    pub async fn run(&self, descriptors: Vec<FunctionDescriptor>) -> PipelineResult<DeployReport> {
        let started_at = chrono::Utc::now();
        let started = Instant::now();
        let builds = TaskScheduler::new(self.options.build_concurrency)?;
        let deploys = TaskScheduler::new(self.options.deploy_concurrency)?;

        let mut runs = self.select(descriptors)?;
        info!(
            functions = runs.len(),
            project = %self.options.project_id,
            "starting deploy run"
        );

        self.resolve_prior_checksums(&mut runs).await;
        self.build_all(&builds, &mut runs).await?;
        let changed = self.detect_changes(&builds, &mut runs).await?;
        self.deploy_round(&deploys, &mut runs, &changed).await?;

        let mut retry_rounds_run = 0;
        for round in 1..=self.options.retry_rounds {
            let failed: Vec<usize> = runs
                .iter()
                .enumerate()
                .filter(|(_, run)| run.is_retryable())
                .map(|(index, _)| index)
                .collect();
            if failed.is_empty() {
                break;
            }

            self.reporter.report(&DeployEvent::RetryRoundStarted {
                round,
                functions: failed.iter().map(|&i| runs[i].name().to_string()).collect(),
            });
            if !self.options.retry_delay.is_zero() {
                tokio::time::sleep(self.options.retry_delay).await;
            }
            self.deploy_round(&deploys, &mut runs, &failed).await?;
            retry_rounds_run = round;
        }

        let cache = self.persist_checksums(&runs).await;
        let report = DeployReport {
            started_at,
            results: runs.iter().map(DeployResult::from_run).collect(),
            retry_rounds_run,
            cache,
            elapsed: started.elapsed(),
        };

        info!(
            deployed = report.count(DeployOutcome::Deployed),
            skipped = report.count(DeployOutcome::Skipped),
            failed = report.count(DeployOutcome::Failed),
            retry_rounds = retry_rounds_run,
            "deploy run finished"
        );
        Ok(report)
    }

    /// Reject duplicate names and apply the `only` filter.
    fn select(&self, descriptors: Vec<FunctionDescriptor>) -> PipelineResult<Vec<FunctionRun>> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.function_name.as_str()) {
                return Err(PipelineError::DuplicateFunction(
                    descriptor.function_name.clone(),
                ));
            }
        }
        if let Some(unknown) = self
            .options
            .only
            .iter()
            .find(|name| !seen.contains(name.as_str()))
        {
            return Err(PipelineError::UnknownFunction(unknown.clone()));
        }

        let only: HashSet<&str> = self.options.only.iter().map(String::as_str).collect();
        Ok(descriptors
            .into_iter()
            .filter(|d| only.is_empty() || only.contains(d.function_name.as_str()))
            .map(FunctionRun::new)
            .collect())
    }

    async fn resolve_prior_checksums(&self, runs: &mut [FunctionRun]) {
        let remote = match self.remote.fetch().await {
            RemoteFetch::Loaded(map) => Some(map),
            RemoteFetch::Unavailable { reason } => {
                self.reporter
                    .report(&DeployEvent::RemoteCacheUnavailable { reason });
                None
            }
            RemoteFetch::Disabled => None,
        };

        let store = self.local.clone();
        let outputs: Vec<PathBuf> = runs
            .iter()
            .map(|run| run.descriptor.output_path.clone())
            .collect();
        let count = outputs.len();
        let locals = tokio::task::spawn_blocking(move || {
            outputs
                .iter()
                .map(|path| store.read(path))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "local checksum reads aborted");
            vec![None; count]
        });

        for (run, local) in runs.iter_mut().zip(locals) {
            if let Some(checksum) = remote.as_ref().and_then(|map| map.get(run.name())) {
                run.descriptor.checksum = Some(checksum.to_string());
            }
            let prior = run.descriptor.checksum.clone().or(local);
            run.set_prior_checksum(prior);
        }
    }

    async fn build_all(
        &self,
        scheduler: &TaskScheduler,
        runs: &mut [FunctionRun],
    ) -> PipelineResult<()> {
        let bundler = &self.bundler;
        let settled = scheduler
            .run(runs.iter().map(|run| {
                let descriptor = &run.descriptor;
                move || timed(bundler.build(descriptor))
            }))
            .await;

        for (run, outcome) in runs.iter_mut().zip(settled) {
            match outcome {
                Ok((artifact, elapsed)) => {
                    run.add_elapsed(elapsed);
                    debug!(function = %run.name(), artifact = %artifact.path.display(), "built");
                    run.mark_built(artifact)?;
                }
                Err(failure) => {
                    let (message, elapsed) = failure_parts(failure);
                    run.add_elapsed(elapsed);
                    self.reporter.report(&DeployEvent::BuildFailed {
                        function: run.name().to_string(),
                        error: message.clone(),
                    });
                    run.mark_build_failed(message)?;
                }
            }
        }
        Ok(())
    }

    /// Mark unchanged functions skipped; return the indices to deploy.
    async fn detect_changes(
        &self,
        scheduler: &TaskScheduler,
        runs: &mut [FunctionRun],
    ) -> PipelineResult<Vec<usize>> {
        let inputs: Vec<(usize, PathBuf, Option<String>)> = runs
            .iter()
            .enumerate()
            .filter(|(_, run)| run.state() == FunctionState::Built)
            .filter_map(|(index, run)| {
                run.artifact().map(|artifact| {
                    (
                        index,
                        artifact.path.clone(),
                        run.prior_checksum().map(str::to_string),
                    )
                })
            })
            .collect();

        let detector = ChangeDetector::new(self.options.force);
        let detector = &detector;
        let settled = scheduler
            .run(inputs.iter().map(|(_, path, prior)| {
                move || async move {
                    Ok::<_, Infallible>(detector.detect(path, prior.as_deref()).await)
                }
            }))
            .await;

        let mut changed = Vec::new();
        for ((index, _, _), outcome) in inputs.iter().zip(settled) {
            let decision = outcome.unwrap_or_else(|failure| ChangeDecision::Changed {
                checksum: None,
                reason: ChangeReason::Unreadable(failure.to_string()),
            });
            let run = &mut runs[*index];
            match decision {
                ChangeDecision::Unchanged { checksum } => {
                    run.mark_skipped(checksum)?;
                    self.reporter.report(&DeployEvent::Skipped {
                        function: run.name().to_string(),
                    });
                }
                ChangeDecision::Changed { checksum, reason } => {
                    debug!(function = %run.name(), %reason, "changed");
                    run.mark_changed(checksum);
                    changed.push(*index);
                }
            }
        }
        Ok(changed)
    }

    /// Deploy the functions at `indices`; each settles to Deployed or Failed.
    async fn deploy_round(
        &self,
        scheduler: &TaskScheduler,
        runs: &mut [FunctionRun],
        indices: &[usize],
    ) -> PipelineResult<()> {
        if indices.is_empty() {
            return Ok(());
        }

        let mut attempts = Vec::with_capacity(indices.len());
        for &index in indices {
            attempts.push(runs[index].begin_deploy()?);
        }

        let platform = &self.platform;
        let reporter = &self.reporter;
        let project_id = self.options.project_id.as_str();
        let view: &[FunctionRun] = runs;
        let settled = scheduler
            .run(indices.iter().zip(&attempts).map(|(&index, &attempt)| {
                let descriptor = &view[index].descriptor;
                move || {
                    reporter.report(&DeployEvent::DeployStarted {
                        function: descriptor.function_name.clone(),
                        attempt,
                    });
                    timed(platform.deploy_descriptor(descriptor, project_id))
                }
            }))
            .await;

        for ((&index, attempt), outcome) in indices.iter().zip(attempts).zip(settled) {
            let run = &mut runs[index];
            match outcome {
                Ok(((), elapsed)) => {
                    run.add_elapsed(elapsed);
                    run.mark_deployed()?;
                    self.reporter.report(&DeployEvent::Deployed {
                        function: run.name().to_string(),
                        attempt,
                    });
                }
                Err(failure) => {
                    let (message, elapsed) = failure_parts(failure);
                    run.add_elapsed(elapsed);
                    self.reporter.report(&DeployEvent::DeployFailed {
                        function: run.name().to_string(),
                        attempt,
                        error: message.clone(),
                    });
                    run.mark_deploy_failed(message)?;
                }
            }
        }
        Ok(())
    }

    /// Write checksums for functions deployed with a new checksum. Cache
    /// failures are reported and never change a function's outcome.
    async fn persist_checksums(&self, runs: &[FunctionRun]) -> CacheSummary {
        let mut summary = CacheSummary::default();
        let mut batch = ChecksumMap::new();
        let mut pending = Vec::new();

        for run in runs {
            let Some(checksum) = run.changed_checksum() else {
                continue;
            };
            batch.insert(run.name(), checksum);
            pending.push((
                run.name().to_string(),
                run.descriptor.output_path.clone(),
                checksum.to_string(),
            ));
        }

        for written in self.write_local(pending).await {
            match written {
                Ok(()) => summary.local_written += 1,
                Err(err) => {
                    summary.local_failed += 1;
                    self.reporter.report(&DeployEvent::CacheWriteFailed {
                        error: err.to_string(),
                    });
                }
            }
        }

        match self.remote.update(&batch).await {
            Ok(sent) => summary.remote_updated = sent,
            Err(err) => {
                let message = err.to_string();
                self.reporter.report(&DeployEvent::CacheWriteFailed {
                    error: message.clone(),
                });
                summary.remote_error = Some(message);
            }
        }
        summary
    }

    /// Write `(name, output_path, checksum)` entries off the async runtime.
    async fn write_local(
        &self,
        pending: Vec<(String, PathBuf, String)>,
    ) -> Vec<Result<(), CacheWriteError>> {
        if pending.is_empty() {
            return Vec::new();
        }
        let store = self.local.clone();
        let names: Vec<String> = pending.iter().map(|(name, _, _)| name.clone()).collect();
        tokio::task::spawn_blocking(move || {
            pending
                .iter()
                .map(|(name, output, checksum)| store.write(name, output, checksum))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|err| {
            let message = format!("checksum write task failed: {err}");
            names
                .into_iter()
                .map(|function| {
                    Err(CacheWriteError::Local {
                        function,
                        message: message.clone(),
                    })
                })
                .collect()
        })
    }
}

//! Fakes and fixtures shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::deploy::{DeployOptions, DeployOrchestrator};
use fleet_core::external::{Bundler, PlatformClient};
use fleet_core::types::{BuildArtifact, FunctionDescriptor};
use tempfile::TempDir;

pub const PROJECT_ID: &str = "test-project";

pub fn options() -> DeployOptions {
    DeployOptions {
        project_id: PROJECT_ID.to_string(),
        ..DeployOptions::default()
    }
}

pub fn orchestrator(
    bundler: &Arc<FakeBundler>,
    platform: &Arc<FakePlatform>,
    options: DeployOptions,
) -> DeployOrchestrator {
    DeployOrchestrator::new(bundler.clone(), platform.clone(), options)
}

/// Tracks how many calls are in flight and the highest count seen.
#[derive(Debug, Default)]
pub struct Gauge {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Project fixture
// =============================================================================

/// Source and output directories for a set of one-file functions.
pub struct Project {
    pub temp: TempDir,
    names: Vec<String>,
}

impl Project {
    pub fn new(functions: &[(&str, &str)]) -> Self {
        let project = Self {
            temp: TempDir::new().unwrap(),
            names: functions.iter().map(|(name, _)| name.to_string()).collect(),
        };
        for (name, content) in functions {
            project.set_source(name, content);
        }
        project
    }

    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.temp.path().join("functions").join(name)
    }

    pub fn output_dir(&self, name: &str) -> PathBuf {
        self.temp.path().join("dist").join(name)
    }

    pub fn set_source(&self, name: &str, content: &str) {
        let dir = self.source_dir(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.js"), content).unwrap();
    }

    pub fn descriptors(&self) -> Vec<FunctionDescriptor> {
        self.names
            .iter()
            .map(|name| FunctionDescriptor::new(name, self.source_dir(name), self.output_dir(name)))
            .collect()
    }

    pub fn checksum_file(&self, name: &str) -> PathBuf {
        self.output_dir(name).join(".fleet-checksum")
    }
}

// =============================================================================
// Bundler
// =============================================================================

/// Copies `index.js` from source to output, so artifact content follows
/// source content.
#[derive(Debug, Default)]
pub struct FakeBundler {
    fail: HashSet<String>,
    panic: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    pub gauge: Gauge,
}

impl FakeBundler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.fail.insert(name.to_string());
        self
    }

    pub fn panicking(mut self, name: &str) -> Self {
        self.panic.insert(name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bundler for FakeBundler {
    async fn build(&self, descriptor: &FunctionDescriptor) -> anyhow::Result<BuildArtifact> {
        let name = descriptor.function_name.as_str();
        self.calls.lock().unwrap().push(name.to_string());

        self.gauge.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.gauge.exit();

        if self.panic.contains(name) {
            panic!("bundler crashed on {name}");
        }
        if self.fail.contains(name) {
            anyhow::bail!("syntax error in {name}");
        }

        let content = tokio::fs::read(descriptor.source_path.join("index.js")).await?;
        tokio::fs::create_dir_all(&descriptor.output_path).await?;
        tokio::fs::write(descriptor.output_path.join("index.js"), content).await?;
        Ok(BuildArtifact::new(descriptor.output_path.clone()))
    }
}

// =============================================================================
// Platform
// =============================================================================

#[derive(Debug, Default)]
pub struct FakePlatform {
    /// Remaining failures per function; `u32::MAX` never recovers
    failures: Mutex<HashMap<String, u32>>,
    delay: Duration,
    listed: Vec<String>,
    calls: Mutex<Vec<String>>,
    pub gauge: Gauge,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(self, name: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(name.to_string(), times);
        self
    }

    pub fn fail_always(self, name: &str) -> Self {
        self.fail_times(name, u32::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_listed(mut self, names: &[&str]) -> Self {
        self.listed = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn deploy(
        &self,
        function_name: &str,
        output_path: &Path,
        project_id: &str,
    ) -> anyhow::Result<()> {
        assert_eq!(project_id, PROJECT_ID);
        assert!(output_path.join("index.js").is_file());
        self.calls.lock().unwrap().push(function_name.to_string());

        self.gauge.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.gauge.exit();

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(function_name) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                anyhow::bail!("platform rejected {function_name}");
            }
        }
        Ok(())
    }

    async fn list(&self, _project_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.listed.clone())
    }
}

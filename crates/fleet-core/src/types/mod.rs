//! Shared core types used across scanning, detection, and deploy layers.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a deployed function is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Invoked over HTTP.
    #[default]
    Http,
    /// Invoked on a schedule.
    Schedule,
    /// Invoked by a platform event.
    Event,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Schedule => write!(f, "schedule"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Trigger metadata and runtime limits for a function.
///
/// Every field except `kind` is optional so a sidecar file can override only
/// what it names; see [`TriggerSpec::with_defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(default)]
    pub kind: TriggerKind,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub memory_mb: Option<u32>,

    #[serde(default)]
    pub timeout_secs: Option<u32>,

    #[serde(default)]
    pub max_instances: Option<u32>,

    /// HTTP route with `{param}` placeholders
    #[serde(default)]
    pub route: Option<String>,

    /// Cron expression for schedule triggers
    #[serde(default)]
    pub schedule: Option<String>,

    /// Event type for event triggers
    #[serde(default)]
    pub event: Option<String>,
}

impl TriggerSpec {
    /// Fill every unset field from `defaults`.
    pub fn with_defaults(mut self, defaults: &TriggerSpec) -> Self {
        if self.region.is_none() {
            self.region = defaults.region.clone();
        }
        if self.memory_mb.is_none() {
            self.memory_mb = defaults.memory_mb;
        }
        if self.timeout_secs.is_none() {
            self.timeout_secs = defaults.timeout_secs;
        }
        if self.max_instances.is_none() {
            self.max_instances = defaults.max_instances;
        }
        self
    }
}

/// One deployable function, as discovered by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Unique key within a run
    pub function_name: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub trigger: TriggerSpec,
    /// Last known deployed checksum; filled in while the pipeline runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl FunctionDescriptor {
    pub fn new(
        function_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            source_path: source_path.into(),
            output_path: output_path.into(),
            trigger: TriggerSpec::default(),
            checksum: None,
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Output of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// File or directory whose content is checksummed
    pub path: PathBuf,
}

impl BuildArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Function name to checksum.
///
/// Serializes as a flat JSON object. A missing entry means the checksum is
/// unknown, never that the function is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecksumMap(BTreeMap<String, String>);

impl ChecksumMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, function_name: &str) -> Option<&str> {
        self.0.get(function_name).map(String::as_str)
    }

    pub fn insert(&mut self, function_name: impl Into<String>, checksum: impl Into<String>) {
        self.0.insert(function_name.into(), checksum.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Shallow merge: entries in `other` overwrite same-name entries here,
    /// everything else is kept.
    pub fn merge(&mut self, other: &ChecksumMap) {
        for (name, checksum) in other.iter() {
            self.0.insert(name.clone(), checksum.clone());
        }
    }
}

impl FromIterator<(String, String)> for ChecksumMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ChecksumMap {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChecksumMap {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

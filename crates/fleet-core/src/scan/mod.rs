//! Function discovery.
//!
//! Every directory below the source root that holds an entry file becomes a
//! function. The relative directory path is kept as a list of
//! [`PathSegment`]s, and the function name and HTTP route are both derived
//! from that list:
//!
//! | Directory | Name | Route |
//! |---|---|---|
//! | `users` | `users` | `/users` |
//! | `users/[id]` | `users-id` | `/users/{id}` |
//! | `billing/webhooks` | `billing-webhooks` | `/billing/webhooks` |
//!
//! An optional `function.toml` next to the entry file overrides trigger
//! metadata; unset fields fall back to the configured defaults.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{FunctionDescriptor, TriggerKind, TriggerSpec};

pub const SIDECAR_FILE_NAME: &str = "function.toml";

const IGNORED_DIRS: &[&str] = &["node_modules", "target", "__pycache__"];

/// One directory level of a function's location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Static(String),
    /// Route parameter, written `[name]` on disk
    Param(String),
}

impl PathSegment {
    pub fn parse(component: &str) -> Self {
        match component
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            Some(param) if !param.is_empty() => Self::Param(param.to_string()),
            _ => Self::Static(component.to_string()),
        }
    }

    pub fn name_part(&self) -> &str {
        match self {
            Self::Static(value) | Self::Param(value) => value,
        }
    }

    pub fn route_part(&self) -> String {
        match self {
            Self::Static(value) => value.clone(),
            Self::Param(param) => format!("{{{param}}}"),
        }
    }
}

pub fn function_name(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(PathSegment::name_part)
        .collect::<Vec<_>>()
        .join("-")
}

pub fn route(segments: &[PathSegment]) -> String {
    let parts: Vec<String> = segments.iter().map(PathSegment::route_part).collect();
    format!("/{}", parts.join("/"))
}

#[derive(Debug, Clone)]
pub struct ProjectScanner {
    source_root: PathBuf,
    output_root: PathBuf,
    entry_files: Vec<String>,
    defaults: TriggerSpec,
}

impl ProjectScanner {
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            entry_files: ["index.ts", "index.js", "main.py", "main.go"]
                .into_iter()
                .map(String::from)
                .collect(),
            defaults: TriggerSpec::default(),
        }
    }

    pub fn with_entry_files(mut self, entry_files: Vec<String>) -> Self {
        self.entry_files = entry_files;
        self
    }

    pub fn with_defaults(mut self, defaults: TriggerSpec) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Discover functions, ordered by their path below the source root.
    pub fn scan(&self) -> PipelineResult<Vec<FunctionDescriptor>> {
        let mut found = Vec::new();
        self.walk(&self.source_root, &mut Vec::new(), &mut found)
            .map_err(|err| PipelineError::Scan {
                path: self.source_root.clone(),
                message: format!("{err:#}"),
            })?;

        let mut seen = HashSet::new();
        for descriptor in &found {
            if !seen.insert(descriptor.function_name.as_str()) {
                return Err(PipelineError::DuplicateFunction(
                    descriptor.function_name.clone(),
                ));
            }
        }

        debug!(
            root = %self.source_root.display(),
            functions = found.len(),
            "scanned functions"
        );
        Ok(found)
    }

    fn walk(
        &self,
        dir: &Path,
        segments: &mut Vec<PathSegment>,
        found: &mut Vec<FunctionDescriptor>,
    ) -> anyhow::Result<()> {
        // The source root itself has no name
        if !segments.is_empty() && self.has_entry_file(dir) {
            found.push(self.describe(dir, segments)?);
        }

        let mut children = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("Failed to read dir: {}", dir.display()))?
        {
            let entry =
                entry.with_context(|| format!("Failed to read dir entry: {}", dir.display()))?;
            let ty = entry
                .file_type()
                .with_context(|| format!("Failed to stat dir entry: {}", entry.path().display()))?;
            if !ty.is_dir() {
                continue;
            }
            let name = entry.file_name().into_string().map_err(|raw| {
                anyhow::anyhow!(
                    "Directory name is not valid UTF-8: {}",
                    dir.join(raw).display()
                )
            })?;
            if name.starts_with('.') || IGNORED_DIRS.contains(&name.as_str()) {
                continue;
            }
            children.push(name);
        }
        children.sort();

        for name in children {
            segments.push(PathSegment::parse(&name));
            self.walk(&dir.join(&name), segments, found)?;
            segments.pop();
        }
        Ok(())
    }

    fn has_entry_file(&self, dir: &Path) -> bool {
        self.entry_files
            .iter()
            .any(|entry| dir.join(entry).is_file())
    }

    fn describe(&self, dir: &Path, segments: &[PathSegment]) -> anyhow::Result<FunctionDescriptor> {
        let name = function_name(segments);
        let mut trigger = match self.read_sidecar(dir)? {
            Some(sidecar) => sidecar.with_defaults(&self.defaults),
            None => self.defaults.clone(),
        };
        if trigger.kind == TriggerKind::Http && trigger.route.is_none() {
            trigger.route = Some(route(segments));
        }

        Ok(
            FunctionDescriptor::new(&name, dir, self.output_root.join(&name))
                .with_trigger(trigger),
        )
    }

    fn read_sidecar(&self, dir: &Path) -> anyhow::Result<Option<TriggerSpec>> {
        let path = dir.join(SIDECAR_FILE_NAME);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let sidecar: TriggerSpec = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(sidecar))
    }
}

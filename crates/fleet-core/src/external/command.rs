//! Bundler and platform client backed by external commands.
//!
//! Commands are configured as argument lists, never shell strings, so paths
//! with spaces or brackets pass through untouched. Placeholders are replaced
//! per argument:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{name}` | function name |
//! | `{source}` | function source path |
//! | `{output}` | function output path |
//! | `{project}` | platform project id |
//! | `{trigger}` | trigger kind: `http`, `schedule` or `event` |
//! | `{region}` `{memory}` `{timeout}` `{max_instances}` | runtime settings (empty when unset) |
//! | `{route}` `{schedule}` `{event}` | trigger target (empty when unset) |
//!
//! `{project}` is only known at deploy time. A bare
//! [`PlatformClient::deploy`] call has no descriptor, so only `{name}`,
//! `{output}` and `{project}` are filled there.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Bundler, PlatformClient};
use crate::types::{BuildArtifact, FunctionDescriptor};

/// Maximum number of stderr lines carried into an error message.
const STDERR_TAIL_LINES: usize = 20;

/// An argv template with `{placeholder}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(argv: &[String]) -> anyhow::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Command template must not be empty"))?;
        if program.trim().is_empty() {
            anyhow::bail!("Command template has an empty program name");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitute placeholders into every argument. Substituted values are
    /// not scanned again.
    pub fn render(&self, vars: &HashMap<&str, String>) -> (String, Vec<String>) {
        (
            render_one(&self.program, vars),
            self.args.iter().map(|a| render_one(a, vars)).collect(),
        )
    }
}

fn render_one(raw: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after
            .find('}')
            .and_then(|close| vars.get(&after[..close]).map(|value| (close, value)))
        {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn descriptor_vars(descriptor: &FunctionDescriptor) -> HashMap<&'static str, String> {
    let trigger = &descriptor.trigger;
    let number = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_default();
    HashMap::from([
        ("name", descriptor.function_name.clone()),
        ("source", descriptor.source_path.display().to_string()),
        ("output", descriptor.output_path.display().to_string()),
        ("trigger", trigger.kind.to_string()),
        ("region", trigger.region.clone().unwrap_or_default()),
        ("memory", number(trigger.memory_mb)),
        ("timeout", number(trigger.timeout_secs)),
        ("max_instances", number(trigger.max_instances)),
        ("route", trigger.route.clone().unwrap_or_default()),
        ("schedule", trigger.schedule.clone().unwrap_or_default()),
        ("event", trigger.event.clone().unwrap_or_default()),
    ])
}

/// Run a rendered command and return its stdout.
async fn run_command(
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
) -> anyhow::Result<String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    debug!(program, ?args, "running command");
    let output = command
        .output()
        .await
        .with_context(|| format!("Failed to spawn {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        anyhow::bail!("{} exited with {}: {}", program, output.status, tail.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Builds functions by running a configured bundler command.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    template: CommandTemplate,
    working_dir: Option<PathBuf>,
}

impl CommandBundler {
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn build(&self, descriptor: &FunctionDescriptor) -> anyhow::Result<BuildArtifact> {
        tokio::fs::create_dir_all(&descriptor.output_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create output directory: {}",
                    descriptor.output_path.display()
                )
            })?;

        let (program, args) = self.template.render(&descriptor_vars(descriptor));
        run_command(&program, &args, self.working_dir.as_deref())
            .await
            .with_context(|| format!("Bundling {} failed", descriptor.function_name))?;

        Ok(BuildArtifact::new(descriptor.output_path.clone()))
    }
}

/// Deploys and lists functions through the platform's command-line tool.
#[derive(Debug, Clone)]
pub struct CommandPlatformClient {
    deploy: CommandTemplate,
    list: Option<CommandTemplate>,
    working_dir: Option<PathBuf>,
}

impl CommandPlatformClient {
    pub fn new(deploy: CommandTemplate) -> Self {
        Self {
            deploy,
            list: None,
            working_dir: None,
        }
    }

    pub fn with_list(mut self, list: CommandTemplate) -> Self {
        self.list = Some(list);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run_deploy(
        &self,
        function_name: &str,
        vars: &HashMap<&str, String>,
    ) -> anyhow::Result<()> {
        let (program, args) = self.deploy.render(vars);
        run_command(&program, &args, self.working_dir.as_deref())
            .await
            .with_context(|| format!("Deploying {} failed", function_name))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for CommandPlatformClient {
    async fn deploy(
        &self,
        function_name: &str,
        output_path: &Path,
        project_id: &str,
    ) -> anyhow::Result<()> {
        let vars = HashMap::from([
            ("name", function_name.to_string()),
            ("output", output_path.display().to_string()),
            ("project", project_id.to_string()),
        ]);
        self.run_deploy(function_name, &vars).await
    }

    async fn deploy_descriptor(
        &self,
        descriptor: &FunctionDescriptor,
        project_id: &str,
    ) -> anyhow::Result<()> {
        let mut vars = descriptor_vars(descriptor);
        vars.insert("project", project_id.to_string());
        self.run_deploy(&descriptor.function_name, &vars).await
    }

    async fn list(&self, project_id: &str) -> anyhow::Result<Vec<String>> {
        let template = self
            .list
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No platform list_command configured"))?;
        let vars = HashMap::from([("project", project_id.to_string())]);
        let (program, args) = template.render(&vars);
        let stdout = run_command(&program, &args, self.working_dir.as_deref()).await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

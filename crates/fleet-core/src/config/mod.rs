//! Configuration schema for fleet.toml
//!
//! ```toml
//! project_id = "acme-prod"
//! source_root = "functions"
//! output_root = "dist"
//!
//! [deploy]
//! build_concurrency = 4
//! deploy_concurrency = 2
//! retry_rounds = 2
//!
//! [build]
//! command = ["esbuild", "{source}/index.ts", "--bundle", "--outdir={output}"]
//!
//! [platform]
//! deploy_command = ["acme", "deploy", "{name}", "--dir", "{output}", "--project", "{project}"]
//! list_command = ["acme", "list", "--project", "{project}"]
//!
//! [remote_cache]
//! kind = "http"
//! url = "https://cache.example.com/checksums/acme-prod"
//! ```

pub mod parser;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::types::TriggerSpec;

pub use parser::{parse_fleet_toml, parse_fleet_toml_str};
pub use store::{CONFIG_FILE_NAME, ConfigStore};

pub const PROJECT_ID_ENV: &str = "FLEET_PROJECT_ID";
pub const DEFAULT_TOKEN_ENV: &str = "FLEET_CACHE_TOKEN";

/// Root configuration structure for fleet.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Platform project every function deploys into
    #[serde(default)]
    pub project_id: String,

    /// Directory scanned for functions, relative to the config file
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    /// Directory build outputs are written under
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    #[serde(default)]
    pub deploy: DeploySection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub platform: PlatformSection,

    #[serde(default)]
    pub remote_cache: RemoteCacheSection,

    /// Trigger defaults applied to every function
    #[serde(default)]
    pub defaults: TriggerSpec,
}

fn default_source_root() -> PathBuf {
    PathBuf::from("functions")
}

fn default_output_root() -> PathBuf {
    PathBuf::from("dist")
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            source_root: default_source_root(),
            output_root: default_output_root(),
            deploy: DeploySection::default(),
            build: BuildSection::default(),
            platform: PlatformSection::default(),
            remote_cache: RemoteCacheSection::default(),
            defaults: TriggerSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    pub build_concurrency: usize,
    pub deploy_concurrency: usize,
    pub retry_rounds: u32,
    pub retry_delay_ms: u64,
    pub force: bool,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            build_concurrency: 4,
            deploy_concurrency: 2,
            retry_rounds: 0,
            retry_delay_ms: 0,
            force: false,
        }
    }
}

impl DeploySection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Build command argv; supports `{name}`, `{source}`, `{output}`
    pub command: Vec<String>,

    /// File names that mark a directory as a function
    pub entry_files: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            entry_files: ["index.ts", "index.js", "main.py", "main.go"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSection {
    /// Deploy command argv; supports `{name}`, `{output}`, `{project}`
    pub deploy_command: Vec<String>,

    /// Prints one deployed function name per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCacheKind {
    #[default]
    None,
    File,
    Http,
}

impl std::fmt::Display for RemoteCacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::File => write!(f, "file"),
            Self::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCacheSection {
    pub kind: RemoteCacheKind,

    /// Shared JSON file for `kind = "file"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Endpoint for `kind = "http"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl RemoteCacheSection {
    pub fn token_env(&self) -> &str {
        self.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
    }
}

impl FleetConfig {
    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(project_id) = lookup(PROJECT_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.project_id = project_id;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project_id.trim().is_empty() {
            bail!("project_id is required (set it in fleet.toml or {PROJECT_ID_ENV})");
        }
        if self.deploy.build_concurrency == 0 {
            bail!("deploy.build_concurrency must be at least 1");
        }
        if self.deploy.deploy_concurrency == 0 {
            bail!("deploy.deploy_concurrency must be at least 1");
        }
        if self.build.entry_files.is_empty() {
            bail!("build.entry_files must name at least one file");
        }

        match self.remote_cache.kind {
            RemoteCacheKind::None => {}
            RemoteCacheKind::File => {
                if self.remote_cache.path.is_none() {
                    bail!("remote_cache.path is required when kind = \"file\"");
                }
            }
            RemoteCacheKind::Http => {
                let Some(url) = &self.remote_cache.url else {
                    bail!("remote_cache.url is required when kind = \"http\"");
                };
                if let Err(err) = url::Url::parse(url) {
                    bail!("remote_cache.url '{url}' is invalid: {err}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FleetConfig {
        FleetConfig {
            project_id: "acme".to_string(),
            ..FleetConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.source_root, PathBuf::from("functions"));
        assert_eq!(config.output_root, PathBuf::from("dist"));
        assert_eq!(config.deploy.build_concurrency, 4);
        assert_eq!(config.deploy.deploy_concurrency, 2);
        assert_eq!(config.deploy.retry_rounds, 0);
        assert_eq!(config.deploy.retry_delay(), Duration::ZERO);
        assert_eq!(config.remote_cache.kind, RemoteCacheKind::None);
        assert_eq!(config.remote_cache.token_env(), DEFAULT_TOKEN_ENV);
    }

    #[test]
    fn test_validate_requires_project_id() {
        let err = FleetConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("project_id"));
        valid().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = valid();
        config.deploy.deploy_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_remote_cache() {
        let mut config = valid();
        config.remote_cache.kind = RemoteCacheKind::File;
        assert!(config.validate().is_err());
        config.remote_cache.path = Some(PathBuf::from("/shared/checksums.json"));
        config.validate().unwrap();

        config.remote_cache.kind = RemoteCacheKind::Http;
        config.remote_cache.url = Some("not a url".to_string());
        assert!(config.validate().is_err());
        config.remote_cache.url = Some("https://cache.example.com/acme".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_project_id() {
        let mut config = valid();
        config.apply_env_with(|key| (key == PROJECT_ID_ENV).then(|| "staging".to_string()));
        assert_eq!(config.project_id, "staging");

        config.apply_env_with(|_| Some("  ".to_string()));
        assert_eq!(config.project_id, "staging");
    }
}

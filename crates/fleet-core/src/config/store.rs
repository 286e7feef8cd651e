//! Locating and loading fleet.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{FleetConfig, parser};

pub const CONFIG_FILE_NAME: &str = "fleet.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
    project_root: PathBuf,
}

impl ConfigStore {
    /// `./fleet.toml` in the current directory.
    pub fn discover() -> anyhow::Result<Self> {
        let project_root =
            std::env::current_dir().context("Could not determine current directory")?;
        Ok(Self::from_path(project_root.join(CONFIG_FILE_NAME)))
    }

    /// Relative paths in the config resolve against the file's directory.
    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let project_root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_path,
            project_root,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve a config path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Parse the file, apply environment overrides, then validate.
    pub fn load(&self) -> anyhow::Result<FleetConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<FleetConfig> {
        let mut config = parser::parse_fleet_toml(&self.config_path)?;
        config.apply_env_with(lookup);
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", self.config_path.display()))?;
        Ok(config)
    }
}

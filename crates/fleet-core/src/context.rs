//! Application context for unified dependency injection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{FileRemoteStore, HttpRemoteStore, RemoteCacheStore, RemoteCacheSync};
use crate::config::{ConfigStore, FleetConfig, RemoteCacheKind};
use crate::deploy::{DeployOptions, DeployOrchestrator, Reporter};
use crate::error::{PipelineError, PipelineResult};
use crate::external::{Bundler, CommandBundler, CommandPlatformClient, CommandTemplate, PlatformClient};
use crate::scan::ProjectScanner;
use crate::types::FunctionDescriptor;

/// Unified application context for dependency injection.
///
/// Built once from a loaded config; every collaborator the pipeline needs is
/// constructed here, so frontends never touch config sections directly.
#[derive(Debug, Clone)]
pub struct AppContext {
    store: ConfigStore,
    config: FleetConfig,
}

fn config_error(err: anyhow::Error) -> PipelineError {
    PipelineError::Config(format!("{err:#}"))
}

impl AppContext {
    /// Load `config_path`, or `./fleet.toml` when none is given.
    pub fn load(config_path: Option<&Path>) -> PipelineResult<Self> {
        let store = match config_path {
            Some(path) => ConfigStore::from_path(path),
            None => ConfigStore::discover().map_err(config_error)?,
        };
        let config = store.load().map_err(config_error)?;
        Ok(Self::new(store, config))
    }

    pub fn new(store: ConfigStore, config: FleetConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        self.store.project_root()
    }

    pub fn source_root(&self) -> PathBuf {
        self.store.resolve(&self.config.source_root)
    }

    pub fn output_root(&self) -> PathBuf {
        self.store.resolve(&self.config.output_root)
    }

    pub fn scanner(&self) -> ProjectScanner {
        ProjectScanner::new(self.source_root(), self.output_root())
            .with_entry_files(self.config.build.entry_files.clone())
            .with_defaults(self.config.defaults.clone())
    }

    pub fn scan(&self) -> PipelineResult<Vec<FunctionDescriptor>> {
        self.scanner().scan()
    }

    pub fn bundler(&self) -> PipelineResult<Arc<dyn Bundler>> {
        let template = CommandTemplate::new(&self.config.build.command)
            .map_err(|err| config_error(err.context("Invalid build.command")))?;
        Ok(Arc::new(
            CommandBundler::new(template).with_working_dir(self.project_root()),
        ))
    }

    pub fn platform(&self) -> PipelineResult<Arc<dyn PlatformClient>> {
        let platform = &self.config.platform;
        let deploy = CommandTemplate::new(&platform.deploy_command)
            .map_err(|err| config_error(err.context("Invalid platform.deploy_command")))?;
        let mut client = CommandPlatformClient::new(deploy).with_working_dir(self.project_root());
        if let Some(list) = &platform.list_command {
            let list = CommandTemplate::new(list)
                .map_err(|err| config_error(err.context("Invalid platform.list_command")))?;
            client = client.with_list(list);
        }
        Ok(Arc::new(client))
    }

    pub fn remote_cache(&self) -> PipelineResult<RemoteCacheSync> {
        self.remote_cache_with_env(|key| std::env::var(key).ok())
    }

    /// Choose the remote checksum store from `[remote_cache]`.
    pub fn remote_cache_with_env(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PipelineResult<RemoteCacheSync> {
        let section = &self.config.remote_cache;
        let store: Arc<dyn RemoteCacheStore> = match section.kind {
            RemoteCacheKind::None => return Ok(RemoteCacheSync::disabled()),
            RemoteCacheKind::File => {
                let path = section.path.as_deref().ok_or_else(|| {
                    PipelineError::Config("remote_cache.path is required".to_string())
                })?;
                Arc::new(FileRemoteStore::new(self.store.resolve(path)))
            }
            RemoteCacheKind::Http => {
                let raw = section.url.as_deref().ok_or_else(|| {
                    PipelineError::Config("remote_cache.url is required".to_string())
                })?;
                let url = url::Url::parse(raw).map_err(|err| {
                    PipelineError::Config(format!("remote_cache.url '{raw}' is invalid: {err}"))
                })?;
                let token = lookup(section.token_env()).filter(|t| !t.is_empty());
                Arc::new(HttpRemoteStore::new(url, token).map_err(config_error)?)
            }
        };
        Ok(RemoteCacheSync::new(store))
    }

    /// Run options from `[deploy]`; the CLI overrides individual fields.
    pub fn deploy_options(&self) -> DeployOptions {
        let deploy = &self.config.deploy;
        DeployOptions {
            project_id: self.config.project_id.clone(),
            build_concurrency: deploy.build_concurrency,
            deploy_concurrency: deploy.deploy_concurrency,
            retry_rounds: deploy.retry_rounds,
            retry_delay: deploy.retry_delay(),
            force: deploy.force,
            only: Vec::new(),
        }
    }

    pub fn orchestrator(
        &self,
        options: DeployOptions,
        reporter: Arc<dyn Reporter>,
    ) -> PipelineResult<DeployOrchestrator> {
        Ok(
            DeployOrchestrator::new(self.bundler()?, self.platform()?, options)
                .with_remote_cache(self.remote_cache()?)
                .with_reporter(reporter),
        )
    }

    /// Functions deployed in the project that have no local source.
    pub async fn orphans(&self) -> anyhow::Result<Vec<String>> {
        let local = self.scan()?;
        let deployed = self.platform()?.list(&self.config.project_id).await?;
        Ok(orphaned(deployed, &local))
    }
}

/// Names in `deployed` with no matching descriptor, sorted and deduplicated.
pub fn orphaned(deployed: Vec<String>, local: &[FunctionDescriptor]) -> Vec<String> {
    let known: HashSet<&str> = local.iter().map(|d| d.function_name.as_str()).collect();
    let mut orphans: Vec<String> = deployed
        .into_iter()
        .filter(|name| !known.contains(name.as_str()))
        .collect();
    orphans.sort();
    orphans.dedup();
    orphans
}

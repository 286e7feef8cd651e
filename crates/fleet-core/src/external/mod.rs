//! Collaborators the deploy pipeline drives but does not implement itself:
//! bundling function source and talking to the hosting platform.

pub mod command;

use std::path::Path;

use async_trait::async_trait;

use crate::types::{BuildArtifact, FunctionDescriptor};

pub use command::{CommandBundler, CommandPlatformClient, CommandTemplate};

/// Compiles a function's source into a deployable artifact.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Build `descriptor.source_path` into `descriptor.output_path`.
    async fn build(&self, descriptor: &FunctionDescriptor) -> anyhow::Result<BuildArtifact>;
}

/// Deploys artifacts to the hosting platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn deploy(
        &self,
        function_name: &str,
        output_path: &Path,
        project_id: &str,
    ) -> anyhow::Result<()>;

    /// Deploy a scanned function. Clients that use trigger metadata override
    /// this; the default only passes what [`PlatformClient::deploy`] takes.
    async fn deploy_descriptor(
        &self,
        descriptor: &FunctionDescriptor,
        project_id: &str,
    ) -> anyhow::Result<()> {
        self.deploy(&descriptor.function_name, &descriptor.output_path, project_id)
            .await
    }

    /// Names of the functions currently deployed in `project_id`.
    async fn list(&self, project_id: &str) -> anyhow::Result<Vec<String>>;
}

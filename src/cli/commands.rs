//! CLI command definitions

use crate::core::registry::LATEST_BAZEL_VERSION;
use crate::execution::BuildRequest;
use clap::Args;
use std::path::PathBuf;

/// Selects a container type and where it is published
#[derive(Debug, Args, Clone)]
pub struct ContainerArgs {
    /// Type of the container, see the `types` command
    #[arg(short = 'd', long = "type")]
    pub type_key: String,

    /// Cloud project to build in and push to
    #[arg(short, long)]
    pub project: Option<String>,

    /// Name of the published container
    #[arg(short, long)]
    pub container: Option<String>,

    /// Tag of the published container
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Bazel version used by the build steps
    #[arg(long, default_value = LATEST_BAZEL_VERSION)]
    pub bazel_version: String,

    /// Storage bucket receiving the package tarball
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// YAML file replacing the built-in type maps
    #[arg(short, long)]
    pub map: Option<PathBuf>,
}

impl ContainerArgs {
    fn to_request(&self) -> BuildRequest {
        BuildRequest {
            project: self.project.clone(),
            container: self.container.clone(),
            tag: self.tag.clone(),
            bazel_version: self.bazel_version.clone(),
            bucket: self.bucket.clone(),
            map: self.map.clone(),
            ..BuildRequest::new(&self.type_key)
        }
    }
}

/// Build a container
#[derive(Debug, Args, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub container: ContainerArgs,

    /// Build with the local Bazel and docker instead of the cloud
    #[arg(short, long)]
    pub local: bool,

    /// Do not wait for the cloud build to finish
    #[arg(short = 'a', long = "async")]
    pub async_submit: bool,
}

impl BuildCommand {
    pub fn to_request(&self) -> BuildRequest {
        BuildRequest {
            local: self.local,
            async_submit: self.async_submit,
            ..self.container.to_request()
        }
    }
}

/// Render a cloud build pipeline
#[derive(Debug, Args, Clone)]
pub struct PipelineCommand {
    #[command(flatten)]
    pub container: ContainerArgs,

    /// Write the pipeline to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl PipelineCommand {
    pub fn to_request(&self) -> BuildRequest {
        self.container.to_request()
    }
}

/// Generate toolchain configs
#[derive(Debug, Args, Clone)]
pub struct ConfigsCommand {
    /// Bazel version the configs are generated for
    #[arg(long)]
    pub bazel_version: String,

    /// buildifier used to format generated files
    #[arg(long)]
    pub buildifier: Option<PathBuf>,

    /// YAML file replacing the built-in config groups
    #[arg(long)]
    pub groups: Option<PathBuf>,

    /// Write a JSON manifest of the generated configs
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

/// List container types
#[derive(Debug, Args, Clone)]
pub struct TypesCommand {
    /// YAML file replacing the built-in type maps
    #[arg(short, long)]
    pub map: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

//! Container build workflow
//!
//! Builds and tests one toolchain container either with the local Bazel and
//! docker installation, or by submitting a generated pipeline to the cloud
//! build service.

use crate::core::pipeline::{container_build_pipeline, BuildPipeline, CloudBuildTarget};
use crate::core::registry::{ContainerTypeEntry, RegistryError, TypeRegistry, LATEST_BAZEL_VERSION};
use crate::core::ReleaseContext;
use crate::execution::workdir::ScratchDir;
use crate::runner::{CommandRunner, Invocation};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Machine type requested for cloud builds
pub const CLOUD_MACHINE_TYPE: &str = "n1-highcpu-32";

/// File name of the generated pipeline inside the scratch directory
pub const PIPELINE_FILE: &str = "cloudbuild.yaml";

/// Invalid combinations of build arguments
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("--{} is required for cloud builds", .0.join(", --"))]
    MissingCloudArgs(Vec<&'static str>),
}

/// Everything needed to build one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub type_key: String,
    pub project: Option<String>,
    pub container: Option<String>,
    pub tag: Option<String>,
    pub bazel_version: String,
    pub bucket: Option<String>,

    /// Override file replacing the built-in type maps
    pub map: Option<PathBuf>,

    /// Build with the local toolchain instead of the cloud service
    pub local: bool,

    /// Return as soon as the cloud build is queued
    pub async_submit: bool,
}

impl BuildRequest {
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            project: None,
            container: None,
            tag: None,
            bazel_version: LATEST_BAZEL_VERSION.to_string(),
            bucket: None,
            map: None,
            local: false,
            async_submit: false,
        }
    }

    /// Cloud builds need a project, container and tag
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.local {
            return Ok(());
        }
        let missing: Vec<&'static str> = [
            ("project", &self.project),
            ("container", &self.container),
            ("tag", &self.tag),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RequestError::MissingCloudArgs(missing))
        }
    }

    /// Publishing coordinates of a cloud build
    pub fn cloud_target(&self) -> Result<CloudBuildTarget, RequestError> {
        self.validate()?;
        let value = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok(CloudBuildTarget {
            project: value(&self.project),
            container: value(&self.container),
            tag: value(&self.tag),
            bazel_version: self.bazel_version.clone(),
            bucket: self.bucket.clone(),
        })
    }
}

/// The built-in registry, or one loaded from an override file
pub fn load_registry(map: Option<&Path>, require_tarballs: bool) -> Result<TypeRegistry, RegistryError> {
    match map {
        Some(path) => {
            info!("Loading type maps from {}", path.display());
            TypeRegistry::from_override(path, require_tarballs)
        }
        None => TypeRegistry::builtin(),
    }
}

/// Render the cloud pipeline for a request without submitting it
pub fn render_pipeline(registry: &TypeRegistry, request: &BuildRequest) -> Result<BuildPipeline> {
    let target = request.cloud_target()?;
    let entry = registry.resolve(&request.type_key, request.bucket.is_some())?;
    Ok(container_build_pipeline(&entry, &target)?)
}

/// Builds containers through a command runner
pub struct ContainerBuilder<'a, R> {
    runner: R,
    context: &'a ReleaseContext,
}

impl<'a, R: CommandRunner> ContainerBuilder<'a, R> {
    pub fn new(runner: R, context: &'a ReleaseContext) -> Self {
        Self { runner, context }
    }

    /// Build, test and tag the requested container
    pub async fn build(&self, registry: &TypeRegistry, request: &BuildRequest) -> Result<()> {
        request.validate()?;
        let entry = registry.resolve(&request.type_key, request.bucket.is_some())?;
        info!("Building {} from {}", entry.type_key, entry.label());

        self.bazel(["clean"]).await.context("bazel clean failed")?;
        normalize_permissions(&self.context.third_party_dir())?;

        if request.local {
            self.local_build(&entry).await
        } else {
            self.cloud_build(&entry, request).await
        }
    }

    async fn local_build(&self, entry: &ContainerTypeEntry) -> Result<()> {
        self.bazel(["run".to_string(), entry.label()])
            .await
            .with_context(|| format!("Failed to build {}", entry.label()))?;
        self.bazel(["test".to_string(), entry.test_label()])
            .await
            .with_context(|| format!("Tests failed for {}", entry.label()))?;

        let local_tag = format!("{}:latest", entry.type_key);
        self.runner
            .run(&Invocation::new("docker", ["tag".to_string(), entry.local_image(), local_tag.clone()]))
            .await
            .with_context(|| format!("Failed to tag {}", entry.local_image()))?;

        info!("Tagged {} as {}", entry.local_image(), local_tag);
        Ok(())
    }

    async fn cloud_build(&self, entry: &ContainerTypeEntry, request: &BuildRequest) -> Result<()> {
        let target = request.cloud_target()?;
        let pipeline = container_build_pipeline(entry, &target)?;

        let scratch = ScratchDir::create(self.context.tmp_dir())?;
        let config = scratch.join(PIPELINE_FILE);
        pipeline.write_to(&config)?;
        debug!("Wrote pipeline to {}", config.display());

        let mut args = vec![
            "builds".to_string(),
            "submit".to_string(),
            ".".to_string(),
            format!("--config={}", config.display()),
            format!("--project={}", target.project),
            format!("--machine-type={}", CLOUD_MACHINE_TYPE),
        ];
        if request.async_submit {
            args.push("--async".to_string());
        }

        self.runner
            .run(
                &Invocation::new("gcloud", args)
                    .in_dir(self.context.git_root())
                    .streaming(),
            )
            .await
            .with_context(|| format!("Failed to submit cloud build for {}", target.image()))?;

        info!("Submitted cloud build for {}", target.image());
        Ok(())
    }

    async fn bazel<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new("bazel", args)
            .in_dir(self.context.git_root())
            .streaming();
        Ok(self.runner.run(&invocation).await?)
    }
}

/// Make every file under `dir` world readable and not executable
#[cfg(unix)]
pub fn normalize_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !dir.exists() {
        debug!("{} does not exist, skipping permissions", dir.display());
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let file_type = std::fs::symlink_metadata(&path)?.file_type();
        if file_type.is_dir() {
            normalize_permissions(&path)?;
        } else if file_type.is_file() {
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn normalize_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}

//! Build pipeline documents
//!
//! A pipeline is an ordered list of steps plus optional top-level timeout and
//! image list, in the shape consumed by the cloud build service. Step order is
//! insertion order; dependencies are only declared through each step's
//! `waitFor` list and are resolved by the service, not here.

use crate::core::registry::ContainerTypeEntry;
use crate::core::step::{make_step, BuildStep, StepError, StepOptions, NO_PREDECESSORS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Builder image used for Bazel steps
pub const BAZEL_BUILDER: &str = "l.gcr.io/google/bazel";

/// Builder image used for docker steps
pub const DOCKER_BUILDER: &str = "gcr.io/cloud-builders/docker";

/// Builder image used for storage uploads
pub const GSUTIL_BUILDER: &str = "gcr.io/cloud-builders/gsutil";

/// Timeout for a whole container build
pub const CONTAINER_BUILD_TIMEOUT: &str = "3600s";

/// A complete build pipeline document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPipeline {
    pub steps: Vec<BuildStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Images pushed once every step succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Wrap steps into a pipeline document
pub fn make_pipeline(
    steps: Vec<BuildStep>,
    timeout: Option<String>,
    images: Option<Vec<String>>,
) -> BuildPipeline {
    BuildPipeline {
        steps,
        timeout,
        images,
    }
}

impl BuildPipeline {
    /// Serialize the whole document
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse a document, e.g. one written by `write_to`
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Step by ID
    pub fn step(&self, id: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.id.as_deref() == Some(id))
    }

    /// Write the document to `path`
    ///
    /// The document is rendered in full before anything touches the
    /// filesystem and then moved into place, so a reader never sees a partial
    /// file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = self.to_yaml().context("Failed to serialize build pipeline")?;

        let staging = path.with_extension("yaml.partial");
        std::fs::write(&staging, &yaml)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        if let Err(e) = std::fs::rename(&staging, path) {
            if let Err(cleanup) = std::fs::remove_file(&staging) {
                warn!("Failed to remove {}: {}", staging.display(), cleanup);
            }
            return Err(e).with_context(|| format!("Failed to move build pipeline to {}", path.display()));
        }

        debug!("Wrote build pipeline with {} steps to {}", self.steps.len(), path.display());
        Ok(())
    }
}

/// Parallel per-field lists describing several similar steps
///
/// The length of `args` is the number of steps. Every other list may be
/// shorter, in which case the missing entries are absent. A single name is
/// used for every step.
#[derive(Debug, Clone, Default)]
pub struct SimilarSteps {
    pub names: Vec<String>,
    pub args: Vec<Vec<String>>,
    pub env: Vec<Option<Vec<String>>>,
    pub dirs: Vec<Option<String>>,
    pub ids: Vec<Option<String>>,
    pub wait_for: Vec<Option<Vec<String>>>,
    pub entrypoints: Vec<Option<String>>,
    pub secret_env: Vec<Option<Vec<String>>>,
    pub volumes: Vec<Option<Vec<Vec<String>>>>,
    pub timeouts: Vec<Option<String>>,
}

fn nth<T: Clone>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).cloned().flatten()
}

fn check_len(field: &'static str, len: usize, steps: usize) -> Result<(), StepError> {
    if len > steps {
        Err(StepError::LengthMismatch { field, len, steps })
    } else {
        Ok(())
    }
}

/// Build one step per entry of `spec.args`
pub fn make_similar_steps(spec: SimilarSteps) -> Result<Vec<BuildStep>, StepError> {
    let count = spec.args.len();

    check_len("names", spec.names.len(), count.max(1))?;
    check_len("env", spec.env.len(), count)?;
    check_len("dirs", spec.dirs.len(), count)?;
    check_len("ids", spec.ids.len(), count)?;
    check_len("wait_for", spec.wait_for.len(), count)?;
    check_len("entrypoints", spec.entrypoints.len(), count)?;
    check_len("secret_env", spec.secret_env.len(), count)?;
    check_len("volumes", spec.volumes.len(), count)?;
    check_len("timeouts", spec.timeouts.len(), count)?;

    let shared_name = match spec.names.as_slice() {
        [single] => Some(single.clone()),
        _ => None,
    };

    spec.args
        .iter()
        .enumerate()
        .map(|(index, args)| {
            let name = shared_name
                .clone()
                .or_else(|| spec.names.get(index).cloned())
                .ok_or(StepError::MissingName { index })?;

            let options = StepOptions {
                env: nth(&spec.env, index),
                dir: nth(&spec.dirs, index),
                id: nth(&spec.ids, index),
                wait_for: nth(&spec.wait_for, index),
                entrypoint: nth(&spec.entrypoints, index),
                secret_env: nth(&spec.secret_env, index),
                volumes: nth(&spec.volumes, index),
                timeout: nth(&spec.timeouts, index),
            };

            make_step(name, args.iter().cloned(), options)
        })
        .collect()
}

/// Where the cloud build publishes the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudBuildTarget {
    pub project: String,
    pub container: String,
    pub tag: String,
    pub bazel_version: String,

    /// Storage bucket for the package tarball
    pub bucket: Option<String>,
}

impl CloudBuildTarget {
    /// Registry reference of the published image
    pub fn image(&self) -> String {
        format!("gcr.io/{}/{}:{}", self.project, self.container, self.tag)
    }
}

/// The version, build, retag, test and optional upload pipeline for one container
pub fn container_build_pipeline(
    entry: &ContainerTypeEntry,
    target: &CloudBuildTarget,
) -> Result<BuildPipeline, StepError> {
    let bazel = format!("{}:{}", BAZEL_BUILDER, target.bazel_version);
    let image = target.image();

    let mut steps = make_similar_steps(SimilarSteps {
        names: vec![bazel.clone()],
        args: vec![
            vec!["version".to_string()],
            vec!["run".to_string(), entry.label()],
        ],
        ids: vec![Some("version".to_string()), Some("build".to_string())],
        wait_for: vec![
            Some(vec![NO_PREDECESSORS.to_string()]),
            Some(vec!["version".to_string()]),
        ],
        ..Default::default()
    })?;

    steps.push(make_step(
        DOCKER_BUILDER,
        ["tag".to_string(), entry.local_image(), image.clone()],
        StepOptions::new().with_id("retag").with_wait_for(["build"]),
    )?);

    steps.push(make_step(
        bazel,
        ["test".to_string(), entry.test_label()],
        StepOptions::new().with_id("test").with_wait_for(["retag"]),
    )?);

    if let (Some(bucket), Some(tarball)) = (&target.bucket, &entry.tarball_name) {
        steps.push(make_step(
            GSUTIL_BUILDER,
            [
                "cp".to_string(),
                format!("bazel-bin/{}/{}", entry.package, tarball),
                format!("gs://{}/{}/{}", bucket, entry.package, tarball),
            ],
            StepOptions::new().with_id("upload").with_wait_for(["build"]),
        )?);
    }

    Ok(make_pipeline(
        steps,
        Some(CONTAINER_BUILD_TIMEOUT.to_string()),
        Some(vec![image]),
    ))
}

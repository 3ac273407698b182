//! Build step domain model

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wait-for entry meaning "no predecessors, start immediately"
pub const NO_PREDECESSORS: &str = "-";

/// Error types for step construction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error(
        "Invalid volume {0:?}: each volume must be given as exactly two strings, the name and the path"
    )]
    InvalidVolume(Vec<String>),

    #[error("Step {index} has no name")]
    MissingName { index: usize },

    #[error("{field} has {len} entries but there are only {steps} steps")]
    LengthMismatch {
        field: &'static str,
        len: usize,
        steps: usize,
    },
}

/// A volume mounted into a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub path: String,
}

impl Volume {
    /// Build a volume from a `[name, path]` pair
    pub fn from_pair(pair: &[String]) -> Result<Self, StepError> {
        match pair {
            [name, path] => Ok(Self {
                name: name.clone(),
                path: path.clone(),
            }),
            _ => Err(StepError::InvalidVolume(pair.to_vec())),
        }
    }
}

/// A single step in a build pipeline document
///
/// Optional fields that were never set are left out of the serialized
/// document entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    /// Image the step runs in
    pub name: String,

    /// Command and arguments
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Unique step identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Step IDs this step waits for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_env: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,

    /// Per-step timeout, e.g. `600s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Optional fields for a build step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOptions {
    pub env: Option<Vec<String>>,
    pub dir: Option<String>,
    pub id: Option<String>,
    pub wait_for: Option<Vec<String>>,
    pub entrypoint: Option<String>,
    pub secret_env: Option<Vec<String>>,

    /// Raw `[name, path]` pairs, validated by `make_step`
    pub volumes: Option<Vec<Vec<String>>>,
    pub timeout: Option<String>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_wait_for<I, S>(mut self, wait_for: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wait_for = Some(wait_for.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = Some(env.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn with_secret_env<I, S>(mut self, secret_env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secret_env = Some(secret_env.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<Vec<String>>) -> Self {
        self.volumes = Some(volumes);
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }
}

/// Build one step, validating its volumes
pub fn make_step<S: Into<String>>(
    name: impl Into<String>,
    args: impl IntoIterator<Item = S>,
    options: StepOptions,
) -> Result<BuildStep, StepError> {
    let volumes = options
        .volumes
        .map(|pairs| {
            pairs
                .iter()
                .map(|pair| Volume::from_pair(pair))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(BuildStep {
        name: name.into(),
        args: args.into_iter().map(Into::into).collect(),
        env: options.env,
        dir: options.dir,
        id: options.id,
        wait_for: options.wait_for,
        entrypoint: options.entrypoint,
        secret_env: options.secret_env,
        volumes,
        timeout: options.timeout,
    })
}

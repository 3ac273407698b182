//! JSON manifest describing the configs produced by a release

use crate::core::config::{Config, ConfigGroup};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One generated config variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub package: String,
    pub version: String,
    pub config_type: String,

    /// Config directory relative to the repository root
    pub config_dir: PathBuf,

    /// Container image the configs were generated with
    pub image: String,
    pub digest: String,
    pub autoconfig_target: String,
}

/// Everything a release generated for one Bazel version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub bazel_version: String,
    pub date: String,
    pub configs: Vec<ManifestEntry>,
}

impl ReleaseManifest {
    pub fn new(bazel_version: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            bazel_version: bazel_version.into(),
            date: date.into(),
            configs: Vec::new(),
        }
    }

    pub fn record(&mut self, git_root: &Path, group: &ConfigGroup, config: &Config, digest: &str) {
        let config_dir = config.config_dir();
        let config_dir = config_dir
            .strip_prefix(git_root)
            .map(Path::to_path_buf)
            .unwrap_or(config_dir);

        self.configs.push(ManifestEntry {
            package: group.package.clone(),
            version: group.version.clone(),
            config_type: config.config_type.to_string(),
            config_dir,
            image: group.image.clone(),
            digest: digest.to_string(),
            autoconfig_target: group.autoconfig_target(config),
        });
    }

    /// Load a manifest written by `write_to`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        if manifest.bazel_version.is_empty() {
            bail!("Manifest {} does not name a Bazel version", path.display());
        }
        Ok(manifest)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        info!("Wrote manifest for {} configs to {}", self.configs.len(), path.display());
        Ok(())
    }
}

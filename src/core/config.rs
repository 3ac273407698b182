//! Toolchain config groups
//!
//! A `ConfigGroup` describes one toolchain container (distro, config version,
//! image) and owns one `Config` per generated variant (`default`, `msan`).
//! All output paths are derived from the repository root, the group's
//! package and version, and the Bazel version the configs are generated for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Error types for config group construction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Input distro: {0} is not supported. Supported distros are {}", Distro::supported())]
    UnsupportedDistro(String),

    #[error(
        "Input config type: {0} is not supported. Supported types are {}",
        ConfigType::supported()
    )]
    UnsupportedConfigType(String),

    #[error("Failed to load config groups from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}

/// Base distro of a toolchain container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distro {
    #[serde(rename = "debian8")]
    Debian8,
    #[serde(rename = "ubuntu16_04")]
    Ubuntu1604,
}

impl Distro {
    pub const ALL: [Distro; 2] = [Distro::Debian8, Distro::Ubuntu1604];

    pub fn as_str(&self) -> &'static str {
        match self {
            Distro::Debian8 => "debian8",
            Distro::Ubuntu1604 => "ubuntu16_04",
        }
    }

    /// Extra cpp toolchain constraints for containers of this distro
    pub fn constraints(&self) -> Vec<String> {
        let constraint = match self {
            Distro::Debian8 => "//constraints:jessie",
            Distro::Ubuntu1604 => "//constraints:xenial",
        };
        vec![constraint.to_string()]
    }

    fn supported() -> String {
        Self::ALL.map(|d| d.as_str()).join(" ")
    }
}

impl FromStr for Distro {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedDistro(s.to_string()))
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant of generated configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Default,
    Msan,
}

impl ConfigType {
    pub const ALL: [ConfigType; 2] = [ConfigType::Default, ConfigType::Msan];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Default => "default",
            ConfigType::Msan => "msan",
        }
    }

    /// Extra cpp toolchain constraints for this variant
    pub fn constraints(&self) -> Vec<String> {
        match self {
            ConfigType::Default => vec![],
            ConfigType::Msan => vec!["//constraints/sanitizers:support_msan".to_string()],
        }
    }

    fn supported() -> String {
        Self::ALL.map(|t| t.as_str()).join(" ")
    }
}

impl FromStr for ConfigType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedConfigType(s.to_string()))
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the autoconfig target generating one set of configs
pub fn autoconfig_target_name(
    config_type: ConfigType,
    distro: Distro,
    config_version: &str,
    bazel_version: &str,
) -> String {
    format!(
        "{}-{}-clang-{}-bazel_{}-autoconfig",
        config_type, distro, config_version, bazel_version
    )
}

/// Unvalidated description of a config group, as written in YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroupSpec {
    pub distro: String,

    /// Version of the configs, e.g. `1.0`
    pub version: String,

    /// Registry entry of the container, e.g. `gcr.io/cloud-marketplace/google/clang-ubuntu`
    pub image: String,

    /// Bazel package the configs are generated into
    pub package: String,

    #[serde(default = "default_config_types")]
    pub config_types: Vec<String>,

    /// Platform target of the matching RBE container, e.g. `rbe_ubuntu1604`
    pub platform_target: String,
}

fn default_config_types() -> Vec<String> {
    ConfigType::ALL.iter().map(|t| t.as_str().to_string()).collect()
}

#[derive(Debug, Deserialize)]
struct ConfigGroupsFile {
    groups: Vec<ConfigGroupSpec>,
}

impl ConfigGroupSpec {
    /// The groups released by default
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                distro: "debian8".to_string(),
                version: "0.3.0".to_string(),
                image: "gcr.io/cloud-marketplace/google/clang-debian8".to_string(),
                package: "configs/debian8_clang".to_string(),
                config_types: default_config_types(),
                platform_target: "rbe_debian8".to_string(),
            },
            Self {
                distro: "ubuntu16_04".to_string(),
                version: "1.0".to_string(),
                image: "gcr.io/cloud-marketplace/google/clang-ubuntu".to_string(),
                package: "configs/ubuntu16_04_clang".to_string(),
                config_types: default_config_types(),
                platform_target: "rbe_ubuntu1604".to_string(),
            },
        ]
    }

    /// Load group definitions from a YAML file with a top-level `groups` list
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, ConfigError> {
        let path = path.as_ref();
        let load_error = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let file: ConfigGroupsFile =
            serde_yaml::from_str(&content).map_err(|e| load_error(e.to_string()))?;
        Ok(file.groups)
    }
}

/// Configs of a single type generated with a group's container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub config_type: ConfigType,

    /// Extra cpp toolchain constraints for this variant
    pub constraints: Vec<String>,

    /// The group's `bazel_{version}` directory
    root: PathBuf,
}

impl Config {
    fn new(root: PathBuf, config_type: &str) -> Result<Self, ConfigError> {
        let config_type: ConfigType = config_type.parse()?;
        Ok(Self {
            config_type,
            constraints: config_type.constraints(),
            root,
        })
    }

    /// Directory holding the extracted cc toolchain configs
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(self.config_type.as_str())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.config_dir().join("METADATA")
    }
}

/// A group of configs generated using the same container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigGroup {
    pub distro: Distro,
    pub version: String,
    pub image: String,
    pub package: String,
    pub platform_target: String,

    /// Constraints shared by every variant of this group
    pub constraints: Vec<String>,

    pub configs: Vec<Config>,

    git_root: PathBuf,
    bazel_version: String,
}

impl ConfigGroup {
    /// Validate a group definition and resolve it against a repository root
    pub fn new(spec: &ConfigGroupSpec, git_root: &Path, bazel_version: &str) -> Result<Self, ConfigError> {
        let distro: Distro = spec.distro.parse()?;
        let base_dir = git_root
            .join(&spec.package)
            .join(&spec.version)
            .join(format!("bazel_{}", bazel_version));

        let configs = spec
            .config_types
            .iter()
            .map(|t| Config::new(base_dir.clone(), t))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            distro,
            version: spec.version.clone(),
            image: spec.image.clone(),
            package: spec.package.clone(),
            platform_target: spec.platform_target.clone(),
            constraints: distro.constraints(),
            configs,
            git_root: git_root.to_path_buf(),
            bazel_version: bazel_version.to_string(),
        })
    }

    /// Build every group from a list of definitions
    pub fn from_specs(
        specs: &[ConfigGroupSpec],
        git_root: &Path,
        bazel_version: &str,
    ) -> Result<Vec<Self>, ConfigError> {
        specs
            .iter()
            .map(|spec| Self::new(spec, git_root, bazel_version))
            .collect()
    }

    pub fn bazel_version(&self) -> &str {
        &self.bazel_version
    }

    pub fn config_types(&self) -> Vec<ConfigType> {
        self.configs.iter().map(|c| c.config_type).collect()
    }

    /// BUILD file holding the autoconfig targets
    pub fn target_build_path(&self) -> PathBuf {
        self.git_root.join(&self.package).join("BUILD")
    }

    /// BUILD file with aliases to the latest toolchain targets
    pub fn latest_aliases_build_path(&self) -> PathBuf {
        self.git_root.join(&self.package).join("latest").join("BUILD")
    }

    pub fn toolchain_bazelrc_path(&self) -> PathBuf {
        self.git_root
            .join(&self.package)
            .join(&self.version)
            .join("toolchain.bazelrc")
    }

    /// BUILD file with the platform definition
    pub fn platform_build_path(&self) -> PathBuf {
        self.git_root.join(&self.package).join(&self.version).join("BUILD")
    }

    /// The java runtime lives next to the platform definition
    pub fn java_runtime_build_path(&self) -> PathBuf {
        self.platform_build_path()
    }

    /// BUILD file with the cpp toolchain definitions
    pub fn cpp_build_path(&self) -> PathBuf {
        self.config_base_dir().join("cpp").join("BUILD")
    }

    /// `{package}/{version}/bazel_{bazel_version}` under the repository root
    pub fn config_base_dir(&self) -> PathBuf {
        self.git_root
            .join(&self.package)
            .join(&self.version)
            .join(format!("bazel_{}", self.bazel_version))
    }

    /// Group constraints followed by the variant's, without duplicates
    pub fn merged_constraints(&self, config: &Config) -> Vec<String> {
        let mut merged = self.constraints.clone();
        for constraint in &config.constraints {
            if !merged.contains(constraint) {
                merged.push(constraint.clone());
            }
        }
        merged
    }

    pub fn autoconfig_target(&self, config: &Config) -> String {
        autoconfig_target_name(config.config_type, self.distro, &self.version, &self.bazel_version)
    }
}

//! Container type registry
//!
//! Maps a container type key (e.g. `rbe-debian8`) to the Bazel package,
//! target and package tarball used to build it. The key sets of all maps are
//! checked for equality whenever a registry is constructed, so a
//! misconfigured registry never reaches the build stage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bazel version baked into the built-in target names
pub const LATEST_BAZEL_VERSION: &str = "0.15.0";

/// Container types the built-in registry knows how to build
pub const SUPPORTED_TYPES: [&str; 5] = [
    "rbe-debian8",
    "rbe-debian9",
    "rbe-ubuntu16_04",
    "ubuntu16_04-bazel",
    "ubuntu16_04-bazel-docker",
];

/// Error types for registry construction and lookup
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Container types are out of sync: {0}")]
    Configuration(String),

    #[error("Unknown container type '{0}'")]
    UnknownType(String),

    #[error("Failed to load type map from {}: {reason}", path.display())]
    MapLoad { path: PathBuf, reason: String },
}

/// Build coordinates for one container type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerTypeEntry {
    pub type_key: String,

    /// Slash-delimited Bazel package, e.g. `container/debian8/builders/rbe-debian8`
    pub package: String,

    /// Target name inside the package
    pub target: String,

    /// Name of the package tarball, only resolved when a bucket is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball_name: Option<String>,
}

impl ContainerTypeEntry {
    /// Bazel label of the image target
    pub fn label(&self) -> String {
        format!("//{}:{}", self.package, self.target)
    }

    /// Bazel label of the image's test target
    pub fn test_label(&self) -> String {
        format!("//{}:{}-test", self.package, self.target)
    }

    /// Name rules_docker gives the image when loading it into the daemon
    pub fn local_image(&self) -> String {
        format!("bazel/{}:{}", self.package, self.target)
    }
}

/// The three type maps, as written in an override file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMaps {
    #[serde(rename = "type_package_map")]
    pub packages: BTreeMap<String, String>,

    #[serde(rename = "type_target_map")]
    pub targets: BTreeMap<String, String>,

    #[serde(rename = "type_tarball_map", default, skip_serializing_if = "Option::is_none")]
    pub tarballs: Option<BTreeMap<String, String>>,
}

impl TypeMaps {
    /// The maps compiled into the binary
    pub fn builtin() -> Self {
        let packages = [
            ("rbe-debian8", "container/debian8/builders/rbe-debian8"),
            ("rbe-debian9", "container/experimental/rbe-debian9"),
            ("rbe-ubuntu16_04", "container/ubuntu16_04/builders/rbe-ubuntu16_04"),
            ("ubuntu16_04-bazel", "container/ubuntu16_04/builders/bazel"),
            ("ubuntu16_04-bazel-docker", "container/ubuntu16_04/builders/bazel"),
        ];

        let targets = [
            ("rbe-debian8", "toolchain".to_string()),
            ("rbe-debian9", "toolchain".to_string()),
            ("rbe-ubuntu16_04", "toolchain".to_string()),
            ("ubuntu16_04-bazel", format!("bazel_{}", LATEST_BAZEL_VERSION)),
            (
                "ubuntu16_04-bazel-docker",
                format!("bazel_{}_docker", LATEST_BAZEL_VERSION),
            ),
        ];

        let tarballs = [
            ("rbe-debian8", "toolchain-packages.tar".to_string()),
            ("rbe-debian9", "toolchain-packages.tar".to_string()),
            ("rbe-ubuntu16_04", "toolchain-packages.tar".to_string()),
            (
                "ubuntu16_04-bazel",
                format!("bazel_{}-packages.tar", LATEST_BAZEL_VERSION),
            ),
            (
                "ubuntu16_04-bazel-docker",
                format!("bazel_{}_docker-packages.tar", LATEST_BAZEL_VERSION),
            ),
        ];

        Self {
            packages: packages
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            targets: targets.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            tarballs: Some(tarballs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
        }
    }
}

/// Check that every map covers exactly the supported types
///
/// The tarball map is only checked when present.
pub fn validate(
    packages: &BTreeMap<String, String>,
    targets: &BTreeMap<String, String>,
    tarballs: Option<&BTreeMap<String, String>>,
    supported: &BTreeSet<String>,
) -> Result<(), RegistryError> {
    let mut problems = Vec::new();

    let mut check = |map_name: &str, keys: BTreeSet<&String>| {
        let missing: Vec<&str> = supported
            .iter()
            .filter(|t| !keys.contains(t))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = keys
            .iter()
            .filter(|k| !supported.contains(k.as_str()))
            .map(|k| k.as_str())
            .collect();

        if !missing.is_empty() {
            problems.push(format!("{} is missing [{}]", map_name, missing.join(", ")));
        }
        if !extra.is_empty() {
            problems.push(format!("{} has unsupported [{}]", map_name, extra.join(", ")));
        }
    };

    check("type_package_map", packages.keys().collect());
    check("type_target_map", targets.keys().collect());
    if let Some(tarballs) = tarballs {
        check("type_tarball_map", tarballs.keys().collect());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Configuration(problems.join("; ")))
    }
}

/// Load replacement maps from a YAML document
///
/// `type_tarball_map` is only required when `require_tarballs` is set.
pub fn load_override<P: AsRef<Path>>(path: P, require_tarballs: bool) -> Result<TypeMaps, RegistryError> {
    let path = path.as_ref();
    let map_load = |reason: String| RegistryError::MapLoad {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| map_load(e.to_string()))?;
    let maps: TypeMaps = serde_yaml::from_str(&content).map_err(|e| map_load(e.to_string()))?;

    if require_tarballs && maps.tarballs.is_none() {
        return Err(map_load(
            "missing type_tarball_map (required when a bucket is configured)".to_string(),
        ));
    }

    Ok(maps)
}

/// A validated set of type maps
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    maps: TypeMaps,
    supported: BTreeSet<String>,
}

impl TypeRegistry {
    /// Create a registry, failing if the maps disagree with `supported`
    pub fn new(maps: TypeMaps, supported: BTreeSet<String>) -> Result<Self, RegistryError> {
        validate(
            &maps.packages,
            &maps.targets,
            maps.tarballs.as_ref(),
            &supported,
        )?;
        Ok(Self { maps, supported })
    }

    /// The registry compiled into the binary
    pub fn builtin() -> Result<Self, RegistryError> {
        let supported = SUPPORTED_TYPES.iter().map(|t| t.to_string()).collect();
        Self::new(TypeMaps::builtin(), supported)
    }

    /// A registry built entirely from an override file
    ///
    /// The override replaces the built-in maps; its package map defines the
    /// supported types.
    pub fn from_override<P: AsRef<Path>>(path: P, require_tarballs: bool) -> Result<Self, RegistryError> {
        let maps = load_override(path, require_tarballs)?;
        let supported = maps.packages.keys().cloned().collect();
        Self::new(maps, supported)
    }

    /// Supported type keys, sorted
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.supported.iter().map(String::as_str)
    }

    pub fn maps(&self) -> &TypeMaps {
        &self.maps
    }

    /// Look up the build coordinates for a type key
    pub fn resolve(&self, type_key: &str, include_tarball: bool) -> Result<ContainerTypeEntry, RegistryError> {
        let unknown = || RegistryError::UnknownType(type_key.to_string());

        let package = self.maps.packages.get(type_key).ok_or_else(unknown)?;
        let target = self.maps.targets.get(type_key).ok_or_else(unknown)?;
        let tarball_name = if include_tarball {
            let tarballs = self.maps.tarballs.as_ref().ok_or_else(unknown)?;
            Some(tarballs.get(type_key).ok_or_else(unknown)?.clone())
        } else {
            None
        };

        Ok(ContainerTypeEntry {
            type_key: type_key.to_string(),
            package: package.clone(),
            target: target.clone(),
            tarball_name,
        })
    }

    /// Every entry in the registry
    pub fn entries(&self, include_tarball: bool) -> Result<Vec<ContainerTypeEntry>, RegistryError> {
        self.supported
            .iter()
            .map(|t| self.resolve(t, include_tarball))
            .collect()
    }
}

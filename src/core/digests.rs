//! Container digests and clang revision lookup
//!
//! The digests of the toolchain containers are kept in the repository as a
//! Starlark dict literal (`rules/toolchain_containers.bzl`). The file is read
//! as data: `"key": "sha256:..."` pairs are collected, nothing is evaluated.
//! A plain YAML mapping is accepted as well.

use crate::core::config::Distro;
use crate::core::pattern::compiled;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error types for digest and revision lookup
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("No digest for container '{0}'")]
    MissingDigest(String),

    #[error("No CLANG_REVISION assignment in {}", .0.display())]
    MissingRevision(PathBuf),

    #[error("Invalid lookup pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn digest_entry_regex() -> Result<&'static Regex, regex::Error> {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    compiled(&ENTRY, r#""([\w.\-]+)"\s*:\s*"(sha256:[0-9a-fA-F]+)""#)
}

fn clang_revision_regex() -> Result<&'static Regex, regex::Error> {
    static REVISION: OnceLock<Regex> = OnceLock::new();
    compiled(&REVISION, r#"(?m)^\s*CLANG_REVISION\s*=\s*["']([^"']+)["']"#)
}

fn read(path: &Path) -> Result<String, DigestError> {
    std::fs::read_to_string(path).map_err(|source| DigestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Image digests keyed by container name, e.g. `ubuntu16_04_clang`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDigests {
    digests: BTreeMap<String, String>,
}

impl ContainerDigests {
    pub fn new(digests: BTreeMap<String, String>) -> Self {
        Self { digests }
    }

    /// Load digests from a `.bzl` dict literal or a YAML mapping
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DigestError> {
        let path = path.as_ref();
        let content = read(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            let digests = serde_yaml::from_str(&content).map_err(|e| DigestError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            return Ok(Self::new(digests));
        }

        let digests: BTreeMap<String, String> = digest_entry_regex()?
            .captures_iter(&content)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect();

        if digests.is_empty() {
            return Err(DigestError::Parse {
                path: path.to_path_buf(),
                reason: "no \"name\": \"sha256:...\" entries found".to_string(),
            });
        }

        Ok(Self::new(digests))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.digests.get(key).map(String::as_str)
    }

    /// Digest of the clang container for a distro
    pub fn digest_for(&self, distro: Distro) -> Result<&str, DigestError> {
        let key = format!("{}_clang", distro);
        self.get(&key).ok_or(DigestError::MissingDigest(key))
    }
}

/// Read the `CLANG_REVISION` assignment from a `.bzl` file
pub fn read_clang_revision<P: AsRef<Path>>(path: P) -> Result<String, DigestError> {
    let path = path.as_ref();
    let content = read(path)?;
    clang_revision_regex()?
        .captures(&content)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| DigestError::MissingRevision(path.to_path_buf()))
}

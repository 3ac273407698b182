//! Release context - repository root and the paths derived from it

use crate::runner::{CommandRunner, Invocation, RunnerError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repository layout used by every release workflow
///
/// Built once at startup and passed by reference; nothing else resolves
/// repository paths on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseContext {
    git_root: PathBuf,
}

impl ReleaseContext {
    pub fn new<P: AsRef<Path>>(git_root: P) -> Self {
        Self {
            git_root: git_root.as_ref().to_path_buf(),
        }
    }

    /// Locate the repository root containing the current directory
    pub async fn discover<R: CommandRunner + ?Sized>(runner: &R) -> Result<Self, RunnerError> {
        let root = runner
            .run(&Invocation::new("git", ["rev-parse", "--show-toplevel"]))
            .await?;
        debug!("Repository root: {}", root);
        Ok(Self::new(root))
    }

    pub fn git_root(&self) -> &Path {
        &self.git_root
    }

    /// Directory holding the shared release templates
    pub fn work_dir(&self) -> PathBuf {
        self.git_root.join("release")
    }

    /// Directory holding the cc config templates
    pub fn cc_template_dir(&self) -> PathBuf {
        self.work_dir().join("cc")
    }

    /// Scratch space for a single run
    pub fn tmp_dir(&self) -> PathBuf {
        self.work_dir().join("tmp")
    }

    pub fn bazelrc_dir(&self) -> PathBuf {
        self.git_root.join("bazelrc")
    }

    pub fn latest_bazelrc_link(&self) -> PathBuf {
        self.bazelrc_dir().join("latest.bazelrc")
    }

    pub fn versioned_bazelrc(&self, bazel_version: &str) -> PathBuf {
        self.bazelrc_dir().join(format!("bazel-{}.bazelrc", bazel_version))
    }

    /// Digest map of the toolchain containers
    pub fn sha_map_file(&self) -> PathBuf {
        self.git_root.join("rules").join("toolchain_containers.bzl")
    }

    pub fn clang_revision_file(&self) -> PathBuf {
        self.git_root.join("third_party").join("clang").join("revision.bzl")
    }

    pub fn third_party_dir(&self) -> PathBuf {
        self.git_root.join("third_party")
    }

    /// Shared template, e.g. `license.tpl`
    pub fn template(&self, name: &str) -> PathBuf {
        self.work_dir().join(name)
    }

    /// cc config template, e.g. `msan.tpl`
    pub fn cc_template(&self, name: &str) -> PathBuf {
        self.cc_template_dir().join(name)
    }
}

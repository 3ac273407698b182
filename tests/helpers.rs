//! Test utilities for toolchain-release

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use toolchain_release::core::config::ConfigGroup;
use toolchain_release::execution::extract::{outputs_tarball, CONFIG_FILES};
use toolchain_release::{CommandRunner, Invocation, ReleaseContext, RunnerError};

pub const DEBIAN8_SHA: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
pub const UBUNTU_SHA: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";
pub const CLANG_REVISION: &str = "r337145";

/// Runner that records every invocation instead of running it
///
/// Clones share their records, so a test can keep one handle while the
/// workflow owns another.
#[derive(Clone, Default)]
pub struct MockRunner {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    outputs: Arc<Mutex<HashMap<String, String>>>,
    failures: Arc<Mutex<Vec<String>>>,
    config_files: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `stdout` for commands whose command line starts with `prefix`
    pub fn with_output(self, prefix: &str, stdout: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(prefix.to_string(), stdout.to_string());
        self
    }

    /// Fail commands whose command line starts with `prefix`
    pub fn fail_on(self, prefix: &str) -> Self {
        self.failures.lock().unwrap().push(prefix.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Command lines in the order they were run
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations().iter().map(|i| i.to_string()).collect()
    }

    /// Contents of every file passed as `--config=<file>`, read when the command ran
    pub fn config_files(&self) -> Vec<String> {
        self.config_files.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, RunnerError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let line = invocation.to_string();

        for arg in &invocation.args {
            if let Some(path) = arg.strip_prefix("--config=") {
                let content = std::fs::read_to_string(path).unwrap_or_default();
                self.config_files.lock().unwrap().push(content);
            }
        }

        if self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
        {
            return Err(RunnerError::Failed {
                command: line,
                code: 1,
                stderr: "scripted failure".to_string(),
            });
        }

        let outputs = self.outputs.lock().unwrap();
        Ok(outputs
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default())
    }
}

/// A throwaway repository with release templates and digest files
pub struct TestRepo {
    pub dir: TempDir,
    pub context: ReleaseContext,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let context = ReleaseContext::new(dir.path());
        let repo = Self { dir, context };
        repo.write_templates();
        repo.write_digests();
        repo
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative))
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative, e))
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn write_templates(&self) {
        self.write("release/license.tpl", "# Copyright 2018 The Bazel Authors.\n");
        self.write(
            "release/bazelrc.tpl",
            "\n# Sample bazelrc for Bazel $BAZEL_VERSION\nbuild:remote --host_javabase=@bazel_toolchains//configs/ubuntu16_04_clang/1.0:jdk8\n",
        );
        self.write(
            "release/toolchain.bazelrc.tpl",
            "build --crosstool_top=//$PACKAGE/$CONFIG_VERSION/bazel_$BAZEL_VERSION/default:toolchain\nbuild --extra_execution_platforms=//$PACKAGE/$CONFIG_VERSION:$PLATFORM\n",
        );

        let autoconfig = |config_type: &str| {
            format!(
                r#"
# Created on $DATE
docker_toolchain_autoconfig(
    name = "{t}-$DISTRO-clang-$CONFIG_VERSION-bazel_$BAZEL_VERSION-autoconfig",
    base = "$NAME@$SHA",
    bazel_version = "$BAZEL_VERSION",
    clang_revision = "$CLANG_REVISION",
)
"#,
                t = config_type
            )
        };
        self.write("release/cc/default.tpl", &autoconfig("default"));
        self.write("release/cc/msan.tpl", &autoconfig("msan"));
        self.write(
            "release/cc/cpp.tpl",
            r#"
toolchain(
    name = "cc-toolchain-clang-x86_64-$TYPE",
    exec_compatible_with = [
        $EXTRA_CONSTRAINTS
    ],
    toolchain = "//$PACKAGE/$CONFIG_VERSION/bazel_$BAZEL_VERSION/$TYPE:cc-compiler-k8",
)
"#,
        );
        self.write(
            "release/cc/latest.tpl",
            r#"
[alias(
    name = "toolchain_" + config_type,
    actual = "//$PACKAGE/$CONFIG_VERSION/bazel_$BAZEL_VERSION/" + config_type + ":toolchain",
) for config_type in [$CONFIG_TYPES]]

alias(
    name = "platform",
    actual = "//$PACKAGE/$CONFIG_VERSION:$PLATFORM",
)

constraints = [
    $EXTRA_CONSTRAINTS
]
"#,
        );
    }

    fn write_digests(&self) {
        self.write(
            "rules/toolchain_containers.bzl",
            &format!(
                "def toolchain_container_sha256s():\n    return {{\n        \"debian8_clang\": \"{}\",\n        \"ubuntu16_04_clang\": \"{}\",\n    }}\n",
                DEBIAN8_SHA, UBUNTU_SHA
            ),
        );
        self.write(
            "third_party/clang/revision.bzl",
            &format!("CLANG_REVISION = \"{}\"\n", CLANG_REVISION),
        );
    }

    /// Place autoconfig output tarballs where `bazel build` would leave them
    pub fn add_autoconfig_outputs(&self, group: &ConfigGroup) {
        for config in &group.configs {
            let target = group.autoconfig_target(config);
            let path = outputs_tarball(self.root(), &group.package, &target);
            let members: Vec<String> = CONFIG_FILES
                .iter()
                .map(|name| format!("./local_config_cc/{}", name))
                .chain(std::iter::once("./local_config_cc/WORKSPACE".to_string()))
                .collect();
            write_tarball(&path, &members, &target);
        }
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a tar archive whose members contain `# <tag> <member>`
pub fn write_tarball(path: &Path, members: &[String], tag: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for member in members {
        let data = format!("# {} {}\n", tag, member);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, member, data.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_records_and_scripts() {
        let runner = MockRunner::new()
            .with_output("git rev-parse", "/repo")
            .fail_on("bazel test");

        let out = runner
            .run(&Invocation::new("git", ["rev-parse", "--show-toplevel"]))
            .await
            .unwrap();
        assert_eq!(out, "/repo");

        let err = runner
            .run(&Invocation::new("bazel", ["test", "//pkg:t-test"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Failed { code: 1, .. }));

        assert_eq!(
            runner.command_lines(),
            vec!["git rev-parse --show-toplevel", "bazel test //pkg:t-test"]
        );
    }

    #[test]
    fn test_repo_layout() {
        let repo = TestRepo::new();
        assert!(repo.context.cc_template("msan.tpl").is_file());
        assert!(repo.context.sha_map_file().is_file());
        assert!(repo.context.clang_revision_file().is_file());
    }
}

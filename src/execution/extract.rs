//! Generate and extract cc toolchain configs for one config variant

use crate::core::config::{Config, ConfigGroup};
use crate::core::ReleaseContext;
use crate::execution::workdir::ScratchDir;
use crate::runner::{CommandRunner, Invocation};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Files taken from the autoconfig output
pub const CONFIG_FILES: [&str; 4] = [
    "cc_toolchain_config.bzl",
    "BUILD",
    "cc_wrapper.sh",
    "dummy_toolchain.bzl",
];

/// Directory inside the autoconfig tarball holding the configs
pub const CONFIG_ARCHIVE_DIR: &str = "local_config_cc";

/// Bazel output directory of autoconfig targets
const BAZEL_OUT_BIN: &str = "bazel-out/k8-fastbuild/bin";

/// Location of the tarball produced by an autoconfig target
pub fn outputs_tarball(git_root: &Path, package: &str, target: &str) -> PathBuf {
    git_root
        .join(BAZEL_OUT_BIN)
        .join(package)
        .join(format!("{}_outputs.tar", target))
}

/// Returns the config file name if `path` is `local_config_cc/<name>`
fn config_member(path: &Path) -> Option<String> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    match parts.as_slice() {
        [dir, name] if *dir == CONFIG_ARCHIVE_DIR && CONFIG_FILES.contains(name) => {
            Some(name.to_string())
        }
        _ => None,
    }
}

/// Unpack the config files from `tarball` into `dest`, flattening paths
pub fn extract_config_files(tarball: &Path, dest: &Path) -> Result<()> {
    let file = File::open(tarball).with_context(|| format!("Failed to open {}", tarball.display()))?;
    let mut archive = tar::Archive::new(file);
    let mut found = BTreeSet::new();

    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read {}", tarball.display()))?
    {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(name) = config_member(&path) else {
            continue;
        };
        entry
            .unpack(dest.join(&name))
            .with_context(|| format!("Failed to extract {}", path.display()))?;
        debug!("Extracted {} to {}", path.display(), dest.display());
        found.insert(name);
    }

    let missing: Vec<&str> = CONFIG_FILES
        .iter()
        .copied()
        .filter(|name| !found.contains(*name))
        .collect();
    if !missing.is_empty() {
        bail!(
            "{} is missing {} under {}/",
            tarball.display(),
            missing.join(", "),
            CONFIG_ARCHIVE_DIR
        );
    }
    Ok(())
}

/// Runs the autoconfig target for a config and extracts its outputs
pub struct ConfigExtractor<'a, R> {
    runner: &'a R,
    context: &'a ReleaseContext,
    buildifier: Option<&'a Path>,
}

impl<'a, R: CommandRunner> ConfigExtractor<'a, R> {
    pub fn new(runner: &'a R, context: &'a ReleaseContext, buildifier: Option<&'a Path>) -> Self {
        Self {
            runner,
            context,
            buildifier,
        }
    }

    pub async fn extract(&self, group: &ConfigGroup, config: &Config, scratch: &ScratchDir) -> Result<()> {
        let config_dir = config.config_dir();
        if config_dir.exists() {
            std::fs::remove_dir_all(&config_dir)
                .with_context(|| format!("Failed to remove {}", config_dir.display()))?;
        }
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;

        let target = group.autoconfig_target(config);
        let label = format!("//{}:{}", group.package, target);
        info!("Generating configs with {}", label);
        self.runner
            .run(
                &Invocation::new("bazel", ["build".to_string(), label.clone()])
                    .in_dir(self.context.git_root())
                    .streaming(),
            )
            .await
            .with_context(|| format!("Failed to build {}", label))?;

        let built = outputs_tarball(self.context.git_root(), &group.package, &target);
        let copied = scratch.join(format!("{}_outputs.tar", target));
        std::fs::copy(&built, &copied)
            .with_context(|| format!("Failed to copy {}", built.display()))?;

        extract_config_files(&copied, &config_dir)?;
        self.format_files(&config_dir).await
    }

    async fn format_files(&self, config_dir: &Path) -> Result<()> {
        let Some(buildifier) = self.buildifier else {
            debug!("No buildifier configured, leaving {} unformatted", config_dir.display());
            return Ok(());
        };

        for name in CONFIG_FILES.iter().filter(|n| **n == "BUILD" || n.ends_with(".bzl")) {
            let path = config_dir.join(name);
            self.runner
                .run(&Invocation::new(
                    buildifier.display().to_string(),
                    ["--lint=fix".to_string(), path.display().to_string()],
                ))
                .await
                .with_context(|| format!("buildifier failed on {}", path.display()))?;
        }
        Ok(())
    }
}

//! Files written by a config release
//!
//! Everything here is plain template rendering and file IO; the commands a
//! release runs live in `config_release` and `extract`.

use crate::core::config::{Config, ConfigGroup};
use crate::core::template::{quoted_csv, quoted_lines, Template};
use crate::core::ReleaseContext;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// License and visibility stanza required at the top of generated BUILD files
pub const BUILD_EXTRA_LICENCE: &str = r#"
licenses(["notice"])  # Apache 2.0

package(default_visibility = ["//visibility:public"])
"#;

fn render(path: &Path, values: &HashMap<&str, String>) -> Result<String> {
    let rendered = Template::from_file(path)?
        .substitute(values)
        .with_context(|| format!("Failed to render {}", path.display()))?;
    Ok(rendered)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Writes the generated release files for one Bazel version
pub struct ArtifactWriter<'a> {
    context: &'a ReleaseContext,
    bazel_version: &'a str,
    date: &'a str,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(context: &'a ReleaseContext, bazel_version: &'a str, date: &'a str) -> Self {
        Self {
            context,
            bazel_version,
            date,
        }
    }

    /// Append the autoconfig target for `config` unless the BUILD file already has it
    ///
    /// Returns whether a target was added.
    pub fn create_target_if_missing(
        &self,
        group: &ConfigGroup,
        config: &Config,
        sha: &str,
        clang_revision: &str,
    ) -> Result<bool> {
        let build_path = group.target_build_path();
        let target = group.autoconfig_target(config);

        let existing = if build_path.exists() {
            read(&build_path)?
        } else {
            String::new()
        };
        if existing.contains(&target) {
            debug!("{} already defines {}", build_path.display(), target);
            return Ok(false);
        }

        let template = self
            .context
            .cc_template(&format!("{}.tpl", config.config_type));
        let values = HashMap::from([
            ("DATE", self.date.to_string()),
            ("DISTRO", group.distro.to_string()),
            ("CONFIG_VERSION", group.version.clone()),
            ("BAZEL_VERSION", self.bazel_version.to_string()),
            ("NAME", group.image.clone()),
            ("SHA", sha.to_string()),
            ("CLANG_REVISION", clang_revision.to_string()),
        ]);
        let rendered = render(&template, &values)?;

        if let Some(parent) = build_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&build_path)
            .with_context(|| format!("Failed to open {}", build_path.display()))?;
        file.write_all(rendered.as_bytes())
            .with_context(|| format!("Failed to append to {}", build_path.display()))?;

        info!("Added target {} to {}", target, build_path.display());
        Ok(true)
    }

    /// Record the image the configs were generated with
    pub fn write_metadata(&self, group: &ConfigGroup, config: &Config, sha: &str) -> Result<PathBuf> {
        let path = config.metadata_path();
        write(&path, &format!("{}@{}\n", group.image, sha))?;
        Ok(path)
    }

    /// Regenerate the cpp toolchain definitions of a group
    pub fn write_toolchain_definition(&self, group: &ConfigGroup) -> Result<PathBuf> {
        let build_path = group.cpp_build_path();
        if let Some(cpp_dir) = build_path.parent() {
            if cpp_dir.is_dir() {
                debug!("Replacing existing {}", cpp_dir.display());
                std::fs::remove_dir_all(cpp_dir)
                    .with_context(|| format!("Failed to remove {}", cpp_dir.display()))?;
            }
        }

        let mut content = read(&self.context.template("license.tpl"))?;
        content.push_str(BUILD_EXTRA_LICENCE);

        let template = self.context.cc_template("cpp.tpl");
        for config in &group.configs {
            let values = HashMap::from([
                ("TYPE", config.config_type.to_string()),
                ("CONFIG_VERSION", group.version.clone()),
                ("BAZEL_VERSION", self.bazel_version.to_string()),
                ("PACKAGE", group.package.clone()),
                ("EXTRA_CONSTRAINTS", quoted_lines(&group.merged_constraints(config))),
            ]);
            content.push_str(&render(&template, &values)?);
        }

        write(&build_path, &content)?;
        Ok(build_path)
    }

    pub fn write_toolchain_bazelrc(&self, group: &ConfigGroup) -> Result<PathBuf> {
        let path = group.toolchain_bazelrc_path();
        let values = HashMap::from([
            ("CONFIG_VERSION", group.version.clone()),
            ("BAZEL_VERSION", self.bazel_version.to_string()),
            ("PACKAGE", group.package.clone()),
            ("PLATFORM", group.platform_target.clone()),
        ]);
        let rendered = render(&self.context.template("toolchain.bazelrc.tpl"), &values)?;
        write(&path, &rendered)?;
        Ok(path)
    }

    /// Aliases pointing at the toolchain targets of this release
    pub fn write_latest_aliases(&self, group: &ConfigGroup) -> Result<PathBuf> {
        let path = group.latest_aliases_build_path();
        let config_types: Vec<String> = group.config_types().iter().map(|t| t.to_string()).collect();
        let values = HashMap::from([
            ("CONFIG_VERSION", group.version.clone()),
            ("BAZEL_VERSION", self.bazel_version.to_string()),
            ("PACKAGE", group.package.clone()),
            ("PLATFORM", group.platform_target.clone()),
            ("CONFIG_TYPES", quoted_csv(&config_types)),
            ("EXTRA_CONSTRAINTS", quoted_lines(&group.constraints)),
        ]);
        let rendered = render(&self.context.cc_template("latest.tpl"), &values)?;
        write(&path, &rendered)?;
        Ok(path)
    }

    /// Write `bazel-{version}.bazelrc` and point `latest.bazelrc` at it
    pub fn write_bazelrc(&self) -> Result<PathBuf> {
        let path = self.context.versioned_bazelrc(self.bazel_version);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }

        let mut content = read(&self.context.template("license.tpl"))?;
        let values = HashMap::from([("BAZEL_VERSION", self.bazel_version.to_string())]);
        content.push_str(&render(&self.context.template("bazelrc.tpl"), &values)?);
        write(&path, &content)?;

        update_link(&self.context.latest_bazelrc_link(), &path)?;
        Ok(path)
    }
}

/// Re-point `link` at `target`, which lives in the same directory
fn update_link(link: &Path, target: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link).with_context(|| format!("Failed to remove {}", link.display()))?;
    }

    let file_name = target
        .file_name()
        .with_context(|| format!("{} has no file name", target.display()))?;

    #[cfg(unix)]
    std::os::unix::fs::symlink(file_name, link)
        .with_context(|| format!("Failed to link {}", link.display()))?;

    #[cfg(not(unix))]
    {
        let _ = file_name;
        std::fs::copy(target, link).with_context(|| format!("Failed to copy to {}", link.display()))?;
    }

    info!("{} now points at {}", link.display(), target.display());
    Ok(())
}

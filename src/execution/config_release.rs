//! Config release workflow - generates toolchain configs for every group

use crate::core::config::ConfigGroup;
use crate::core::digests::{read_clang_revision, ContainerDigests};
use crate::core::ReleaseContext;
use crate::execution::artifacts::ArtifactWriter;
use crate::execution::extract::ConfigExtractor;
use crate::execution::manifest::ReleaseManifest;
use crate::execution::workdir::ScratchDir;
use crate::runner::{CommandRunner, Invocation};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Events that can occur during a config release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseEvent {
    ReleaseStarted {
        bazel_version: String,
        configs: usize,
    },
    TargetCreated {
        package: String,
        target: String,
    },
    ConfigsExtracted {
        package: String,
        config_type: String,
    },
    GroupCompleted {
        package: String,
        version: String,
    },
    BazelrcUpdated {
        path: PathBuf,
    },
    ReleaseCompleted {
        bazel_version: String,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ReleaseEvent) + Send + Sync>;

/// Release date as `YYYY.M.D`, without zero padding
pub fn release_date(date: NaiveDate) -> String {
    date.format("%Y.%-m.%-d").to_string()
}

/// Generates and records the configs of every group for one Bazel version
pub struct ConfigRelease<'a, R> {
    runner: &'a R,
    context: &'a ReleaseContext,
    bazel_version: String,
    date: String,
    buildifier: Option<PathBuf>,
    manifest: Option<PathBuf>,
    event_handlers: Vec<EventHandler>,
}

impl<'a, R: CommandRunner> ConfigRelease<'a, R> {
    pub fn new(runner: &'a R, context: &'a ReleaseContext, bazel_version: impl Into<String>) -> Self {
        Self {
            runner,
            context,
            bazel_version: bazel_version.into(),
            date: release_date(Local::now().date_naive()),
            buildifier: None,
            manifest: None,
            event_handlers: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = release_date(date);
        self
    }

    /// Format generated BUILD and `.bzl` files with this buildifier
    pub fn with_buildifier(mut self, buildifier: Option<PathBuf>) -> Self {
        self.buildifier = buildifier;
        self
    }

    /// Write a JSON manifest of the generated configs to this path
    pub fn with_manifest(mut self, manifest: Option<PathBuf>) -> Self {
        self.manifest = manifest;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ReleaseEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ReleaseEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    /// Run the release for `groups`
    ///
    /// The scratch directory is removed when this returns, successfully or not.
    pub async fn run(&self, groups: &[ConfigGroup]) -> Result<()> {
        info!("Releasing configs for Bazel {}", self.bazel_version);
        self.emit_event(ReleaseEvent::ReleaseStarted {
            bazel_version: self.bazel_version.clone(),
            configs: groups.iter().map(|g| g.configs.len()).sum(),
        });

        let digests = ContainerDigests::from_file(self.context.sha_map_file())
            .context("Failed to load container digests")?;
        let clang_revision = read_clang_revision(self.context.clang_revision_file())
            .context("Failed to read clang revision")?;
        debug!("Using clang revision {}", clang_revision);

        let scratch = ScratchDir::create(self.context.tmp_dir())?;
        let writer = ArtifactWriter::new(self.context, &self.bazel_version, &self.date);
        let extractor = ConfigExtractor::new(self.runner, self.context, self.buildifier.as_deref());
        let mut manifest = ReleaseManifest::new(&self.bazel_version, &self.date);

        for group in groups {
            let sha = digests.digest_for(group.distro)?;
            info!("Generating configs for {} {} ({})", group.package, group.version, sha);

            for config in &group.configs {
                if writer.create_target_if_missing(group, config, sha, &clang_revision)? {
                    self.emit_event(ReleaseEvent::TargetCreated {
                        package: group.package.clone(),
                        target: group.autoconfig_target(config),
                    });
                }

                extractor
                    .extract(group, config, &scratch)
                    .await
                    .with_context(|| {
                        format!("Failed to generate {} configs for {}", config.config_type, group.package)
                    })?;
                writer.write_metadata(group, config, sha)?;
                manifest.record(self.context.git_root(), group, config, sha);

                self.emit_event(ReleaseEvent::ConfigsExtracted {
                    package: group.package.clone(),
                    config_type: config.config_type.to_string(),
                });
            }

            let cpp_build = writer.write_toolchain_definition(group)?;
            self.format(&cpp_build).await?;
            writer.write_toolchain_bazelrc(group)?;
            let aliases = writer.write_latest_aliases(group)?;
            self.format(&aliases).await?;

            self.emit_event(ReleaseEvent::GroupCompleted {
                package: group.package.clone(),
                version: group.version.clone(),
            });
        }

        let bazelrc = writer.write_bazelrc()?;
        self.emit_event(ReleaseEvent::BazelrcUpdated { path: bazelrc });

        if let Some(path) = &self.manifest {
            manifest.write_to(path)?;
        }

        drop(scratch);
        info!("Released configs for Bazel {}", self.bazel_version);
        self.emit_event(ReleaseEvent::ReleaseCompleted {
            bazel_version: self.bazel_version.clone(),
        });
        Ok(())
    }

    async fn format(&self, path: &Path) -> Result<()> {
        let Some(buildifier) = &self.buildifier else {
            return Ok(());
        };
        self.runner
            .run(&Invocation::new(
                buildifier.display().to_string(),
                ["--lint=fix".to_string(), path.display().to_string()],
            ))
            .await
            .with_context(|| format!("buildifier failed on {}", path.display()))?;
        Ok(())
    }
}

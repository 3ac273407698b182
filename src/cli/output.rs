//! CLI output formatting

use crate::core::registry::ContainerTypeEntry;
use crate::execution::ReleaseEvent;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a release event for display
pub fn format_release_event(event: &ReleaseEvent) -> String {
    match event {
        ReleaseEvent::ReleaseStarted { bazel_version, configs } => format!(
            "{} Releasing {} configs for Bazel {}",
            ROCKET,
            style(configs).cyan(),
            style(bazel_version).bold()
        ),
        ReleaseEvent::TargetCreated { package, target } => format!(
            "{} Added {} to {}/BUILD",
            INFO,
            style(target).cyan(),
            style(package).dim()
        ),
        ReleaseEvent::ConfigsExtracted { package, config_type } => format!(
            "{} {} configs for {}",
            CHECK,
            style(config_type).green(),
            style(package).bold()
        ),
        ReleaseEvent::GroupCompleted { package, version } => format!(
            "{} {} {} done",
            CHECK,
            style(package).bold(),
            style(version).dim()
        ),
        ReleaseEvent::BazelrcUpdated { path } => format!(
            "{} Updated {}",
            INFO,
            style(path.display()).dim()
        ),
        ReleaseEvent::ReleaseCompleted { bazel_version } => format!(
            "{} Configs for Bazel {} released {}",
            CHECK,
            style(bazel_version).bold(),
            style("successfully").green()
        ),
    }
}

/// Format a registry entry as one line of the `types` listing
pub fn format_type_entry(entry: &ContainerTypeEntry) -> String {
    match &entry.tarball_name {
        Some(tarball) => format!(
            "  {} {} {}",
            style(&entry.type_key).bold(),
            style(entry.label()).cyan(),
            style(tarball).dim()
        ),
        None => format!("  {} {}", style(&entry.type_key).bold(), style(entry.label()).cyan()),
    }
}

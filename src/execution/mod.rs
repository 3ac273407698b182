//! Release workflows

pub mod artifacts;
pub mod config_release;
pub mod container_build;
pub mod extract;
pub mod manifest;
pub mod workdir;

pub use config_release::{ConfigRelease, ReleaseEvent};
pub use manifest::{ManifestEntry, ReleaseManifest};
pub use container_build::{load_registry, render_pipeline, BuildRequest, ContainerBuilder, RequestError};
pub use workdir::ScratchDir;

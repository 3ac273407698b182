//! Core domain models for toolchain releases
//!
//! This module defines the container type registry, build pipeline
//! documents, config groups and the repository layout they resolve against.

pub mod config;
pub mod context;
pub mod digests;
mod pattern;
pub mod pipeline;
pub mod registry;
pub mod step;
pub mod template;

pub use config::{Config, ConfigError, ConfigGroup, ConfigGroupSpec, ConfigType, Distro};
pub use context::ReleaseContext;
pub use digests::{ContainerDigests, DigestError};
pub use pipeline::*;
pub use registry::{ContainerTypeEntry, RegistryError, TypeMaps, TypeRegistry};
pub use step::*;
pub use template::{Template, TemplateError};

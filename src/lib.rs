//! toolchain-release - build toolchain containers and release Bazel toolchain configs

pub mod cli;
pub mod core;
pub mod execution;
pub mod runner;

// Re-export commonly used types
pub use crate::core::{BuildPipeline, BuildStep, ConfigGroup, ContainerTypeEntry, ReleaseContext, TypeRegistry};
pub use execution::{BuildRequest, ConfigRelease, ContainerBuilder, ReleaseEvent};
pub use runner::{CommandRunner, HostRunner, Invocation, RunnerError};

//! External command execution
//!
//! Every tool the release workflows drive (`git`, `bazel`, `docker`,
//! `gcloud`, `buildifier`) is reached through the `CommandRunner` trait, so
//! workflows can be exercised with a recording runner in tests.

pub mod host;
pub mod invocation;

use async_trait::async_trait;
pub use host::HostRunner;
pub use invocation::{Invocation, OutputMode, RunnerError};

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and return its trimmed stdout
    ///
    /// Streamed commands return an empty string. A non-zero exit status is an
    /// error.
    async fn run(&self, invocation: &Invocation) -> Result<String, RunnerError>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    async fn run(&self, invocation: &Invocation) -> Result<String, RunnerError> {
        (**self).run(invocation).await
    }
}

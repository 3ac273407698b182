//! Runs commands directly on the host

use crate::runner::{CommandRunner, Invocation, OutputMode, RunnerError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default timeout for a single command: long enough for a cold Bazel build
pub const DEFAULT_TIMEOUT_SECS: u64 = 10800;

/// Runner executing commands as host subprocesses
#[derive(Debug, Clone)]
pub struct HostRunner {
    /// Timeout for each command in seconds
    timeout_secs: u64,

    /// Variables added to the inherited environment
    additional_env: HashMap<String, String>,
}

impl Default for HostRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl HostRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            additional_env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_env.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, RunnerError> {
        info!("Running: {}", invocation);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&self.additional_env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.workdir {
            command.current_dir(dir);
        }
        match invocation.output {
            OutputMode::Capture => command.stdout(Stdio::piped()).stderr(Stdio::piped()),
            OutputMode::Stream => command.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
        };

        let output = timeout(Duration::from_secs(self.timeout_secs), command.output())
            .await
            .map_err(|_| RunnerError::Timeout {
                command: invocation.to_string(),
                secs: self.timeout_secs,
            })?
            .map_err(|source| RunnerError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("'{}' exited with code {}: {}", invocation, code, stderr);
            return Err(RunnerError::Failed {
                command: invocation.to_string(),
                code,
                stderr,
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| RunnerError::Decode {
            command: invocation.to_string(),
            reason: e.to_string(),
        })?;

        debug!("'{}' returned {} bytes of output", invocation, stdout.len());
        Ok(stdout.trim().to_string())
    }
}

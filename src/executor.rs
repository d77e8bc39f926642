//! Remote command execution inside the proxy's compute unit
//!
//! Every interaction with the proxy host (writing config files, reloading
//! the service, loopback probes) goes through the [`RemoteExecutor`]
//! boundary. The production implementation enters the managed LXC
//! container via `pct exec`; tests script the boundary directly.

use crate::error::{Result, VhostError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Result of one remote shell command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful exit
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First line of stderr (falling back to stdout), for error details
    pub fn detail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        source.lines().next().unwrap_or("").trim().to_string()
    }
}

/// Boundary to the virtualization control plane: runs a shell command
/// inside the compute unit hosting the proxy.
///
/// A command that ran and exited non-zero is a normal [`CommandOutput`];
/// `Err(RemoteExecutionUnavailable)` means the compute unit could not be
/// reached at all (or the command hung past the configured timeout).
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutput>;
}

/// Executor that enters a Proxmox LXC container with `pct exec`
pub struct PctExecutor {
    container_id: String,
    timeout: Duration,
}

impl PctExecutor {
    pub fn new(container_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            container_id: container_id.into(),
            timeout,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

#[async_trait]
impl RemoteExecutor for PctExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!(container_id = %self.container_id, command, "Executing command in proxy container");

        let run = Command::new("pct")
            .arg("exec")
            .arg(&self.container_id)
            .arg("--")
            .arg("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                VhostError::RemoteExecutionUnavailable(format!(
                    "command in container {} timed out after {}s",
                    self.container_id,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                VhostError::RemoteExecutionUnavailable(format!(
                    "failed to invoke pct exec for container {}: {}",
                    self.container_id, e
                ))
            })?;

        Ok(CommandOutput {
            // Killed by signal reports no code
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

//! Configuration artifact storage on the proxy host
//!
//! One file per virtual host inside the proxy's sites directory. Writes go
//! to a temporary path and are renamed into place, so a concurrent proxy
//! reload never observes a half-written file.

use crate::error::{Result, VhostError};
use crate::executor::RemoteExecutor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Heredoc delimiter for remote file writes
const WRITE_DELIMITER: &str = "__VHOSTGATE_EOF__";

/// Writer for per-vhost configuration files in the proxy container
#[derive(Debug, Clone)]
pub struct ConfigStore {
    sites_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(sites_dir: impl Into<PathBuf>) -> Self {
        Self {
            sites_dir: sites_dir.into(),
        }
    }

    pub fn sites_dir(&self) -> &Path {
        &self.sites_dir
    }

    /// Path of the configuration file for a sanitized app name
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.sites_dir.join(format!("{}.conf", name))
    }

    /// Write the full configuration for `name`, replacing any previous
    /// file atomically (heredoc to a temp path, then rename).
    pub async fn write(
        &self,
        executor: &dyn RemoteExecutor,
        name: &str,
        content: &str,
    ) -> Result<()> {
        // Rendered content is generated, but the delimiter must still
        // never appear on a line of its own
        if content.lines().any(|line| line.trim() == WRITE_DELIMITER) {
            return Err(VhostError::InvalidConfig(format!(
                "content contains the write delimiter {}",
                WRITE_DELIMITER
            )));
        }

        let path = self.config_path(name);
        let target = path.display().to_string();
        let tmp = format!("{}.tmp", target);

        let mut body = content.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }

        let command = format!(
            "mkdir -p {dir} && cat > {tmp} <<'{delim}'\n{body}{delim}\nmv -f {tmp} {target}",
            dir = shell_words::quote(&self.sites_dir.display().to_string()),
            tmp = shell_words::quote(&tmp),
            delim = WRITE_DELIMITER,
            body = body,
            target = shell_words::quote(&target),
        );

        let output = executor.execute(&command).await?;
        if !output.success() {
            return Err(VhostError::ConfigWriteFailed {
                path: target,
                detail: output.detail(),
            });
        }

        debug!(path = %path.display(), bytes = body.len(), "Wrote proxy configuration");
        Ok(())
    }

    /// Remove the configuration file for `name`. Removing a file that does
    /// not exist succeeds.
    pub async fn remove(&self, executor: &dyn RemoteExecutor, name: &str) -> Result<()> {
        let path = self.config_path(name);
        let target = path.display().to_string();

        let command = format!("rm -f {}", shell_words::quote(&target));
        let output = executor.execute(&command).await?;
        if !output.success() {
            return Err(VhostError::ConfigWriteFailed {
                path: target,
                detail: output.detail(),
            });
        }

        debug!(path = %path.display(), "Removed proxy configuration");
        Ok(())
    }
}

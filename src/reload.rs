//! Applying configuration changes to the live proxy
//!
//! Two tiers, first success wins: a graceful `caddy reload` keeps every
//! unrelated connection alive; `systemctl restart` is the disruptive
//! fallback when the graceful path fails. Callers only see success or
//! failure; which tier won is visible in the logs.

use crate::error::{Result, VhostError};
use crate::executor::RemoteExecutor;
use tracing::{info, warn};

/// Reload/restart driver for the proxy process
#[derive(Debug, Clone)]
pub struct ProxyReloader {
    caddyfile: String,
    service: String,
}

impl ProxyReloader {
    pub fn new(caddyfile: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            caddyfile: caddyfile.into(),
            service: service.into(),
        }
    }

    /// Make the running proxy adopt the on-disk configuration.
    pub async fn reload(&self, executor: &dyn RemoteExecutor) -> Result<()> {
        let reload_cmd = format!(
            "caddy reload --config {}",
            shell_words::quote(&self.caddyfile)
        );

        // A transport failure here propagates as-is: the restart tier
        // would travel the same dead channel
        let reload = executor.execute(&reload_cmd).await?;
        if reload.success() {
            info!("Proxy configuration reloaded gracefully");
            return Ok(());
        }

        warn!(
            exit_code = reload.exit_code,
            detail = %reload.detail(),
            "Graceful reload failed, falling back to service restart"
        );

        let restart_cmd = format!("systemctl restart {}", shell_words::quote(&self.service));
        let restart = executor.execute(&restart_cmd).await?;
        if restart.success() {
            warn!(service = %self.service, "Proxy restarted (connections dropped briefly)");
            return Ok(());
        }

        Err(VhostError::ReloadFailed {
            detail: format!(
                "reload: {}; restart: {}",
                reload.detail(),
                restart.detail()
            ),
        })
    }
}

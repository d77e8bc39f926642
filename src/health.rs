//! Synthetic health probes through the proxy
//!
//! Issues a request from the proxy host's own loopback interface through
//! the public path route, so the probe exercises the routing rule and the
//! backend together. Best-effort liveness only: a misrouted backend that
//! still answers 200 looks healthy.

use crate::executor::RemoteExecutor;
use tracing::{debug, warn};

/// Loopback prober for deployed virtual hosts
#[derive(Debug, Clone)]
pub struct HealthProber {
    http_port: u16,
    timeout_secs: u64,
}

impl HealthProber {
    pub fn new(http_port: u16, timeout_secs: u64) -> Self {
        Self {
            http_port,
            timeout_secs,
        }
    }

    /// Probe the public path route for a sanitized app name.
    ///
    /// 2xx/3xx is healthy; any other status, a timeout, a failed command
    /// or an unreachable executor is unhealthy.
    pub async fn probe(&self, executor: &dyn RemoteExecutor, name: &str) -> bool {
        let command = format!(
            "curl -s -o /dev/null -w '%{{http_code}}' --max-time {} http://127.0.0.1:{}/{}/",
            self.timeout_secs, self.http_port, name
        );

        let output = match executor.execute(&command).await {
            Ok(output) => output,
            Err(e) => {
                warn!(app = name, error = %e, "Health probe could not reach proxy host");
                return false;
            }
        };

        if !output.success() {
            debug!(
                app = name,
                exit_code = output.exit_code,
                "Health probe command failed"
            );
            return false;
        }

        match output.stdout.trim().parse::<u16>() {
            Ok(status @ 200..=399) => {
                debug!(app = name, status, "Health probe passed");
                true
            }
            Ok(status) => {
                debug!(app = name, status, "Health probe failed");
                false
            }
            Err(_) => {
                debug!(app = name, raw = %output.stdout.trim(), "Health probe returned no status");
                false
            }
        }
    }
}

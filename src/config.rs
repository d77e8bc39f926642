use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the vhost manager
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Admin API server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Proxy host (managed compute unit) configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Routing and URL derivation settings
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address for the admin API (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Port for the admin API (default: 7070)
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Authentication token for the admin API.
    /// If not set, a random token is generated at startup and logged.
    pub admin_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Identifier of the LXC container running the proxy (default: "100")
    #[serde(default = "default_container_id")]
    pub container_id: String,

    /// Directory of per-vhost configuration files inside the container
    #[serde(default = "default_sites_dir")]
    pub sites_dir: String,

    /// Main proxy configuration file, used by the graceful reload command
    #[serde(default = "default_caddyfile")]
    pub caddyfile: String,

    /// Service name for the restart fallback (default: caddy)
    #[serde(default = "default_service")]
    pub service: String,

    /// Timeout for each remote command in seconds (default: 30)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Timeout for loopback health probes in seconds (default: 5)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    /// DNS suffix appended to sanitized app names (default: prox.local)
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,

    /// Port of the proxy's shared HTTP listener (default: 80)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Backend port used when a create request omits one (default: 80)
    #[serde(default = "default_backend_port")]
    pub default_backend_port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            admin_port: default_admin_port(),
            admin_token: None,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            container_id: default_container_id(),
            sites_dir: default_sites_dir(),
            caddyfile: default_caddyfile(),
            service: default_service(),
            command_timeout_secs: default_command_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            domain_suffix: default_domain_suffix(),
            http_port: default_http_port(),
            default_backend_port: default_backend_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    7070
}

fn default_container_id() -> String {
    "100".to_string()
}

fn default_sites_dir() -> String {
    "/etc/caddy/sites".to_string()
}

fn default_caddyfile() -> String {
    "/etc/caddy/Caddyfile".to_string()
}

fn default_service() -> String {
    "caddy".to_string()
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_domain_suffix() -> String {
    "prox.local".to_string()
}

fn default_http_port() -> u16 {
    80
}

fn default_backend_port() -> u16 {
    80
}

//! Virtual host registry and lifecycle operations
//!
//! `VhostManager` is the source of truth for "what should currently be
//! routed". Every mutating operation runs render -> write -> reload ->
//! commit under a single write lock, and the in-memory record is committed
//! only after the configuration is live on the proxy. Read operations take
//! a brief shared lock and return cloned snapshots.

use crate::config::{Config, RoutingConfig};
use crate::error::{Result, VhostError};
use crate::executor::RemoteExecutor;
use crate::health::HealthProber;
use crate::reload::ProxyReloader;
use crate::render::{render, upstream_address, EMBED_ROUTE_PREFIX};
use crate::sanitize::sanitize;
use crate::store::ConfigStore;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Transport scheme used to reach the backend.
/// Backends are currently always plaintext HTTP; the proxy-to-client
/// scheme is a separate concern and not modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
}

/// One routed application: the unit of proxy configuration
#[derive(Debug, Clone, Serialize)]
pub struct VirtualHost {
    /// Opaque key owned by the provisioning workflow, stable for the
    /// lifetime of the deployed application
    pub app_identity: String,
    /// Derived DNS name: `sanitize(app_identity) + "." + domain_suffix`
    pub hostname: String,
    pub backend_ip: IpAddr,
    pub backend_port: u16,
    pub protocol: Protocol,
    /// Reserved for future toggling; no operation flips this
    /// independently of delete
    pub enabled: bool,
}

impl VirtualHost {
    /// Sanitized name, used for config file names and path routes
    pub fn name(&self) -> String {
        sanitize(&self.app_identity)
    }

    /// Backend dial address
    pub fn backend_address(&self) -> String {
        upstream_address(self.backend_ip, self.backend_port)
    }
}

/// URLs through which a deployed app is reachable
#[derive(Debug, Clone, Serialize)]
pub struct AccessUrls {
    /// Default path-routed URL, trust-preserving
    pub public_url: String,
    /// Header-stripping URL for embedding inside the dashboard
    pub embeddable_url: String,
}

#[derive(Default)]
struct Registry {
    records: HashMap<String, VirtualHost>,
    /// Insertion order for listing; not persisted across restarts
    order: Vec<String>,
}

impl Registry {
    fn insert(&mut self, vhost: VirtualHost) {
        if !self.records.contains_key(&vhost.app_identity) {
            self.order.push(vhost.app_identity.clone());
        }
        self.records.insert(vhost.app_identity.clone(), vhost);
    }

    fn remove(&mut self, identity: &str) -> Option<VirtualHost> {
        let removed = self.records.remove(identity);
        if removed.is_some() {
            self.order.retain(|k| k != identity);
        }
        removed
    }

    fn list(&self) -> Vec<VirtualHost> {
        self.order
            .iter()
            .filter_map(|k| self.records.get(k).cloned())
            .collect()
    }
}

/// Lifecycle manager for the proxy's virtual hosts
pub struct VhostManager {
    executor: Arc<dyn RemoteExecutor>,
    store: ConfigStore,
    reloader: ProxyReloader,
    prober: HealthProber,
    routing: RoutingConfig,
    registry: RwLock<Registry>,
    /// Serializes the whole write path so config files and the registry
    /// change atomically as a unit per call
    write_lock: Mutex<()>,
}

impl VhostManager {
    pub fn new(config: &Config, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            store: ConfigStore::new(&config.proxy.sites_dir),
            reloader: ProxyReloader::new(&config.proxy.caddyfile, &config.proxy.service),
            prober: HealthProber::new(config.routing.http_port, config.proxy.probe_timeout_secs),
            routing: config.routing.clone(),
            executor,
            registry: RwLock::new(Registry::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Create-or-replace the virtual host for an application.
    ///
    /// Renders and writes the proxy configuration and reloads the proxy;
    /// the registry record is committed only after both succeed. On
    /// failure the registry keeps its prior state, though a stale file may
    /// remain on the proxy host. Creating a different identity whose
    /// hostname collides with an existing record is rejected.
    pub async fn create(
        &self,
        app_identity: &str,
        backend_ip: IpAddr,
        backend_port: u16,
    ) -> Result<VirtualHost> {
        let vhost = self.make_record(app_identity, backend_ip, backend_port)?;
        let _guard = self.write_lock.lock().await;

        let replacing = {
            let registry = self.registry.read().await;
            if let Some(owner) = registry
                .records
                .values()
                .find(|r| r.hostname == vhost.hostname && r.app_identity != vhost.app_identity)
            {
                return Err(VhostError::HostnameCollision {
                    hostname: vhost.hostname.clone(),
                    existing: owner.app_identity.clone(),
                });
            }
            registry.records.contains_key(app_identity)
        };

        self.apply(&vhost).await?;
        self.registry.write().await.insert(vhost.clone());

        info!(
            app = app_identity,
            hostname = %vhost.hostname,
            backend = %vhost.backend_address(),
            replaced = replacing,
            "Virtual host created"
        );
        Ok(vhost)
    }

    /// Update the backend endpoint of an existing virtual host, merging
    /// only the supplied fields. Unknown identities are an error, never an
    /// implicit create.
    pub async fn update(
        &self,
        app_identity: &str,
        backend_ip: Option<IpAddr>,
        backend_port: Option<u16>,
    ) -> Result<VirtualHost> {
        let _guard = self.write_lock.lock().await;

        let mut vhost = self
            .registry
            .read()
            .await
            .records
            .get(app_identity)
            .cloned()
            .ok_or_else(|| VhostError::NotFound(app_identity.to_string()))?;

        if let Some(ip) = backend_ip {
            vhost.backend_ip = ip;
        }
        if let Some(port) = backend_port {
            if port == 0 {
                return Err(VhostError::InvalidBackend(
                    "backend port must be in 1..=65535".to_string(),
                ));
            }
            vhost.backend_port = port;
        }

        self.apply(&vhost).await?;
        self.registry.write().await.insert(vhost.clone());

        info!(
            app = app_identity,
            backend = %vhost.backend_address(),
            "Virtual host updated"
        );
        Ok(vhost)
    }

    /// Remove a virtual host. Deleting an unknown identity is a no-op.
    ///
    /// Remote removal and reload are best effort: failures are logged and
    /// the registry entry drops regardless, so torn-down apps never leak
    /// registry entries.
    pub async fn delete(&self, app_identity: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(vhost) = self
            .registry
            .read()
            .await
            .records
            .get(app_identity)
            .cloned()
        else {
            debug!(app = app_identity, "Delete of unknown virtual host is a no-op");
            return Ok(());
        };

        match self.store.remove(self.executor.as_ref(), &vhost.name()).await {
            Ok(()) => {
                if let Err(e) = self.reloader.reload(self.executor.as_ref()).await {
                    warn!(app = app_identity, error = %e, "Proxy reload after delete failed");
                }
            }
            Err(e) => {
                warn!(app = app_identity, error = %e, "Failed to remove proxy configuration");
            }
        }

        self.registry.write().await.remove(app_identity);
        info!(app = app_identity, hostname = %vhost.hostname, "Virtual host deleted");
        Ok(())
    }

    /// Snapshot of one record
    pub async fn get(&self, app_identity: &str) -> Option<VirtualHost> {
        self.registry.read().await.records.get(app_identity).cloned()
    }

    /// Snapshot of all records in insertion order
    pub async fn list(&self) -> Vec<VirtualHost> {
        self.registry.read().await.list()
    }

    pub async fn count(&self) -> usize {
        self.registry.read().await.records.len()
    }

    /// Derive the public and embeddable URLs for an app through the
    /// proxy's public address. Pure derivation from the registry record,
    /// no I/O.
    pub async fn access_urls(
        &self,
        app_identity: &str,
        proxy_public_ip: IpAddr,
    ) -> Result<AccessUrls> {
        let vhost = self
            .get(app_identity)
            .await
            .ok_or_else(|| VhostError::NotFound(app_identity.to_string()))?;

        let name = vhost.name();
        let authority = url_authority(proxy_public_ip, self.routing.http_port);

        Ok(AccessUrls {
            public_url: format!("http://{}/{}/", authority, name),
            embeddable_url: format!("http://{}{}/{}/", authority, EMBED_ROUTE_PREFIX, name),
        })
    }

    /// Probe the app through the proxy's loopback interface
    pub async fn probe(&self, app_identity: &str) -> Result<bool> {
        let vhost = self
            .get(app_identity)
            .await
            .ok_or_else(|| VhostError::NotFound(app_identity.to_string()))?;

        Ok(self
            .prober
            .probe(self.executor.as_ref(), &vhost.name())
            .await)
    }

    fn make_record(
        &self,
        app_identity: &str,
        backend_ip: IpAddr,
        backend_port: u16,
    ) -> Result<VirtualHost> {
        let name = sanitize(app_identity);
        if name.is_empty() {
            return Err(VhostError::InvalidIdentity(app_identity.to_string()));
        }
        if backend_port == 0 {
            return Err(VhostError::InvalidBackend(
                "backend port must be in 1..=65535".to_string(),
            ));
        }

        Ok(VirtualHost {
            app_identity: app_identity.to_string(),
            hostname: format!("{}.{}", name, self.routing.domain_suffix),
            backend_ip,
            backend_port,
            protocol: Protocol::Http,
            enabled: true,
        })
    }

    /// Render, write and reload for one record. The registry is not
    /// touched here; callers commit only when this succeeds.
    async fn apply(&self, vhost: &VirtualHost) -> Result<()> {
        let name = vhost.name();
        let text = render(
            &name,
            &vhost.hostname,
            vhost.backend_ip,
            vhost.backend_port,
            self.routing.http_port,
        )?;
        self.store
            .write(self.executor.as_ref(), &name, &text)
            .await?;
        self.reloader.reload(self.executor.as_ref()).await
    }
}

/// Host[:port] part of a derived URL; the default HTTP port is omitted
fn url_authority(ip: IpAddr, port: u16) -> String {
    let host = match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    };
    if port == 80 {
        host
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_insertion_order() {
        let mut registry = Registry::default();
        for name in ["c", "a", "b"] {
            registry.insert(VirtualHost {
                app_identity: name.to_string(),
                hostname: format!("{}.prox.local", name),
                backend_ip: "10.0.0.1".parse().unwrap(),
                backend_port: 80,
                protocol: Protocol::Http,
                enabled: true,
            });
        }

        let listed: Vec<String> = registry.list().into_iter().map(|v| v.app_identity).collect();
        assert_eq!(listed, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_registry_replace_keeps_position() {
        let mut registry = Registry::default();
        for name in ["a", "b"] {
            registry.insert(VirtualHost {
                app_identity: name.to_string(),
                hostname: format!("{}.prox.local", name),
                backend_ip: "10.0.0.1".parse().unwrap(),
                backend_port: 80,
                protocol: Protocol::Http,
                enabled: true,
            });
        }

        // Replacing "a" must not move it to the back
        registry.insert(VirtualHost {
            app_identity: "a".to_string(),
            hostname: "a.prox.local".to_string(),
            backend_ip: "10.0.0.9".parse().unwrap(),
            backend_port: 8080,
            protocol: Protocol::Http,
            enabled: true,
        });

        let listed: Vec<String> = registry.list().into_iter().map(|v| v.app_identity).collect();
        assert_eq!(listed, vec!["a", "b"]);
        assert_eq!(registry.records["a"].backend_port, 8080);
    }

    #[test]
    fn test_registry_remove() {
        let mut registry = Registry::default();
        registry.insert(VirtualHost {
            app_identity: "a".to_string(),
            hostname: "a.prox.local".to_string(),
            backend_ip: "10.0.0.1".parse().unwrap(),
            backend_port: 80,
            protocol: Protocol::Http,
            enabled: true,
        });

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_url_authority() {
        assert_eq!(url_authority("203.0.113.5".parse().unwrap(), 80), "203.0.113.5");
        assert_eq!(
            url_authority("203.0.113.5".parse().unwrap(), 8080),
            "203.0.113.5:8080"
        );
        assert_eq!(
            url_authority("fd00::1".parse().unwrap(), 8080),
            "[fd00::1]:8080"
        );
    }
}

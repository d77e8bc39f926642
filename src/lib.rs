//! Vhostgate - virtual host lifecycle management for the platform proxy
//!
//! This library is the management plane for the shared reverse proxy of a
//! Proxmox-backed app platform. It:
//! - Derives DNS-safe hostnames from application identities
//! - Renders per-app Caddy configuration with three access routes
//!   (hostname, public path, embeddable path)
//! - Writes configuration atomically into the proxy container's sites
//!   directory via a remote command executor
//! - Applies changes to the live proxy with a graceful-reload-then-restart
//!   strategy
//! - Tracks the set of routed applications in an in-process registry and
//!   commits each record only after its configuration is live
//! - Probes deployed virtual hosts through the proxy's loopback interface

pub mod admin;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod reload;
pub mod render;
pub mod sanitize;
pub mod store;
pub mod vhost;

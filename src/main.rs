use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use vhostgate::admin::{AdminServer, PKG_NAME, VERSION};
use vhostgate::config::Config;
use vhostgate::executor::PctExecutor;
use vhostgate::vhost::VhostManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vhostgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    info!(path = %config_path.display(), "Configuration loaded");
    print_startup_banner(&config);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Remote executor for the proxy container and the manager on top of it
    let executor = Arc::new(PctExecutor::new(
        config.proxy.container_id.clone(),
        config.proxy.command_timeout(),
    ));
    let manager = Arc::new(VhostManager::new(&config, executor));

    // Generate or use configured admin token
    let admin_token = config.server.admin_token.clone().unwrap_or_else(|| {
        let token = uuid::Uuid::new_v4().to_string();
        info!(token = %token, "Generated admin API token (configure admin_token to set a fixed value)");
        token
    });

    let admin_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.admin_port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.admin_port, error = %e, "Invalid admin bind address");
            anyhow::anyhow!("Invalid admin bind address: {}", e)
        })?;

    let admin_server = AdminServer::new(
        admin_addr,
        Arc::clone(&manager),
        shutdown_rx.clone(),
        admin_token,
        config.routing.default_backend_port,
    );

    let admin_handle = tokio::spawn(async move {
        if let Err(e) = admin_server.run().await {
            error!(error = %e, "Admin server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown and wait for the admin server to drain
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), admin_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(
        name = PKG_NAME,
        version = VERSION,
        "Starting virtual host manager"
    );
    info!(
        bind = %config.server.bind,
        admin_port = config.server.admin_port,
        "Admin API configuration"
    );
    info!(
        container_id = %config.proxy.container_id,
        sites_dir = %config.proxy.sites_dir,
        caddyfile = %config.proxy.caddyfile,
        service = %config.proxy.service,
        command_timeout_secs = config.proxy.command_timeout_secs,
        "Proxy host configuration"
    );
    info!(
        domain_suffix = %config.routing.domain_suffix,
        http_port = config.routing.http_port,
        default_backend_port = config.routing.default_backend_port,
        "Routing configuration"
    );
}

//! Admin API exposing virtual host lifecycle operations
//!
//! Consumed by the dashboard (list/get/urls/probe) and by the provisioning
//! workflow (create/update/delete around container setup and teardown).

use crate::error::{json_error_response, VhostError};
use crate::vhost::VhostManager;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::AUTHORIZATION;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Version information for the service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Deserialize)]
struct CreateRequest {
    app_identity: String,
    backend_ip: String,
    /// Defaults to the configured default backend port
    backend_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    backend_ip: Option<String>,
    backend_port: Option<u16>,
}

/// Helper to create a simple response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum")
}

/// Helper to create a JSON response
fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

fn json_body<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Admin API server for vhost lifecycle operations
pub struct AdminServer {
    bind_addr: SocketAddr,
    manager: Arc<VhostManager>,
    shutdown_rx: watch::Receiver<bool>,
    auth_token: Arc<String>,
    default_backend_port: u16,
}

impl AdminServer {
    pub fn new(
        bind_addr: SocketAddr,
        manager: Arc<VhostManager>,
        shutdown_rx: watch::Receiver<bool>,
        auth_token: String,
        default_backend_port: u16,
    ) -> Self {
        Self {
            bind_addr,
            manager,
            shutdown_rx,
            auth_token: Arc::new(auth_token),
            default_backend_port,
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Admin API server listening");

        let mut shutdown_rx = self.shutdown_rx.clone();
        let default_backend_port = self.default_backend_port;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let manager = Arc::clone(&self.manager);
                            let auth_token = Arc::clone(&self.auth_token);

                            tokio::spawn(async move {
                                if let Err(e) = serve_admin_connection(
                                    stream,
                                    manager,
                                    auth_token,
                                    default_backend_port,
                                )
                                .await
                                {
                                    debug!(addr = %addr, error = %e, "Admin connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept admin connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Admin server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_admin_connection(
    stream: TcpStream,
    manager: Arc<VhostManager>,
    auth_token: Arc<String>,
    default_backend_port: u16,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let manager = Arc::clone(&manager);
        let token = Arc::clone(&auth_token);
        async move { handle_admin_request(req, manager, token, default_backend_port).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Admin connection error: {}", e))?;

    Ok(())
}

fn check_auth(req: &Request<hyper::body::Incoming>, expected_token: &str) -> bool {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|auth| {
            // Support "Bearer <token>" format
            auth.strip_prefix("Bearer ")
                .unwrap_or(auth)
                .eq(expected_token)
        })
        .unwrap_or(false)
}

async fn handle_admin_request(
    req: Request<hyper::body::Incoming>,
    manager: Arc<VhostManager>,
    auth_token: Arc<String>,
    default_backend_port: u16,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    debug!(%method, %path, "Admin API request");

    // Unauthenticated service endpoints
    if method == Method::GET && path == "/health" {
        return Ok(response(StatusCode::OK, "ok"));
    }
    if method == Method::GET && path == "/version" {
        let version_info = serde_json::json!({
            "name": PKG_NAME,
            "version": VERSION,
        });
        return Ok(json_response(StatusCode::OK, version_info.to_string()));
    }

    if !check_auth(&req, &auth_token) {
        warn!(%path, "Unauthorized admin API request");
        return Ok(response(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let body = req.into_body().collect().await?.to_bytes();

    let result = route_request(
        &method,
        &path,
        query.as_deref(),
        &body,
        manager,
        default_backend_port,
    )
    .await;

    Ok(match result {
        Ok(response) => response,
        Err(e) => {
            debug!(%method, %path, error = %e, "Admin API request failed");
            json_error_response(&e)
        }
    })
}

async fn route_request(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &Bytes,
    manager: Arc<VhostManager>,
    default_backend_port: u16,
) -> Result<Response<Full<Bytes>>, VhostError> {
    // Collection endpoints
    if path == "/vhosts" {
        return match *method {
            Method::GET => {
                let vhosts = manager.list().await;
                let body = serde_json::json!({
                    "count": vhosts.len(),
                    "vhosts": vhosts,
                });
                Ok(json_response(StatusCode::OK, body.to_string()))
            }
            Method::POST => {
                let create: CreateRequest = match serde_json::from_slice(body) {
                    Ok(v) => v,
                    Err(e) => {
                        return Ok(response(
                            StatusCode::BAD_REQUEST,
                            format!("invalid request body: {}", e),
                        ))
                    }
                };
                let ip = parse_ip(&create.backend_ip)?;
                let port = create.backend_port.unwrap_or(default_backend_port);
                let vhost = manager.create(&create.app_identity, ip, port).await?;
                Ok(json_response(StatusCode::CREATED, json_body(&vhost)))
            }
            _ => Ok(response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")),
        };
    }

    // Per-vhost endpoints: /vhosts/{app}[/urls|/probe]
    let Some(rest) = path.strip_prefix("/vhosts/") else {
        return Ok(response(StatusCode::NOT_FOUND, "not found"));
    };
    let (app, action) = match rest.split_once('/') {
        Some((app, action)) => (app, action),
        None => (rest, ""),
    };
    let app = percent_decode(app);
    if app.is_empty() {
        return Ok(response(StatusCode::BAD_REQUEST, "missing app identity"));
    }

    match (method, action) {
        (&Method::GET, "") => {
            let vhost = manager
                .get(&app)
                .await
                .ok_or_else(|| VhostError::NotFound(app.clone()))?;
            Ok(json_response(StatusCode::OK, json_body(&vhost)))
        }
        (&Method::PUT, "") => {
            let update: UpdateRequest = match serde_json::from_slice(body) {
                Ok(v) => v,
                Err(e) => {
                    return Ok(response(
                        StatusCode::BAD_REQUEST,
                        format!("invalid request body: {}", e),
                    ))
                }
            };
            let ip = match update.backend_ip.as_deref() {
                Some(raw) => Some(parse_ip(raw)?),
                None => None,
            };
            let vhost = manager.update(&app, ip, update.backend_port).await?;
            Ok(json_response(StatusCode::OK, json_body(&vhost)))
        }
        (&Method::DELETE, "") => {
            manager.delete(&app).await?;
            Ok(response(StatusCode::OK, "ok"))
        }
        (&Method::GET, "urls") => {
            let Some(raw_ip) = query_param(query, "public_ip") else {
                return Ok(response(
                    StatusCode::BAD_REQUEST,
                    "missing public_ip query parameter",
                ));
            };
            let public_ip = parse_ip(&raw_ip)?;
            let urls = manager.access_urls(&app, public_ip).await?;
            Ok(json_response(StatusCode::OK, json_body(&urls)))
        }
        (&Method::GET, "probe") => {
            let healthy = manager.probe(&app).await?;
            let body = serde_json::json!({
                "app_identity": app,
                "healthy": healthy,
            });
            Ok(json_response(StatusCode::OK, body.to_string()))
        }
        _ => Ok(response(StatusCode::NOT_FOUND, "not found")),
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr, VhostError> {
    raw.parse()
        .map_err(|_| VhostError::InvalidBackend(format!("invalid IP literal {:?}", raw)))
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| percent_decode(v))
}

/// Decode a percent-encoded path segment or query value
fn percent_decode(input: &str) -> String {
    urlencoding::decode(input)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param(Some("public_ip=203.0.113.5"), "public_ip").as_deref(),
            Some("203.0.113.5")
        );
        assert_eq!(
            query_param(Some("a=1&public_ip=10.0.0.1&b=2"), "public_ip").as_deref(),
            Some("10.0.0.1")
        );
        assert!(query_param(Some("a=1"), "public_ip").is_none());
        assert!(query_param(None, "public_ip").is_none());
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("My%20App"), "My App");
        assert_eq!(percent_decode("nginx-01"), "nginx-01");
    }

    #[test]
    fn test_parse_ip() {
        assert!(parse_ip("10.20.0.101").is_ok());
        assert!(parse_ip("fd00::1").is_ok());
        assert!(matches!(
            parse_ip("not-an-ip"),
            Err(VhostError::InvalidBackend(_))
        ));
    }
}

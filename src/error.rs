//! Error taxonomy and JSON error responses for the admin API

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Errors produced by virtual host lifecycle operations
#[derive(Debug, Error)]
pub enum VhostError {
    /// Application identity is empty or sanitizes to nothing
    #[error("invalid app identity {0:?}")]
    InvalidIdentity(String),

    /// Backend address or port is not usable
    #[error("invalid backend endpoint: {0}")]
    InvalidBackend(String),

    /// A different application already owns the derived hostname
    #[error("hostname '{hostname}' is already routed to app '{existing}'")]
    HostnameCollision { hostname: String, existing: String },

    /// Rendered configuration failed validation before write
    #[error("rendered configuration rejected: {0}")]
    InvalidConfig(String),

    /// Remote write of the configuration artifact returned non-zero
    #[error("failed to write proxy configuration '{path}': {detail}")]
    ConfigWriteFailed { path: String, detail: String },

    /// Neither graceful reload nor service restart succeeded
    #[error("proxy reload and restart both failed: {detail}")]
    ReloadFailed { detail: String },

    /// The remote execution collaborator could not be reached at all
    #[error("remote executor unavailable: {0}")]
    RemoteExecutionUnavailable(String),

    /// Operation referenced an unknown application identity
    #[error("no virtual host registered for app '{0}'")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, VhostError>;

impl VhostError {
    /// HTTP status the admin API reports for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VhostError::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
            VhostError::InvalidBackend(_) => StatusCode::BAD_REQUEST,
            VhostError::HostnameCollision { .. } => StatusCode::CONFLICT,
            VhostError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VhostError::ConfigWriteFailed { .. } => StatusCode::BAD_GATEWAY,
            VhostError::ReloadFailed { .. } => StatusCode::BAD_GATEWAY,
            VhostError::RemoteExecutionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VhostError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Error code string for the X-Vhost-Error header and JSON body
    pub fn as_header_value(&self) -> &'static str {
        match self {
            VhostError::InvalidIdentity(_) => "INVALID_IDENTITY",
            VhostError::InvalidBackend(_) => "INVALID_BACKEND",
            VhostError::HostnameCollision { .. } => "HOSTNAME_COLLISION",
            VhostError::InvalidConfig(_) => "INVALID_CONFIG",
            VhostError::ConfigWriteFailed { .. } => "CONFIG_WRITE_FAILED",
            VhostError::ReloadFailed { .. } => "RELOAD_FAILED",
            VhostError::RemoteExecutionUnavailable(_) => "REMOTE_EXECUTION_UNAVAILABLE",
            VhostError::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// The error code
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(error: &VhostError) -> Self {
        Self {
            code: error.as_header_value(),
            message: error.to_string(),
            status: error.status_code().as_u16(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","status":{}}}"#,
                self.code,
                self.message.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// Create a JSON error response with the X-Vhost-Error header set
pub fn json_error_response(error: &VhostError) -> Response<Full<Bytes>> {
    let body = ErrorResponse::new(error).to_json();

    Response::builder()
        .status(error.status_code())
        .header("content-type", "application/json")
        .header("x-vhost-error", error.as_header_value())
        .body(Full::new(Bytes::from(body)))
        .expect("valid response with StatusCode enum and static headers")
}

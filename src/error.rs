//! Error types for admin-bridge
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Every error body has the shape `{ "ok": false, "error": ..., "status"?: ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::github::GitHubError;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input (400)
    #[error("{0}")]
    Validation(String),

    /// No access token in the session (401)
    #[error("Not authenticated")]
    Unauthorized,

    /// OAuth provider rejected the authorization code (400)
    #[error("{0}")]
    UpstreamAuth(String),

    /// Hosting API failure other than the 404s we interpret (500)
    #[error("{message}")]
    Upstream {
        status: Option<StatusCode>,
        message: String,
    },

    /// Hosting API refused to disclose branch protection (500)
    #[error("{message}")]
    UpstreamForbidden { status: StatusCode, message: String },

    /// HTTP client error (500)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<GitHubError> for AppError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Transport(e) => AppError::HttpClient(e),
            GitHubError::Api { status, message } => AppError::Upstream {
                status: Some(status),
                message,
            },
            GitHubError::OAuth(message) => AppError::UpstreamAuth(message),
            GitHubError::Decode(message) => AppError::Upstream {
                status: None,
                message,
            },
        }
    }
}

impl AppError {
    /// HTTP status of the response
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UpstreamAuth(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Upstream { .. }
            | AppError::UpstreamForbidden { .. }
            | AppError::HttpClient(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Upstream status echoed back to the caller, when known
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            AppError::Upstream { status, .. } => *status,
            AppError::UpstreamForbidden { status, .. } => Some(*status),
            AppError::HttpClient(e) => e.status(),
            _ => None,
        }
    }

    /// Metric label for the error class
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Unauthorized => "unauthorized",
            AppError::UpstreamAuth(_) => "upstream_auth",
            AppError::Upstream { .. } => "upstream",
            AppError::UpstreamForbidden { .. } => "upstream_forbidden",
            AppError::HttpClient(_) => "http_client",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let error_type = self.kind();

        if status.is_server_error() {
            tracing::error!(error = %self, kind = error_type, "Request failed");
        } else {
            tracing::warn!(error = %self, kind = error_type, "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let mut body = serde_json::json!({
            "ok": false,
            "error": self.to_string(),
        });
        if let Some(upstream) = self.upstream_status() {
            body["status"] = serde_json::json!(upstream.as_u16());
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

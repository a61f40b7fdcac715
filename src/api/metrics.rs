//! Prometheus exposition and request counting

use axum::{
    Router,
    extract::{MatchedPath, Request},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::auth::require_auth;
use crate::error::AppError;
use crate::metrics::{HTTP_REQUESTS_TOTAL, REGISTRY};

/// Create metrics router
///
/// Routes:
/// - GET /metrics - Prometheus text format, signed-in admins only
pub fn metrics_router() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(export))
        .route_layer(middleware::from_fn(require_auth))
}

async fn export() -> Result<impl IntoResponse, AppError> {
    let encoder = TextEncoder::new();
    let body = encoder
        .encode_to_string(&REGISTRY.gather())
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body))
}

/// Middleware counting requests per matched route and status
pub async fn track_http_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();

    response
}

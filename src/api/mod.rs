//! API layer
//!
//! HTTP handlers for:
//! - OAuth code exchange and session status
//! - Config publishing
//! - Metrics (Prometheus)

mod auth;
pub mod metrics;
mod save;

pub use auth::{ExchangeRequest, ExchangeResponse, StatusResponse, auth_router};
pub use metrics::{metrics_router, track_http_requests};
pub use save::{SaveConfigRequest, SaveConfigResponse, save_router};

//! admin-bridge - OAuth bridge between a browser admin tool and GitHub
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - POST /auth/exchange, GET /auth/status, POST /auth/logout │
//! │  - POST /save-config                                        │
//! │  - GET /health, GET /metrics                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Config publisher (direct commit or branch + PR)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GitHub Layer                              │
//! │  - OAuth code exchange                                      │
//! │  - REST client (contents, refs, pulls, protection)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Publishing logic
//! - `github`: GitHub OAuth and REST client
//! - `auth`: Session store, cookies and middleware
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Server-side session store
    pub sessions: auth::SessionStore,

    /// GitHub OAuth + REST entry point
    pub github: Arc<github::GitHub>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the GitHub client cannot be built from configuration
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let github = github::GitHub::new(&config)?;
        let max_age = std::time::Duration::from_secs(config.auth.session_max_age.max(1) as u64);
        let sessions = auth::SessionStore::new(max_age);

        tracing::info!(
            repository = %config.repository.full_name(),
            default_branch = %config.repository.default_branch,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions,
            github: Arc::new(github),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::DefaultBodyLimit, middleware};
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::auth_router())
        .merge(api::save_router())
        .merge(api::metrics_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_layer,
        ))
        .layer(middleware::from_fn(api::track_http_requests))
        // Oversized bodies surface as `JsonRejection`s inside the handlers
        .layer(DefaultBodyLimit::max(state.config.server.body_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(config: &config::AppConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{Method, header};
    use tower_http::cors::CorsLayer;

    match config.allowed_origin() {
        Some(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true),
        None => {
            tracing::warn!(
                "server.allowed_origin is not set; cross-origin requests cannot carry the session cookie"
            );
            CorsLayer::permissive()
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

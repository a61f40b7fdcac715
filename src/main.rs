//! admin-bridge binary entry point

use admin_bridge::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize metrics
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let default_filter = format!(
        "admin_bridge={},tower_http=debug",
        config.logging.level
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting admin-bridge...");
    tracing::info!(
        repository = %config.repository.full_name(),
        default_branch = %config.repository.default_branch,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    admin_bridge::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config.clone())?;

    // 5. Build Axum router
    let app = admin_bridge::build_router(state);

    // 6. Start HTTP server
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C (and SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

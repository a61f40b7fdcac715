//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("admin_bridge_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // GitHub Metrics
    pub static ref GITHUB_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("admin_bridge_github_requests_total", "Total number of GitHub API requests"),
        &["operation", "status"]
    ).expect("metric can be created");
    pub static ref GITHUB_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "admin_bridge_github_request_duration_seconds",
            "GitHub API request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("metric can be created");

    // Application Metrics
    pub static ref PUBLISH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("admin_bridge_publish_total", "Total number of config files published"),
        &["method"]
    ).expect("metric can be created");
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "admin_bridge_sessions_active",
        "Current number of sessions in the store"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("admin_bridge_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(GITHUB_REQUESTS_TOTAL.clone()))
            .expect("GITHUB_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(GITHUB_REQUEST_DURATION_SECONDS.clone()))
            .expect("GITHUB_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(PUBLISH_TOTAL.clone()))
            .expect("PUBLISH_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_ACTIVE.clone()))
            .expect("SESSIONS_ACTIVE can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

//! HTTP server assembly
//!
//! Builds the axum application around the gateway middleware and runs it.
//! Gateway-owned endpoints (health, metrics) live outside the reserved
//! prefix; anything else outside the prefix belongs to page serving, which is
//! not part of this service and answers 404.

use crate::config::{ConfigError, GatewayConfig};
use crate::gateway::Gateway;
use crate::handlers;
use crate::health::{HealthChecker, HealthResponse};
use crate::metrics::GatewayMetrics;
use crate::middleware::gateway_middleware;
use crate::proxy::ProxyService;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub proxy: Arc<ProxyService>,
    pub metrics: Arc<GatewayMetrics>,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    /// Compile the configuration into shared state
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let gateway = Arc::new(Gateway::from_config(config)?);
        let metrics = Arc::new(GatewayMetrics::new());
        let proxy = Arc::new(ProxyService::new(
            metrics.clone(),
            Duration::from_secs(config.server.timeout),
        ));
        let health = Arc::new(HealthChecker::new(gateway.mode()));

        Ok(Self {
            gateway,
            proxy,
            metrics,
            health,
        })
    }
}

/// Build the application router
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let mut app = Router::new();

    if config.health.enabled {
        app = app.route(&config.health.path, get(health_handler));
    }
    if config.metrics.enabled {
        app = app.route(&config.metrics.path, get(metrics_handler));
    }

    let routes = app
        .merge(handlers::local_routes(state.gateway.prefix().as_str()))
        .fallback(fallback_handler)
        .with_state(state.clone());

    // The gateway runs before route matching, so a normalized local path
    // selects its handler
    Router::new()
        .fallback_service(routes)
        .layer(from_fn_with_state(state, gateway_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Start the gateway server
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let gateway = state.gateway.clone();

    info!(
        "Gateway mode '{}' on prefix '{}': {} local paths, {} prefix rules",
        gateway.mode(),
        gateway.prefix(),
        gateway.table().local_paths().count(),
        gateway.table().rules().len()
    );
    for rule in gateway.rewrites().rules() {
        info!("Rewrite {} -> {}", rule.source(), rule.destination());
    }

    let builtin = handlers::builtin_paths(gateway.prefix().as_str());
    for path in gateway.table().local_paths() {
        if !builtin.iter().any(|b| b == path) {
            info!("Allow-listed path {} has no built-in handler", path);
        }
    }
    for path in &builtin {
        if gateway.table().lookup(path).is_none() {
            warn!("Built-in handler {} is not allow-listed and will be rejected", path);
        }
    }

    let app = build_router(state, &config);

    if config.health.enabled {
        info!("Health endpoint enabled at {}", config.health.path);
    }
    if config.metrics.enabled {
        info!("Metrics endpoint enabled at {}", config.metrics.path);
    }

    let addr: SocketAddr = config.server_addr().parse()?;
    info!("Starting gateway server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health.liveness())
}

/// Metrics handler
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.prometheus_output() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Requests that reach no route: page serving is handled elsewhere
async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("No route for {}", uri.path()))
}

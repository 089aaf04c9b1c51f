//! Built-in local handlers
//!
//! The gateway only decides *whether* a reserved-prefix request is served
//! locally; the handlers themselves are ordinary axum routes. This module
//! registers the two handlers the gateway ships with:
//! - `<prefix>/diagnostics`: process and gateway status
//! - `<prefix>/uuid` and `<prefix>/uuid/:id`: identifier generator

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

/// Paths below the prefix that have a built-in handler
const BUILTIN_ENDPOINTS: [&str; 2] = ["/diagnostics", "/uuid"];

/// Routes for the built-in handlers under `prefix`
pub fn local_routes(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{}/diagnostics", prefix), get(diagnostics))
        .route(&format!("{}/uuid", prefix), get(generate_uuid))
        .route(&format!("{}/uuid/:id", prefix), get(inspect_uuid))
}

/// Exact paths served by a built-in handler
pub fn builtin_paths(prefix: &str) -> Vec<String> {
    BUILTIN_ENDPOINTS
        .iter()
        .map(|endpoint| format!("{}{}", prefix, endpoint))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub timestamp: String,
    pub mode: String,
    pub prefix: String,
    pub local_paths: usize,
    pub prefix_rules: usize,
    pub requests_total: u64,
    pub rejections_total: u64,
    /// Share of requests rejected since start, in percent
    pub rejection_rate: f64,
}

async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let health = state.health.liveness();
    let table = state.gateway.table();

    Json(DiagnosticsResponse {
        status: health.status.to_string(),
        version: health.version,
        uptime: state.health.uptime_formatted(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: state.gateway.mode().to_string(),
        prefix: state.gateway.prefix().to_string(),
        local_paths: table.local_paths().count(),
        prefix_rules: table.rules().len(),
        requests_total: state.metrics.total_requests(),
        rejections_total: state.metrics.total_rejections(),
        rejection_rate: state.metrics.rejection_rate(),
    })
}

#[derive(Debug, Serialize)]
pub struct UuidResponse {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

async fn generate_uuid() -> Json<UuidResponse> {
    Json(UuidResponse {
        uuid: Uuid::new_v4().to_string(),
        valid: None,
    })
}

async fn inspect_uuid(Path(id): Path<String>) -> Json<UuidResponse> {
    let valid = Uuid::parse_str(&id).is_ok();
    Json(UuidResponse {
        uuid: id,
        valid: Some(valid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_paths() {
        assert_eq!(
            builtin_paths("/api"),
            vec!["/api/diagnostics".to_string(), "/api/uuid".to_string()]
        );
    }

    #[tokio::test]
    async fn test_generate_uuid() {
        let Json(response) = generate_uuid().await;
        assert!(Uuid::parse_str(&response.uuid).is_ok());
        assert_eq!(response.valid, None);
    }

    #[tokio::test]
    async fn test_inspect_uuid() {
        let Json(response) =
            inspect_uuid(Path("67e55044-10b1-426f-9247-bb680e5fe0c8".to_string())).await;
        assert_eq!(response.valid, Some(true));

        let Json(response) = inspect_uuid(Path("5f2c".to_string())).await;
        assert_eq!(response.uuid, "5f2c");
        assert_eq!(response.valid, Some(false));
    }
}

//! In-process tests for the gateway middleware and router
//!
//! Requests are driven through the full axum application with
//! `tower::ServiceExt::oneshot`; no socket is bound except for the mock
//! upstream in the proxy-mode tests.

use axum::body::Body;
use axum::http::{header, Request, StatusCode, Uri};
use axum::Router;
use edge_gateway::config::GatewayConfig;
use edge_gateway::server::{build_router, AppState};
use http_body_util::BodyExt;
use tower::ServiceExt;

const REJECT_CONFIG: &str = r#"
[gateway]
prefix = "/api"
mode = "reject"
local_paths = [
    "/api/weather",
    "/api/nba",
    "/api/diagnostics",
    "/api/uuid",
]

[[gateway.prefix_rules]]
prefix = "/api/uuid"
policy = "allow_subtree"

[[gateway.prefix_rules]]
prefix = "/api/admin"
policy = "deny_subtree"
"#;

fn create_app(toml: &str) -> (Router, AppState) {
    let config = GatewayConfig::parse(toml).unwrap();
    let state = AppState::from_config(&config).unwrap();
    (build_router(state.clone(), &config), state)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Start an upstream that echoes the request path and query
async fn spawn_echo_upstream() -> String {
    let upstream = Router::new().fallback(|uri: Uri| async move {
        (
            StatusCode::OK,
            uri.path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_default(),
        )
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_unknown_reserved_path_is_rejected() {
    let (app, _) = create_app(REJECT_CONFIG);

    for method in ["GET", "POST", "DELETE"] {
        let (status, body) = send(&app, method, "/api/unknown-thing").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "API not available");
    }
}

#[tokio::test]
async fn test_rejection_content_type() {
    let (app, _) = create_app(REJECT_CONFIG);
    let req = Request::builder()
        .uri("/api/unknown-thing")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
}

#[tokio::test]
async fn test_prefix_with_trailing_slash_is_rejected() {
    let (app, _) = create_app(REJECT_CONFIG);
    let (status, body) = send(&app, "GET", "/api/").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "API not available");
}

#[tokio::test]
async fn test_denied_subtree_is_rejected() {
    let (app, _) = create_app(REJECT_CONFIG);
    let (status, _) = send(&app, "GET", "/api/admin/users").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_malformed_reserved_path_is_rejected() {
    let (app, _) = create_app(REJECT_CONFIG);
    let (status, body) = send(&app, "GET", "/api/weather%zz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "API not available");
}

#[tokio::test]
async fn test_local_handler_is_invoked() {
    let (app, _) = create_app(REJECT_CONFIG);

    let (status, body) = send(&app, "GET", "/api/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["mode"], "reject");
    assert_eq!(json["prefix"], "/api");
    assert_eq!(json["local_paths"], 4);
    assert!(json["rejection_rate"].is_number());
}

#[tokio::test]
async fn test_trailing_slash_reaches_local_handler() {
    let (app, _) = create_app(REJECT_CONFIG);

    for uri in ["/api/diagnostics/", "/api/diagnostics///", "/api/uuid/", "/api/uuid///"] {
        let (status, _) = send(&app, "GET", uri).await;
        assert_eq!(status, StatusCode::OK, "uri {}", uri);
    }

    let (status, body) = send(&app, "GET", "/api/uuid/5f2c/").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["uuid"], "5f2c");

    let (status, body) = send(&app, "GET", "/api/weather/?city=oslo").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "No route for /api/weather");
}

#[tokio::test]
async fn test_rejection_rate_in_diagnostics() {
    let (app, _) = create_app(REJECT_CONFIG);

    send(&app, "GET", "/api/unknown-thing").await;
    let (_, body) = send(&app, "GET", "/api/diagnostics").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["requests_total"], 2);
    assert_eq!(json["rejections_total"], 1);
    assert_eq!(json["rejection_rate"], 50.0);
}

#[tokio::test]
async fn test_identifier_family_is_local() {
    let (app, _) = create_app(REJECT_CONFIG);

    let (status, body) = send(&app, "GET", "/api/uuid/5f2c").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["uuid"], "5f2c");
    assert_eq!(json["valid"], false);

    let (status, body) = send(&app, "GET", "/api/uuid").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json["uuid"].as_str().unwrap().len() == 36);
}

#[tokio::test]
async fn test_allow_listed_path_without_handler_reaches_fallback() {
    let (app, _) = create_app(REJECT_CONFIG);

    // Allowed through by the gateway; no handler is registered in-process
    let (status, body) = send(&app, "GET", "/api/weather?city=oslo").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "No route for /api/weather");
}

#[tokio::test]
async fn test_unscoped_paths_pass_through() {
    let (app, _) = create_app(REJECT_CONFIG);

    let (status, _) = send(&app, "GET", "/dashboard/finance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/apix").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_verdicts_are_counted() {
    let (app, state) = create_app(REJECT_CONFIG);

    send(&app, "GET", "/api/unknown-thing").await;
    send(&app, "GET", "/api/uuid/5f2c").await;
    send(&app, "GET", "/about").await;

    assert_eq!(state.metrics.total_requests(), 3);
    assert_eq!(state.metrics.total_rejections(), 1);

    let (status, body) = send(&app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("verdict=\"rejected\""));
    assert!(body.contains("verdict=\"local\""));
    assert!(body.contains("verdict=\"pass_through\""));
}

#[tokio::test]
async fn test_proxy_mode_forwards_unlisted_paths() {
    let upstream = spawn_echo_upstream().await;
    let toml = format!(
        r#"
[gateway]
mode = "proxy"
upstream_origin = "{}"
local_paths = ["/api/diagnostics"]

[[gateway.prefix_rules]]
prefix = "/api/admin"
policy = "deny_subtree"
"#,
        upstream
    );
    let (app, state) = create_app(&toml);

    let (status, body) = send(&app, "GET", "/api/nba?season=2024").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "/api/nba?season=2024");

    let (status, body) = send(&app, "POST", "/api/leads/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "/api/leads/");

    // Local and denied paths never reach the upstream
    let (status, body) = send(&app, "GET", "/api/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"mode\":\"proxy\""));
    let (status, body) = send(&app, "GET", "/api/admin/users").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "API not available");

    let (status, _) = send(&app, "GET", "/dashboard").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let metrics = state.metrics.prometheus_output().unwrap();
    assert!(metrics.contains("verdict=\"forwarded\""));
    assert!(metrics.contains("status=\"200\""));
}

#[tokio::test]
async fn test_proxy_mode_unreachable_upstream() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let toml = format!(
        r#"
[gateway]
mode = "proxy"
upstream_origin = "http://127.0.0.1:{}"
"#,
        port
    );
    let (app, _) = create_app(&toml);

    let (status, body) = send(&app, "GET", "/api/nba").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, "Bad Gateway");
}

//! Proxy module for forwarding requests to the upstream origin
//!
//! Used in proxy mode for reserved-prefix paths that are not served locally.
//! The target URL comes from the rewrite table; this module only moves bytes:
//! - Hop-by-hop headers are dropped and `Host` is set from the target
//! - Request bodies are streamed, never buffered
//! - Upstream responses, error statuses included, are returned unchanged
//! - A failed connection yields 502 and an expired timeout yields 504
//!
//! There are no retries and nothing is cached.

use crate::metrics::GatewayMetrics;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type UpstreamBody = http_body_util::combinators::UnsyncBoxBody<bytes::Bytes, axum::Error>;

/// Proxy service for forwarding requests
#[derive(Clone)]
pub struct ProxyService {
    client: Client<hyper_rustls::HttpsConnector<HttpConnector>, UpstreamBody>,
    metrics: Arc<GatewayMetrics>,
    timeout: Duration,
}

impl ProxyService {
    /// Create a new proxy service with support for both HTTP and HTTPS targets
    pub fn new(metrics: Arc<GatewayMetrics>, timeout: Duration) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            metrics,
            timeout,
        }
    }

    /// Forward a request to an absolute target URL
    pub async fn forward(
        &self,
        req: Request<Body>,
        target_url: &str,
    ) -> Result<Response<Body>, (StatusCode, String)> {
        let start = Instant::now();

        let (parts, body) = req.into_parts();

        let mut builder = Request::builder().method(parts.method).uri(target_url);

        if let Some(headers) = builder.headers_mut() {
            for (key, value) in parts.headers.iter() {
                // Host is replaced from the target URL below
                if !is_hop_by_hop_header(key.as_str()) {
                    headers.append(key.clone(), value.clone());
                }
            }

            match extract_host_from_url(target_url) {
                Some(target_host) => match target_host.parse::<HeaderValue>() {
                    Ok(header_value) => {
                        headers.insert(header::HOST, header_value);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to parse target host '{}' as header value: {}",
                            target_host, e
                        );
                    }
                },
                None => {
                    warn!(
                        "Failed to extract host from target URL '{}', Host header may be incorrect",
                        target_url
                    );
                }
            }
        }

        // Streamed as it arrives; a body error mid-flight fails the upstream call
        let upstream_req = builder.body(body.boxed_unsync()).map_err(|e| {
            warn!("Failed to build upstream request for '{}': {}", target_url, e);
            (StatusCode::BAD_GATEWAY, "Bad Gateway".to_string())
        })?;

        let response = match tokio::time::timeout(self.timeout, self.client.request(upstream_req))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Failed to forward request to '{}': {}", target_url, e);
                self.metrics
                    .record_upstream(StatusCode::BAD_GATEWAY.as_u16(), start.elapsed());
                return Err((StatusCode::BAD_GATEWAY, "Bad Gateway".to_string()));
            }
            Err(_) => {
                warn!(
                    "Upstream '{}' did not answer within {:?}",
                    target_url, self.timeout
                );
                self.metrics
                    .record_upstream(StatusCode::GATEWAY_TIMEOUT.as_u16(), start.elapsed());
                return Err((StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout".to_string()));
            }
        };

        let status = response.status();
        self.metrics.record_upstream(status.as_u16(), start.elapsed());
        debug!("Upstream '{}' answered {}", target_url, status);

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Check if a header is a hop-by-hop header that should not be forwarded.
///
/// `host` is not hop-by-hop per RFC 7230, but it has to be replaced with the
/// target's authority, so it is filtered here as well.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}

/// Extract host and optional port from a URL string
fn extract_host_from_url(url: &str) -> Option<String> {
    url.parse::<axum::http::Uri>()
        .ok()?
        .authority()
        .map(|authority| authority.to_string())
}

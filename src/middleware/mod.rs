//! Axum adapter for the gateway router
//!
//! Runs in front of the application router, so it sees every request before
//! routing happens. Pass-through requests continue unchanged; local requests
//! continue with their path normalized so trailing-slash variants reach the
//! same handler; rejected requests get the fixed 503 response; forwarded
//! requests go to the proxy service.

use crate::gateway::{edge, normalize_path, Dispatch};
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    http::{uri::PathAndQuery, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

pub async fn gateway_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let dispatch = state
        .gateway
        .dispatch(req.uri().path(), req.uri().query());
    state.metrics.record_verdict(dispatch.label());

    match dispatch {
        Dispatch::PassThrough => next.run(req).await,
        Dispatch::Local => {
            debug!("{} {} served locally", req.method(), req.uri().path());
            next.run(with_normalized_path(req)).await
        }
        Dispatch::Reject(reason) => {
            info!(
                "Rejected {} {} ({})",
                req.method(),
                req.uri().path(),
                reason
            );
            rejection_response()
        }
        Dispatch::Forward(target) => {
            debug!("{} {} forwarded to {}", req.method(), req.uri().path(), target);
            match state.proxy.forward(req, &target).await {
                Ok(response) => response,
                Err((status, message)) => (status, message).into_response(),
            }
        }
    }
}

/// The fixed rejection response
pub fn rejection_response() -> Response {
    edge::rejection().map(Body::from)
}

/// Strip trailing slashes so the handler router matches on the path the
/// gateway classified. The raw URI stays available as [`OriginalUri`].
fn with_normalized_path(mut req: Request) -> Request {
    let raw = req.uri().path();
    let normalized = normalize_path(raw);
    if normalized.len() == raw.len() {
        return req;
    }

    let path_and_query = match req.uri().query() {
        Some(query) => format!("{}?{}", normalized, query),
        None => normalized.to_string(),
    };
    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = match PathAndQuery::try_from(path_and_query) {
        Ok(path_and_query) => Some(path_and_query),
        Err(e) => {
            warn!("Failed to normalize {}: {}", req.uri(), e);
            return req;
        }
    };

    match Uri::from_parts(parts) {
        Ok(uri) => {
            if req.extensions().get::<OriginalUri>().is_none() {
                let original = OriginalUri(req.uri().clone());
                req.extensions_mut().insert(original);
            }
            *req.uri_mut() = uri;
        }
        Err(e) => warn!("Failed to normalize {}: {}", req.uri(), e),
    }
    req
}

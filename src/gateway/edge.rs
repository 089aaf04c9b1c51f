//! Synchronous edge adapter
//!
//! For hosts that can only run a synchronous hook in front of their own
//! request handling: no executor, no timers, no network access. The hook
//! evaluates a request once and tells the host what to do with it.

use super::{Dispatch, Gateway, REJECTION_BODY, REJECTION_STATUS};
use axum::http::{header, HeaderValue, Request, Response, Uri};
use bytes::Bytes;
use tracing::warn;

/// Instruction for the hosting runtime
#[derive(Debug)]
pub enum EdgeOutcome {
    /// Let the host serve the request as-is
    Continue,
    /// Answer immediately with this response
    Respond(Response<Bytes>),
    /// Rewrite the request to this absolute URI and let the host fetch it
    Rewrite(Uri),
}

/// Evaluate one request. The request is never modified.
pub fn evaluate<B>(gateway: &Gateway, req: &Request<B>) -> EdgeOutcome {
    let uri = req.uri();
    match gateway.dispatch(uri.path(), uri.query()) {
        Dispatch::PassThrough | Dispatch::Local => EdgeOutcome::Continue,
        Dispatch::Reject(_) => EdgeOutcome::Respond(rejection()),
        Dispatch::Forward(target) => match target.parse::<Uri>() {
            Ok(uri) => EdgeOutcome::Rewrite(uri),
            Err(e) => {
                warn!("Rewrite target '{}' is not a valid URI: {}", target, e);
                EdgeOutcome::Respond(rejection())
            }
        },
    }
}

/// The fixed rejection response
pub fn rejection() -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(REJECTION_BODY.as_bytes()));
    *response.status_mut() = REJECTION_STATUS;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

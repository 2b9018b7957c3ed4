//! HTTP proxy logic
//!
//! Receives inbound requests, strips hop-by-hop and credential headers, and
//! forwards them to the upstream URL through the session's `AuthClient`, so
//! the session's access token is attached and refreshed on expiry. Returns
//! the upstream response verbatim, including error statuses.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use session_refresh::{AuthClient, Error};
use tracing::{error, instrument, warn};
use transport::{ApiRequest, TransportError};

use crate::metrics;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Maximum inbound request body size
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: AuthClient,
    pub upstream_url: String,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Map a client error to the response the proxy returns.
fn failure_response(err: &Error, request_id: &str) -> Response {
    match err {
        Error::Network(TransportError::Timeout(_)) => {
            metrics::record_upstream_error("timeout");
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "proxy_error",
                &format!("upstream timeout: {err}"),
                request_id,
            )
        }
        Error::Network(TransportError::Connect(_)) => {
            metrics::record_upstream_error("connection");
            error_response(
                StatusCode::BAD_GATEWAY,
                "proxy_error",
                &format!("upstream error: {err}"),
                request_id,
            )
        }
        Error::RefreshFailed(_) | Error::RefreshAborted => {
            metrics::record_upstream_error("session_expired");
            error_response(
                StatusCode::UNAUTHORIZED,
                "session_expired",
                "session expired, sign in again",
                request_id,
            )
        }
        Error::Network(_) | Error::Http(_) => {
            metrics::record_upstream_error("request");
            error_response(
                StatusCode::BAD_GATEWAY,
                "proxy_error",
                &format!("upstream error: {err}"),
                request_id,
            )
        }
    }
}

/// Proxy an inbound request to upstream through the authenticated client.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    state.requests_total.fetch_add(1, Ordering::Relaxed);

    let method = request.method().clone();
    let uri = request.uri().clone();

    // Build the upstream URL by appending the request path and query
    let upstream_url = if let Some(pq) = uri.path_and_query() {
        format!("{}{}", state.upstream_url.trim_end_matches('/'), pq)
    } else {
        state.upstream_url.clone()
    };

    // Collect request headers, stripping hop-by-hop and anything the
    // session owns or reqwest derives from the URL
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && !is_session_owned(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "failed to read request body");
            metrics::record_request(400, method.as_str(), started.elapsed().as_secs_f64());
            return error_response(
                StatusCode::BAD_REQUEST,
                "proxy_error",
                &format!("invalid request body: {e}"),
                &request_id,
            );
        }
    };

    let mut outbound = ApiRequest::new(method.clone(), upstream_url);
    outbound.headers = headers;
    outbound.body = body;

    let response = match state.client.send(outbound).await {
        Ok(upstream) => {
            let mut response = Response::builder().status(upstream.status);
            for (name, value) in &upstream.headers {
                if !is_hop_by_hop(name.as_str()) {
                    response = response.header(name, value);
                }
            }
            response
                .body(axum::body::Body::from(upstream.body))
                .unwrap_or_else(|e| {
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "proxy_error",
                        &format!("response build error: {e}"),
                        &request_id,
                    )
                })
        }
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            if e.is_session_expired() {
                warn!(error = %e, "request failed, session expired");
            } else {
                error!(error = %e, "upstream request failed");
            }
            failure_response(&e, &request_id)
        }
    };

    metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Inbound headers replaced on the way out: the session attaches its own
/// `Authorization`, and `Host` must match the upstream.
fn is_session_owned(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("host")
}

//! Transport abstraction for outbound API calls
//!
//! Defines the request/response types that flow through the authenticated
//! client and the `Transport` trait that actually puts them on the wire.
//! `ReqwestTransport` is the production implementation; tests substitute
//! scripted transports that implement the same trait.
//!
//! Every HTTP status, including 401 and 5xx, is an `ApiResponse`. Only
//! failures where no response arrived at all are `TransportError`s, so
//! callers (and the failure classifier) can tell the two apart without
//! inspecting error strings.

pub mod bearer;
pub mod http;
pub mod request;

pub use bearer::{attach_bearer, bearer_token};
pub use http::ReqwestTransport;
pub use request::{ApiRequest, ApiResponse};

use std::future::Future;
use std::pin::Pin;

/// Transport-level failures: no response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// A response whose status is not 2xx, surfaced as an error by
/// [`ApiResponse::error_for_status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("server returned {status}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Sends a fully prepared request and returns whatever the server answered.
///
/// Implementations must not interpret status codes or retry; those
/// decisions belong to the caller.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Execute the request exactly once.
    fn execute<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}

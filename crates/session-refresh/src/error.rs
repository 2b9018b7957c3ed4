//! Error taxonomy for requests sent through the authenticated client

use transport::{HttpStatusError, TransportError};

/// Errors surfaced to callers of `AuthClient`.
///
/// - `Network`: no response arrived; passed through untouched
/// - `RefreshFailed`: the session could not be refreshed; the session is over
/// - `RefreshAborted`: the refresh cycle vanished without settling, treated
///   like a refresh failure
/// - `Http`: a non-2xx response, only produced when the caller opts in via
///   `ApiResponse::error_for_status`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    #[error("session refresh failed: {0}")]
    RefreshFailed(session_auth::Error),

    #[error("session refresh ended without a result")]
    RefreshAborted,

    #[error(transparent)]
    Http(#[from] HttpStatusError),
}

impl Error {
    /// Whether this error means the session is gone and the user must sign
    /// in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::RefreshFailed(_) | Error::RefreshAborted)
    }
}

/// Result alias for authenticated client operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for credential storage and token refresh

/// Errors from credential storage and the refresh endpoint.
///
/// `Clone` so that a single refresh failure can be handed to every caller
/// waiting on the same refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("credential storage error: {0}")]
    Storage(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

impl Error {
    /// Whether the refresh token itself was rejected (as opposed to the
    /// refresh endpoint being unreachable or misbehaving).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::InvalidCredentials(_) | Error::MissingRefreshToken)
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Session credential storage and token refresh
//!
//! Holds the pieces of the authenticated client that touch credentials:
//! the key-value `CredentialStore` (file-backed or in-memory), the
//! `SessionCredentials` token-pair view over it, and the refresh endpoint
//! client behind the `Refresher` trait. The refresh coordinator in
//! `session-refresh` drives these; nothing here decides *when* to refresh.
//!
//! Credential flow:
//! 1. Host signs in and stores the pair via `SessionCredentials::store()`
//! 2. Each outbound request reads `SessionCredentials::access_token()`
//! 3. On an expired session the coordinator calls `Refresher::refresh()`
//! 4. The new pair is saved with one `SessionCredentials::store()`
//! 5. If refresh fails, `SessionCredentials::clear()` removes both tokens

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionCredentials, TokenPair,
};
pub use error::{Error, Result};
pub use token::{HttpRefresher, Refresher, TokenResponse, refresh_token_at};

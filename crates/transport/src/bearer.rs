//! Bearer credential header handling.
//!
//! The decorator replaces any existing `Authorization` header with the
//! current access token. It never fetches or refreshes a token itself.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::warn;

/// Attach `token` as `Authorization: Bearer <token>`.
///
/// Any previous `Authorization` header is removed first, so a replay never
/// carries the stale token. The value is marked sensitive so it is hidden
/// from `HeaderMap` debug output. Returns `false` if the token cannot be
/// encoded as a header value; the request then goes out unauthenticated.
pub fn attach_bearer(headers: &mut HeaderMap, token: &str) -> bool {
    headers.remove(AUTHORIZATION);
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            true
        }
        Err(e) => {
            warn!(error = %e, "access token is not a valid header value, sending unauthenticated");
            false
        }
    }
}

/// Extract the token from an `Authorization: Bearer` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

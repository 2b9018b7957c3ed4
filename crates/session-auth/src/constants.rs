//! Credential store keys and refresh endpoint form values
//!
//! The two keys are the only entries the session writes. They are stored
//! and removed together as one unit.

/// Key under which the current access token is stored
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Key under which the current refresh token is stored
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// OAuth grant type sent to the refresh endpoint
pub const REFRESH_GRANT_TYPE: &str = "refresh_token";

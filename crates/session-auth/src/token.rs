//! Refresh endpoint client
//!
//! POSTs the stored refresh token to the configured refresh endpoint and
//! returns the new access token, plus a rotated refresh token when the
//! server issues one. `Refresher` is the seam the refresh coordinator calls
//! through; `HttpRefresher` is the production implementation.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::REFRESH_GRANT_TYPE;
use crate::credentials::TokenPair;
use crate::error::{Error, Result};

/// Response from the refresh endpoint.
///
/// Accepts both snake_case and camelCase field names. `refresh_token` is
/// only present when the server rotates it.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires, if reported
    #[serde(default, alias = "expiresIn", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Build the pair to persist. Keeps `previous_refresh` unless the
    /// server rotated it.
    pub fn into_pair(self, previous_refresh: &Secret<String>) -> TokenPair {
        let refresh = match self.refresh_token {
            Some(rotated) if !rotated.is_empty() => Secret::new(rotated),
            _ => previous_refresh.clone(),
        };
        TokenPair {
            access: Secret::new(self.access_token),
            refresh,
        }
    }
}

/// Exchanges a refresh token for a new access token.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Refresher>`).
pub trait Refresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;
}

/// Refresher that calls an HTTP refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    client: reqwest::Client,
    endpoint: String,
    client_id: Option<String>,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

impl Refresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(refresh_token_at(
            &self.client,
            &self.endpoint,
            self.client_id.as_deref(),
            refresh_token,
        ))
    }
}

/// Refresh an access token at `endpoint` using a refresh token.
///
/// 401/403 from the endpoint means the refresh token is revoked or expired
/// and maps to `InvalidCredentials`. Other non-success statuses and
/// undecodable bodies map to `TokenExchange`; transport failures to `Http`.
pub async fn refresh_token_at(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: Option<&str>,
    refresh: &str,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", REFRESH_GRANT_TYPE),
        ("refresh_token", refresh),
    ];
    if let Some(client_id) = client_id {
        form.push(("client_id", client_id));
    }

    let response = client
        .post(endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;
    debug!(
        rotated = token.refresh_token.is_some(),
        expires_in = token.expires_in,
        "refresh endpoint issued new access token"
    );
    Ok(token)
}

//! Failure classification for outbound API calls
//!
//! Decides whether a finished request qualifies for the refresh flow. Only
//! a 401 on a request that is neither aimed at a credential-issuing
//! endpoint nor already replayed is `AuthExpired`; every other outcome
//! passes through to the caller unchanged.

use transport::{ApiRequest, ApiResponse, TransportError};

/// Endpoints that never trigger a refresh, even when they answer 401.
///
/// A 401 from sign-in or registration means bad user input, and a 401
/// from the refresh endpoint itself means the refresh token is dead.
pub const DEFAULT_EXCLUDED_ENDPOINTS: &[&str] = &["/auth/login", "/auth/register", "/auth/refresh"];

/// Outcome of classifying one request/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Any 2xx/3xx response
    Success,
    /// No response arrived
    NetworkError,
    /// 401 on an eligible request: refresh and replay
    AuthExpired,
    /// 401 from an excluded endpoint
    Excluded,
    /// 401 on a request that was already replayed once
    AlreadyRetried,
    /// Any other 4xx/5xx
    OtherHttpError,
}

impl Classification {
    pub fn is_refresh_eligible(self) -> bool {
        self == Classification::AuthExpired
    }

    /// Label for logging and metrics.
    pub fn label(self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::NetworkError => "network_error",
            Classification::AuthExpired => "auth_expired",
            Classification::Excluded => "excluded",
            Classification::AlreadyRetried => "already_retried",
            Classification::OtherHttpError => "other_http_error",
        }
    }
}

/// Classifies request outcomes against a list of excluded URL patterns.
///
/// Patterns are matched case-insensitively against the request's URL path
/// (query string ignored). A pattern matches when the path ends with it or
/// contains it followed by `/`, so `/auth/login` covers `/v1/auth/login`
/// and `/auth/login/otp` but not `/auth/loginhistory`.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    excluded: Vec<String>,
}

impl FailureClassifier {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let excluded = patterns
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { excluded }
    }

    /// Normalized excluded patterns, for logging at startup.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Whether the request targets an excluded endpoint.
    pub fn is_excluded(&self, request: &ApiRequest) -> bool {
        let path = normalize(&request.path());
        self.excluded.iter().any(|pattern| {
            path.ends_with(pattern.as_str()) || path.contains(&format!("{pattern}/"))
        })
    }

    /// Classify the outcome of sending `request`.
    pub fn classify(
        &self,
        request: &ApiRequest,
        outcome: &Result<ApiResponse, TransportError>,
    ) -> Classification {
        let response = match outcome {
            Ok(response) => response,
            Err(_) => return Classification::NetworkError,
        };

        match response.status.as_u16() {
            401 if self.is_excluded(request) => Classification::Excluded,
            401 if request.retried => Classification::AlreadyRetried,
            401 => Classification::AuthExpired,
            400..=599 => Classification::OtherHttpError,
            _ => Classification::Success,
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_ENDPOINTS)
    }
}

fn normalize(path: &str) -> String {
    path.trim().trim_end_matches('/').to_ascii_lowercase()
}

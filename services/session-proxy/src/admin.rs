//! Admin API for the proxy's upstream session
//!
//! Runs on a separate listener port and is never exposed with the proxy
//! port. Tokens go in, never out.
//!
//! Endpoints:
//! - PUT    /admin/session: sign in with an access/refresh token pair
//! - DELETE /admin/session: sign out, clearing stored tokens
//! - GET    /admin/session: session status

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::routing::put;
use serde::Deserialize;
use session_auth::{SessionCredentials, TokenPair};
use session_refresh::RefreshCoordinator;
use tracing::{info, warn};

use crate::session::SessionFlag;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    credentials: SessionCredentials,
    coordinator: RefreshCoordinator,
    flag: SessionFlag,
}

impl AdminState {
    pub fn new(
        credentials: SessionCredentials,
        coordinator: RefreshCoordinator,
        flag: SessionFlag,
    ) -> Self {
        Self {
            credentials,
            coordinator,
            flag,
        }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/admin/session",
            put(sign_in).delete(sign_out).get(session_status),
        )
        .with_state(state)
}

type JsonResponse = (StatusCode, [(HeaderName, &'static str); 1], String);

fn json_response(status: StatusCode, body: serde_json::Value) -> JsonResponse {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Request body for sign-in.
#[derive(Deserialize)]
struct SignInRequest {
    access_token: String,
    refresh_token: String,
}

/// PUT /admin/session: store a new token pair and mark the session signed in.
async fn sign_in(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<SignInRequest>,
) -> impl IntoResponse {
    let access = body.access_token.trim();
    let refresh = body.refresh_token.trim();
    if access.is_empty() || refresh.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "access_token and refresh_token must be non-empty" }),
        );
    }

    if let Err(e) = state.credentials.store(&TokenPair::new(access, refresh)).await {
        warn!(error = %e, "failed to store session tokens");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": format!("failed to store session tokens: {e}") }),
        );
    }

    state.flag.set(true);
    info!("session signed in");
    json_response(
        StatusCode::OK,
        serde_json::json!({ "status": state.flag.label() }),
    )
}

/// DELETE /admin/session: clear stored tokens and mark the session signed out.
async fn sign_out(State(state): State<AdminState>) -> impl IntoResponse {
    if let Err(e) = state.credentials.clear().await {
        warn!(error = %e, "failed to clear session tokens");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": format!("failed to clear session tokens: {e}") }),
        );
    }

    state.flag.set(false);
    info!("session signed out");
    json_response(
        StatusCode::OK,
        serde_json::json!({ "status": state.flag.label() }),
    )
}

/// GET /admin/session: whether tokens are present and the refresh state.
async fn session_status(State(state): State<AdminState>) -> impl IntoResponse {
    let access_present = state.credentials.access_token().await.is_some();
    let refresh_present = state.credentials.refresh_token().await.is_some();

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "session": state.flag.label(),
            "access_token_present": access_present,
            "refresh_token_present": refresh_present,
            "refresh_state": state.coordinator.state().label(),
            "refresh_waiters": state.coordinator.waiting(),
        }),
    )
}

//! Scripted refresher, terminator and API transport for unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use session_auth::{Refresher, TokenResponse};
use tokio::sync::Semaphore;
use transport::{ApiRequest, ApiResponse, Transport, TransportError, bearer_token};

use crate::terminator::SessionTerminator;

/// Holds a gated refresher's calls until opened.
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn open(&self) {
        self.0.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

/// Refresher returning a scripted outcome, optionally held behind a gate.
pub struct FakeRefresher {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    outcome: session_auth::Result<(String, Option<String>)>,
    gate: Arc<Semaphore>,
}

impl FakeRefresher {
    fn with_outcome(outcome: session_auth::Result<(String, Option<String>)>) -> (Self, Gate) {
        let gate = Arc::new(Semaphore::new(0));
        let refresher = Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            outcome,
            gate: gate.clone(),
        };
        (refresher, Gate(gate))
    }

    pub fn succeeding(access: &str, rotated: Option<&str>) -> Self {
        let (refresher, gate) =
            Self::with_outcome(Ok((access.to_string(), rotated.map(str::to_string))));
        gate.open();
        refresher
    }

    pub fn failing(error: session_auth::Error) -> Self {
        let (refresher, gate) = Self::with_outcome(Err(error));
        gate.open();
        refresher
    }

    pub fn gated_success(access: &str) -> (Self, Gate) {
        Self::with_outcome(Ok((access.to_string(), None)))
    }

    pub fn gated_failure(error: session_auth::Error) -> (Self, Gate) {
        Self::with_outcome(Err(error))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens the refresher was called with.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Refresher for FakeRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(refresh_token.to_string());

            let _permit = self.gate.acquire().await;

            self.outcome
                .clone()
                .map(|(access_token, refresh_token)| TokenResponse {
                    access_token,
                    refresh_token,
                    expires_in: Some(900),
                })
        })
    }
}

/// Terminator that counts its invocations.
#[derive(Default)]
pub struct CountingTerminator {
    count: AtomicUsize,
}

impl CountingTerminator {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl SessionTerminator for CountingTerminator {
    fn terminate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.count.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// One request as the fake API saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub path: String,
    pub token: Option<String>,
    pub retried: bool,
}

/// In-process API that accepts exactly one access token.
///
/// - `/down` fails with a connect error
/// - `/teapot` answers 418
/// - `/public/*` answers 200 without auth
/// - `/auth/login` answers 401 "bad password"
/// - anything else answers 200 with the valid token, 401 without it
pub struct FakeApi {
    valid: String,
    log: Mutex<Vec<Seen>>,
}

impl FakeApi {
    pub fn accepting(token: &str) -> Self {
        Self {
            valid: token.to_string(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.log.lock().unwrap().clone()
    }

    fn answer(&self, request: &ApiRequest) -> transport::Result<ApiResponse> {
        let path = request.path();
        let token = bearer_token(&request.headers).map(str::to_string);
        self.log.lock().unwrap().push(Seen {
            path: path.clone(),
            token: token.clone(),
            retried: request.retried,
        });

        if path == "/down" {
            return Err(TransportError::Connect("connection refused".into()));
        }
        if path == "/teapot" {
            return Ok(ApiResponse::new(StatusCode::IM_A_TEAPOT, "short and stout"));
        }
        if path.starts_with("/public") {
            return Ok(ApiResponse::new(StatusCode::OK, "public"));
        }
        if path == "/auth/login" {
            return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "bad password"));
        }

        if token.as_deref() == Some(self.valid.as_str()) {
            Ok(ApiResponse::new(StatusCode::OK, format!("ok {path}")))
        } else {
            Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "token expired"))
        }
    }
}

impl Transport for FakeApi {
    fn execute<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.answer(request)
        })
    }
}

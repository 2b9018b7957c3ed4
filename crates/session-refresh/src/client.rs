//! Authenticated client pipeline
//!
//! `AuthClient::send` is the request path every caller goes through:
//! decorate with the stored access token, send, classify the outcome, and
//! either hand it straight back or wait for the session's refresh cycle and
//! replay the request once with the new token.

use std::sync::Arc;

use session_auth::{CredentialStore, Refresher, SessionCredentials};
use tracing::debug;
use transport::{ApiRequest, ApiResponse, Transport, attach_bearer};

use crate::classify::FailureClassifier;
use crate::coordinator::RefreshCoordinator;
use crate::error::Result;
use crate::terminator::SessionTerminator;

/// HTTP client that refreshes an expired session transparently.
///
/// Clones share the transport, credentials and refresh coordinator, so one
/// client (or any number of clones) maps to exactly one session.
#[derive(Clone)]
pub struct AuthClient {
    transport: Arc<dyn Transport>,
    credentials: SessionCredentials,
    classifier: Arc<FailureClassifier>,
    coordinator: RefreshCoordinator,
}

impl AuthClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn Refresher>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        let credentials = SessionCredentials::new(store);
        let coordinator = RefreshCoordinator::new(credentials.clone(), refresher, terminator);
        Self {
            transport,
            credentials,
            classifier: Arc::new(FailureClassifier::default()),
            coordinator,
        }
    }

    /// Replace the default excluded-endpoint classifier.
    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    /// Send `request` with the session's access token.
    ///
    /// Any HTTP status comes back as `Ok`, including the 401 of an excluded
    /// endpoint or of a replay. Errors are transport failures
    /// (`Error::Network`) and a failed refresh (`Error::RefreshFailed`), in
    /// which case the session has already been terminated.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        if let Some(token) = self.credentials.access_token().await {
            attach_bearer(&mut request.headers, token.expose());
        }

        let outcome = self.transport.execute(&request).await;
        let classification = self.classifier.classify(&request, &outcome);
        debug!(
            method = %request.method,
            url = %request.url,
            classification = classification.label(),
            "request classified"
        );
        if !classification.is_refresh_eligible() {
            return Ok(outcome?);
        }

        let token = self.coordinator.fresh_token().await?;
        self.replay(request, token.expose()).await
    }

    /// Resend once with a new token. The outcome is final whatever its status.
    async fn replay(&self, mut request: ApiRequest, token: &str) -> Result<ApiResponse> {
        request.retried = true;
        attach_bearer(&mut request.headers, token);
        metrics::counter!("session_replays_total").increment(1);

        let response = self.transport.execute(&request).await?;
        debug!(
            method = %request.method,
            url = %request.url,
            status = response.status.as_u16(),
            "replayed request"
        );
        Ok(response)
    }
}

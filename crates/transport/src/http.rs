//! reqwest-backed transport.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::{ApiRequest, ApiResponse, Result, Transport};

/// Sends `ApiRequest`s with a shared `reqwest::Client`.
///
/// The optional timeout applies per request; without it the client's own
/// configuration decides.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Transport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers.clone())
                .body(request.body.clone());
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            debug!(
                method = %request.method,
                url = %request.url,
                status = status.as_u16(),
                retried = request.retried,
                "request completed"
            );

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

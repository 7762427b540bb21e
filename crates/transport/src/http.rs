//! Base transport backed by `reqwest`.
//!
//! The bottom layer of the stack: no authentication, no retries, no status
//! interpretation. It only races the network call against cancellation.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{BoxFuture, Error, Result, Transport};

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Executes requests with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose client aborts any request after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidRequest(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: reqwest::Request,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<reqwest::Response>> {
        Box::pin(async move {
            let method = request.method().clone();
            let url = request.url().clone();
            let started = Instant::now();

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%method, %url, "request cancelled");
                    return Err(Error::Cancelled);
                }
                result = self.client.execute(request) => result.inspect_err(|e| {
                    debug!(%method, %url, error = %e, "request failed");
                })?,
            };

            debug!(
                %method,
                %url,
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
            Ok(response)
        })
    }
}

//! Authorized Daichi cloud client
//!
//! Owns the layered transport stack and the token store:
//!
//! ```text
//! BreakerTransport -> AuthTransport -> HttpTransport
//! ```
//!
//! The login runs through the bare `HttpTransport`, so token fetches are
//! neither authorized nor gated by the breaker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use breaker::{BreakerSettings, BreakerTransport, CircuitBreaker};
use daichi_auth::{
    AuthTransport, BUILDINGS_PATH, Credential, PasswordGrantRefresher, TokenAcquirer, TokenStore,
    USER_INFO_PATH, endpoint,
};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, error, info, warn};
use transport::{HttpTransport, Transport};

use crate::config::ClientConfig;
use crate::envelope;
use crate::models::{Building, User};
use crate::{Error, Result};

type Stack = BreakerTransport<AuthTransport<Arc<HttpTransport>>>;

/// Client holding a valid bearer token.
///
/// Cheap to share behind an `Arc`; every call takes `&self`.
pub struct AuthorizedClient {
    base_url: String,
    transport: Stack,
    acquirer: Arc<TokenAcquirer>,
    credential: Credential,
    store: Arc<TokenStore>,
    auth_timeout: Duration,
    log_sink: Option<Dispatch>,
}

/// Run `fut` with `sink` as its default subscriber, if one is set.
async fn in_sink<F: Future>(sink: Option<&Dispatch>, fut: F) -> F::Output {
    match sink {
        Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
        None => fut.await,
    }
}

impl AuthorizedClient {
    /// Build the transport stack and log in.
    ///
    /// The login is bounded by the configured auth timeout whatever the
    /// caller's own deadline; exceeding it yields `Error::Timeout`.
    /// Cancelling `cancel` aborts it with `Error::Cancelled`.
    pub async fn connect(config: ClientConfig, cancel: &CancellationToken) -> Result<Self> {
        let sink = config.log_sink.clone();
        in_sink(sink.as_ref(), Self::establish(config, cancel)).await
    }

    async fn establish(config: ClientConfig, cancel: &CancellationToken) -> Result<Self> {
        let http = Arc::new(HttpTransport::new(config.request_timeout)?);
        let acquirer = Arc::new(
            TokenAcquirer::new(http.clone(), &config.base_url)?
                .with_retry(config.retry)
                .with_debug(config.debug),
        );
        let store = Arc::new(TokenStore::new());
        let refresher = PasswordGrantRefresher::new(acquirer.clone(), config.credential.clone());
        let auth = AuthTransport::new(http, store.clone()).with_refresher(Arc::new(refresher));

        let breaker = match config.breaker {
            Some(breaker) => breaker,
            None => Arc::new(
                CircuitBreaker::new(BreakerSettings::default())
                    .map_err(|e| Error::InvalidRequest(e.to_string()))?,
            ),
        };

        let client = Self {
            base_url: config.base_url,
            transport: BreakerTransport::new(auth, breaker),
            acquirer,
            credential: config.credential,
            store,
            auth_timeout: config.auth_timeout,
            log_sink: config.log_sink,
        };

        client.login(cancel).await?;
        info!(
            base_url = %client.base_url,
            breaker = client.breaker().name(),
            "authorized client created"
        );
        Ok(client)
    }

    /// Acquire a token under the auth timeout and store it.
    async fn login(&self, cancel: &CancellationToken) -> Result<()> {
        let acquire = self.acquirer.acquire(&self.credential, cancel);
        let token = match tokio::time::timeout(self.auth_timeout, acquire).await {
            Ok(result) => result.inspect_err(|e| error!(error = %e, "login failed"))?,
            Err(_) => {
                error!(
                    timeout_ms = self.auth_timeout.as_millis() as u64,
                    "login timed out"
                );
                return Err(Error::Timeout(self.auth_timeout));
            }
        };
        self.store.set(token).await;
        Ok(())
    }

    /// Log in again with the stored credential, replacing the current
    /// token. This is the way out of `Error::RefreshRequired`.
    pub async fn reauthenticate(&self, cancel: &CancellationToken) -> Result<()> {
        in_sink(self.log_sink.as_ref(), async {
            self.login(cancel).await?;
            info!("re-authenticated");
            Ok::<_, Error>(())
        })
        .await
    }

    /// `GET /user`
    pub async fn user_info(&self, cancel: &CancellationToken) -> Result<User> {
        self.get_json(USER_INFO_PATH, cancel).await
    }

    /// `GET /buildings`
    pub async fn buildings(&self, cancel: &CancellationToken) -> Result<Vec<Building>> {
        self.get_json(BUILDINGS_PATH, cancel).await
    }

    /// GET `path` below the API base through the full stack and decode the
    /// envelope payload as `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        in_sink(self.log_sink.as_ref(), self.fetch(path, cancel)).await
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, cancel: &CancellationToken) -> Result<T> {
        let url = endpoint(&self.base_url, path)?;
        let mut request = reqwest::Request::new(Method::GET, url);
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self
            .transport
            .execute(request, cancel)
            .await
            .inspect_err(|e| warn!(path, error = %e, "request failed"))?;

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            body = response.bytes() => body?,
        };

        if status != StatusCode::OK {
            error!(path, status = status.as_u16(), "unexpected status");
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }
        debug!(path, bytes = body.len(), "response received");

        envelope::unwrap(&body)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.transport.breaker()
    }
}

//! Authenticating transport layer
//!
//! Attaches the stored bearer token to every request, turns 404/405 into
//! sentinel errors, and recovers from an expired token by refreshing once and
//! replaying the request. A second 401 is final: the backend keeps rejecting
//! fresh credentials, and looping would never end.
//!
//! Concurrent 401s are not coalesced. Each caller that sees one refreshes on
//! its own and writes its token; the last write wins.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transport::{BoxFuture, Transport, clone_request};

use crate::credentials::{Token, TokenStore};
use crate::refresh::TokenRefresher;
use crate::{Error, Result};

/// `Transport` decorator injecting `Authorization: Bearer <token>`.
pub struct AuthTransport<T> {
    inner: T,
    store: Arc<TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl<T: Transport> AuthTransport<T> {
    /// Without a refresher every 401 surfaces as `TokenExpired`.
    pub fn new(inner: T, store: Arc<TokenStore>) -> Self {
        Self {
            inner,
            store,
            refresher: None,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<Token> {
        let Some(refresher) = &self.refresher else {
            warn!("token rejected and no refresher configured");
            return Err(Error::token_expired());
        };

        info!("token expired, refreshing");
        match refresher.refresh(cancel).await {
            Ok(token) => {
                self.store.set(token.clone()).await;
                info!("token refreshed");
                Ok(token)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                error!(error = %e, "failed to refresh token");
                Err(Error::TokenExpired {
                    cause: Some(Box::new(e)),
                })
            }
        }
    }
}

impl<T: Transport> Transport for AuthTransport<T> {
    fn execute<'a>(
        &'a self,
        request: reqwest::Request,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<reqwest::Response>> {
        Box::pin(async move {
            let token = self.store.get().await;
            let response = self
                .inner
                .execute(authorize(&request, token.as_ref())?, cancel)
                .await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return check_status(response, &request);
            }

            let fresh = self.refresh(cancel).await?;
            let retried = self
                .inner
                .execute(authorize(&request, Some(&fresh))?, cancel)
                .await?;

            if retried.status() == StatusCode::UNAUTHORIZED {
                warn!(url = %request.url(), "token rejected again after refresh");
                return Err(Error::token_expired());
            }
            check_status(retried, &request)
        })
    }
}

/// Copy of `original` carrying the bearer header; the original is untouched.
fn authorize(original: &reqwest::Request, token: Option<&Token>) -> Result<reqwest::Request> {
    let mut request = clone_request(original)?;
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
            .map_err(|e| Error::InvalidRequest(format!("token is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

fn check_status(response: reqwest::Response, request: &reqwest::Request) -> Result<reqwest::Response> {
    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => {
            error!(url = %request.url(), "method not allowed (405)");
            Err(Error::MethodNotAllowed)
        }
        StatusCode::NOT_FOUND => {
            error!(url = %request.url(), "endpoint not found (404)");
            Err(Error::EndpointNotFound)
        }
        _ => Ok(response),
    }
}

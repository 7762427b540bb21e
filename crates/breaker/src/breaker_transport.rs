//! `Transport` decorator guarding the wrapped layer with a breaker.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transport::{BoxFuture, Error, Result, Transport};

use crate::circuit::CircuitBreaker;
use crate::classifier::Outcome;

/// Runs every call through `CircuitBreaker::allow` and reports its outcome.
///
/// A rejected call never reaches `inner`. Cancelled calls are not counted
/// either way; their admission is released.
pub struct BreakerTransport<T> {
    inner: T,
    breaker: Arc<CircuitBreaker>,
}

impl<T: Transport> BreakerTransport<T> {
    pub fn new(inner: T, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl<T: Transport> Transport for BreakerTransport<T> {
    fn execute<'a>(
        &'a self,
        request: reqwest::Request,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<reqwest::Response>> {
        Box::pin(async move {
            let admission = self.breaker.allow()?;
            let result = self.inner.execute(request, cancel).await;

            if matches!(result, Err(Error::Cancelled)) {
                return result;
            }

            let outcome = match &result {
                Ok(response) => Outcome::Response(response.status()),
                Err(e) => Outcome::Error(e),
            };
            if self.breaker.classifier().is_failure(&outcome) {
                admission.failure();
            } else {
                admission.success();
            }
            result
        })
    }
}

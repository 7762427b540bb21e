//! Request execution layer for the Daichi cloud client
//!
//! Defines the `Transport` capability that every layer of the client
//! implements. `HttpTransport` sits at the bottom and talks to the network;
//! the authenticating transport and the circuit breaker wrap it, each holding
//! the next layer and forwarding `execute` to it:
//!
//! ```text
//! caller -> BreakerTransport -> AuthTransport -> HttpTransport -> network
//! ```
//!
//! All layers share one error taxonomy (`Error`) so that a sentinel raised
//! deep in the stack reaches the caller with its identity intact.

pub mod error;
pub mod http;

pub use error::{Error, Result};
pub use http::HttpTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Boxed future returned by transport layers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that can execute an HTTP request.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`). Implementations must return promptly with
/// `Error::Cancelled` once `cancel` fires.
pub trait Transport: Send + Sync {
    /// Execute `request` and return the raw response.
    ///
    /// Transport-level failures are errors; HTTP statuses are not, unless
    /// the layer documents otherwise.
    fn execute<'a>(
        &'a self,
        request: reqwest::Request,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<reqwest::Response>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute<'a>(
        &'a self,
        request: reqwest::Request,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<reqwest::Response>> {
        (**self).execute(request, cancel)
    }
}

/// Clone a request so the caller's original stays untouched.
///
/// Fails with `InvalidRequest` when the body is a stream that cannot be
/// replayed.
pub fn clone_request(request: &reqwest::Request) -> Result<reqwest::Request> {
    request.try_clone().ok_or_else(|| {
        Error::InvalidRequest(format!(
            "{} {} has a streaming body and cannot be replayed",
            request.method(),
            request.url()
        ))
    })
}

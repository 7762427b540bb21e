//! Error taxonomy shared by every layer of the client
//!
//! Callers branch on variant identity (for example to decide whether to log
//! in again), so layers return these variants unchanged instead of wrapping
//! them in strings.

use std::time::Duration;

use serde_json::Value;

/// Errors from any layer of the authenticated request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Username or password empty; no I/O was attempted.
    #[error("username and password must be set")]
    MissingCredentials,

    /// Connection, TLS, timeout or body transfer failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("API endpoint not found (404)")]
    EndpointNotFound,

    #[error("method not allowed (405)")]
    MethodNotAllowed,

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    /// Envelope carried `done = false`.
    #[error("server rejected request: {}", render(.0))]
    ServerRejected(Value),

    /// Envelope carried `done = true` together with non-null `errors`.
    #[error("server returned errors: {}", render(.0))]
    ServerError(Value),

    #[error("access_token not found in response")]
    TokenNotFound,

    /// Server demands a full login instead of a token refresh.
    #[error("server requires a fresh login (updateRequired)")]
    RefreshRequired,

    /// 401 with no refresh configured, a failed refresh, or a second 401
    /// after refreshing. `cause` holds the refresh failure, if any.
    #[error("token expired")]
    TokenExpired {
        #[source]
        cause: Option<Box<Error>>,
    },

    /// The named circuit breaker rejected the call without attempting it.
    #[error("circuit breaker {0} is open")]
    CircuitOpen(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// `TokenExpired` without an underlying refresh failure.
    pub fn token_expired() -> Self {
        Error::TokenExpired { cause: None }
    }

    /// Whether the failure happened below HTTP and may succeed on retry.
    ///
    /// Only `Network` qualifies: once the server answered, repeating the
    /// same request yields the same status.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

/// Render an envelope `errors` value: bare strings without JSON quotes.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

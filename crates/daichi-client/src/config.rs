//! Client configuration
//!
//! `ClientConfig` is immutable once built. All options are set on
//! `ClientConfigBuilder` and validated together by `build()`, so a client
//! never starts from a half-valid configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use breaker::CircuitBreaker;
use common::Secret;
use daichi_auth::{
    AUTH_TIMEOUT, Credential, DEFAULT_API_URL, DEFAULT_BACKOFF_UNIT, DEFAULT_CLIENT_ID,
    DEFAULT_RETRIES, Error, Result, RetryPolicy, TOKEN_PATH, endpoint,
};
use tracing::Dispatch;
use transport::http::DEFAULT_REQUEST_TIMEOUT;

/// Validated settings for an `AuthorizedClient`.
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) base_url: String,
    pub(crate) credential: Credential,
    pub(crate) retry: RetryPolicy,
    pub(crate) request_timeout: Duration,
    pub(crate) auth_timeout: Duration,
    pub(crate) debug: bool,
    pub(crate) breaker: Option<Arc<CircuitBreaker>>,
    pub(crate) log_sink: Option<Dispatch>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .field("debug", &self.debug)
            .field("breaker", &self.breaker.as_ref().map(|b| b.name()))
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Collects client options. Unset options keep the Daichi web client's
/// defaults.
pub struct ClientConfigBuilder {
    base_url: String,
    client_id: String,
    username: String,
    password: Secret<String>,
    retries: u32,
    backoff_unit: Duration,
    request_timeout: Duration,
    auth_timeout: Duration,
    debug: bool,
    breaker: Option<Arc<CircuitBreaker>>,
    log_sink: Option<Dispatch>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: String::new(),
            password: Secret::from(""),
            retries: DEFAULT_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_timeout: AUTH_TIMEOUT,
            debug: false,
            breaker: None,
            log_sink: None,
        }
    }
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Secret<String>>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Total attempts for a token fetch that fails below HTTP.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_backoff(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Per-request timeout of the underlying HTTP client.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Upper bound for the login performed by `AuthorizedClient::connect`.
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Log raw token responses at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Share a breaker between clients. Without one each client gets a
    /// breaker with default settings.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Route the client's log events to `sink` instead of the global
    /// subscriber.
    pub fn log_sink(mut self, sink: impl Into<Dispatch>) -> Self {
        self.log_sink = Some(sink.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let credential = Credential::new(self.client_id, self.username, self.password);
        credential.validate()?;

        endpoint(&self.base_url, TOKEN_PATH)?;

        if self.retries == 0 {
            return Err(Error::InvalidRequest(
                "retries must be greater than 0".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidRequest(
                "request timeout must be greater than 0".into(),
            ));
        }
        if self.auth_timeout.is_zero() {
            return Err(Error::InvalidRequest(
                "auth timeout must be greater than 0".into(),
            ));
        }

        Ok(ClientConfig {
            base_url: self.base_url.trim().to_string(),
            credential,
            retry: RetryPolicy::new(self.retries, self.backoff_unit),
            request_timeout: self.request_timeout,
            auth_timeout: self.auth_timeout,
            debug: self.debug,
            breaker: self.breaker,
            log_sink: self.log_sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breaker::BreakerSettings;

    fn builder() -> ClientConfigBuilder {
        ClientConfig::builder().credentials("user@example.com", "hunter2")
    }

    #[test]
    fn defaults_match_web_client() {
        let config = builder().build().unwrap();
        assert_eq!(config.base_url(), DEFAULT_API_URL);
        assert_eq!(config.credential().client_id(), DEFAULT_CLIENT_ID);
        assert_eq!(config.retry().attempts, DEFAULT_RETRIES);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.auth_timeout(), AUTH_TIMEOUT);
        assert!(!config.debug());
        assert!(config.breaker.is_none());
        assert!(config.log_sink.is_none());
    }

    #[test]
    fn options_are_applied() {
        let breaker =
            Arc::new(CircuitBreaker::new(BreakerSettings::named("shared")).unwrap());
        let config = builder()
            .base_url(" http://127.0.0.1:8080/api/v4 ")
            .client_id("custom-client")
            .retries(5)
            .retry_backoff(Duration::from_millis(20))
            .request_timeout(Duration::from_secs(2))
            .auth_timeout(Duration::from_secs(3))
            .debug(true)
            .circuit_breaker(breaker)
            .build()
            .unwrap();

        assert_eq!(config.base_url(), "http://127.0.0.1:8080/api/v4");
        assert_eq!(config.credential().client_id(), "custom-client");
        assert_eq!(config.credential().username(), "user@example.com");
        assert_eq!(config.retry().attempts, 5);
        assert_eq!(config.retry().backoff_unit, Duration::from_millis(20));
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.auth_timeout(), Duration::from_secs(3));
        assert!(config.debug());
        assert_eq!(config.breaker.as_ref().unwrap().name(), "shared");
    }

    #[test]
    fn missing_credentials_rejected() {
        let err = ClientConfig::builder().build().unwrap_err();
        assert!(matches!(err, Error::MissingCredentials));

        let err = ClientConfig::builder()
            .credentials("user@example.com", "")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials));
    }

    #[test]
    fn bad_base_url_rejected() {
        let err = builder().base_url("ftp://example.com").build().unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = builder().base_url("not a url").build().unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn zero_retries_and_timeouts_rejected() {
        let err = builder().retries(0).build().unwrap_err();
        assert!(err.to_string().contains("retries"));

        let err = builder().request_timeout(Duration::ZERO).build().unwrap_err();
        assert!(err.to_string().contains("request timeout"));

        let err = builder().auth_timeout(Duration::ZERO).build().unwrap_err();
        assert!(err.to_string().contains("auth timeout"));
    }

    #[test]
    fn debug_output_hides_password() {
        let config = builder().build().unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}

//! Password-grant token acquisition
//!
//! POSTs the credential to `<base>/token` as a form and unwraps the
//! `{done, errors, updateRequired, data: {access_token}}` envelope. Only
//! failures below HTTP are retried, with a linear backoff; any HTTP status
//! means the server answered and the same request would get the same answer.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use transport::Transport;

use crate::constants::{DEFAULT_BACKOFF_UNIT, DEFAULT_RETRIES, TOKEN_PATH};
use crate::credentials::{Credential, Token};
use crate::{Error, Result};

/// Bounded retry for transient token fetch failures.
///
/// Failed attempt `i` (0-based) waits `(i + 1) * backoff_unit` before the
/// next one. No wait follows the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            attempts,
            backoff_unit,
        }
    }

    /// Delay after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_add(1))
    }
}

/// Body of the token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    errors: Value,
    #[serde(default, rename = "updateRequired")]
    update_required: bool,
    #[serde(default)]
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default)]
    access_token: String,
}

/// Exchanges credentials for bearer tokens.
///
/// Talks to the token endpoint through the base transport, never through the
/// authenticating one, so a refresh cannot recurse into itself.
pub struct TokenAcquirer {
    transport: Arc<dyn Transport>,
    token_url: Url,
    retry: RetryPolicy,
    debug: bool,
}

impl TokenAcquirer {
    /// Acquirer for the token endpoint under `base_url`.
    pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> Result<Self> {
        Ok(Self {
            transport,
            token_url: crate::endpoint(base_url, TOKEN_PATH)?,
            retry: RetryPolicy::default(),
            debug: false,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Log raw token endpoint responses at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Perform the password grant and return the new token.
    ///
    /// Storing the token is the caller's job.
    #[instrument(skip_all, fields(username = %credential.username()))]
    pub async fn acquire(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Token> {
        if let Err(e) = credential.validate() {
            error!("username and password must be set");
            return Err(e);
        }

        let response = self.send_with_retry(credential, cancel).await?;
        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            body = response.bytes() => body?,
        };
        if self.debug {
            debug!(status = status.as_u16(), body = %redacted(&body), "token response");
        }

        let token = interpret(status, &body).inspect_err(|e| {
            error!(status = status.as_u16(), error = %e, "token request failed");
        })?;
        info!("token received");
        Ok(token)
    }

    async fn send_with_retry(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            let request = self.build_request(credential)?;
            match self.transport.execute(request, cancel).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        url = %self.token_url,
                        error = %e,
                        "token request failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts = attempt + 1, error = %e, "token request failed");
                    return Err(e);
                }
            }
        }
    }

    /// Form body field order is part of the wire contract.
    fn build_request(&self, credential: &Credential) -> Result<reqwest::Request> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("email", credential.username())
            .append_pair("password", credential.password().expose())
            .append_pair("clientId", credential.client_id())
            .finish();

        let mut request = reqwest::Request::new(Method::POST, self.token_url.clone());
        let headers = request.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        *request.body_mut() = Some(body.into());
        Ok(request)
    }
}

/// Token response body for debug logs, with `data.access_token` masked.
///
/// Bodies that are not JSON objects are logged as-is; they cannot carry a
/// token the client would accept.
fn redacted(body: &[u8]) -> String {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return String::from_utf8_lossy(body).into_owned();
    };
    if let Some(token) = value
        .get_mut("data")
        .and_then(|data| data.get_mut("access_token"))
    {
        *token = Value::String("[REDACTED]".into());
    }
    value.to_string()
}

/// Map a token endpoint answer to a token or a sentinel error.
fn interpret(status: StatusCode, body: &[u8]) -> Result<Token> {
    match status {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => return Err(Error::EndpointNotFound),
        StatusCode::METHOD_NOT_ALLOWED => return Err(Error::MethodNotAllowed),
        other => return Err(Error::UnexpectedStatus(other.as_u16())),
    }

    let envelope: TokenEnvelope = serde_json::from_slice(body)
        .map_err(|e| Error::Decode(format!("token response: {e}")))?;

    if !envelope.done {
        return Err(Error::ServerRejected(envelope.errors));
    }
    if envelope.update_required {
        return Err(Error::RefreshRequired);
    }
    if !envelope.errors.is_null() {
        return Err(Error::ServerError(envelope.errors));
    }

    match envelope.data {
        Some(data) if !data.access_token.is_empty() => Ok(Token::from(data.access_token)),
        _ => Err(Error::TokenNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use tokio::net::TcpListener;
    use transport::{BoxFuture, HttpTransport};

    const OK_BODY: &str = r#"{"done":true,"errors":null,"updateRequired":false,"data":{"access_token":"abc123"}}"#;

    /// What the fake token endpoint saw.
    #[derive(Default)]
    struct Seen {
        calls: AtomicUsize,
        request: std::sync::Mutex<Option<(String, String, String)>>,
    }

    /// Start a token endpoint under `/api/v4/token` answering with a fixed
    /// status and body. Returns the API base URL.
    async fn start_token_server(status: u16, body: &'static str) -> (String, Arc<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Seen::default());

        let state = seen.clone();
        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/api/v4/token",
                axum::routing::any(move |method: axum::http::Method, headers: HeaderMap, form: String| {
                    let state = state.clone();
                    async move {
                        state.calls.fetch_add(1, Ordering::SeqCst);
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *state.request.lock().unwrap() =
                            Some((method.to_string(), content_type, form));
                        (AxumStatus::from_u16(status).unwrap(), body)
                    }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/api/v4"), seen)
    }

    /// Counts calls and forwards them to a real HTTP transport.
    struct CountingTransport {
        inner: HttpTransport,
        calls: AtomicUsize,
    }

    impl CountingTransport {
        fn new() -> Self {
            Self {
                inner: HttpTransport::new(Duration::from_secs(5)).unwrap(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for CountingTransport {
        fn execute<'a>(
            &'a self,
            request: reqwest::Request,
            cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<reqwest::Response>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(request, cancel)
        }
    }

    fn acquirer(base: &str) -> TokenAcquirer {
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
        TokenAcquirer::new(transport, base)
            .unwrap()
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn credential() -> Credential {
        Credential::with_default_client("user@example.com", "p@ss word")
    }

    /// A base URL whose port has no listener.
    async fn dead_base_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/api/v4")
    }

    #[tokio::test]
    async fn acquire_returns_token_and_sends_wire_format() {
        let (base, seen) = start_token_server(200, OK_BODY).await;
        let cancel = CancellationToken::new();

        let token = acquirer(&base).acquire(&credential(), &cancel).await.unwrap();
        assert_eq!(token.as_str(), "abc123");

        let (method, content_type, form) = seen.request.lock().unwrap().clone().unwrap();
        assert_eq!(method, "POST");
        assert_eq!(content_type, "application/x-www-form-urlencoded");
        assert_eq!(
            form,
            "grant_type=password&email=user%40example.com&password=p%40ss+word&clientId=sOJO7B6SqgaKudTfCzqLAy540cCuDzpI"
        );
        assert_eq!(seen.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_io() {
        let (base, seen) = start_token_server(200, OK_BODY).await;
        let cancel = CancellationToken::new();
        let acquirer = acquirer(&base);

        let err = acquirer
            .acquire(&Credential::with_default_client("", "secret"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials), "got: {err:?}");

        let err = acquirer
            .acquire(&Credential::with_default_client("user@example.com", ""), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials), "got: {err:?}");

        assert_eq!(seen.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_found_and_method_not_allowed_are_not_retried() {
        let cancel = CancellationToken::new();

        let (base, seen) = start_token_server(404, "").await;
        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::EndpointNotFound), "got: {err:?}");
        assert_eq!(seen.calls.load(Ordering::SeqCst), 1);

        let (base, seen) = start_token_server(405, "").await;
        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::MethodNotAllowed), "got: {err:?}");
        assert_eq!(seen.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_statuses_carry_the_code() {
        let (base, seen) = start_token_server(503, "maintenance").await;
        let cancel = CancellationToken::new();

        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus(503)), "got: {err:?}");
        assert_eq!(seen.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn done_false_is_server_rejected() {
        let (base, _) = start_token_server(200, r#"{"done":false,"errors":"invalid password"}"#).await;
        let cancel = CancellationToken::new();

        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        match err {
            Error::ServerRejected(errors) => assert_eq!(errors, "invalid password"),
            other => panic!("expected ServerRejected, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_required_is_refresh_required() {
        let (base, _) = start_token_server(
            200,
            r#"{"done":true,"errors":null,"updateRequired":true,"data":{"access_token":"abc123"}}"#,
        )
        .await;
        let cancel = CancellationToken::new();

        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::RefreshRequired), "got: {err:?}");
    }

    #[tokio::test]
    async fn errors_alongside_done_true_is_server_error() {
        let (base, _) = start_token_server(
            200,
            r#"{"done":true,"errors":["account locked"],"updateRequired":false,"data":{"access_token":"abc123"}}"#,
        )
        .await;
        let cancel = CancellationToken::new();

        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        match err {
            Error::ServerError(errors) => assert_eq!(errors[0], "account locked"),
            other => panic!("expected ServerError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_or_missing_access_token_is_token_not_found() {
        let cancel = CancellationToken::new();

        let (base, _) = start_token_server(
            200,
            r#"{"done":true,"errors":null,"updateRequired":false,"data":{"access_token":""}}"#,
        )
        .await;
        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::TokenNotFound), "got: {err:?}");

        let (base, _) = start_token_server(200, r#"{"done":true,"errors":null}"#).await;
        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::TokenNotFound), "got: {err:?}");
    }

    #[tokio::test]
    async fn malformed_json_is_decode_error() {
        let (base, _) = start_token_server(200, "<html>oops</html>").await;
        let cancel = CancellationToken::new();

        let err = acquirer(&base).acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn network_errors_are_retried_up_to_the_attempt_limit() {
        let base = dead_base_url().await;
        let transport = Arc::new(CountingTransport::new());
        let acquirer = TokenAcquirer::new(transport.clone(), &base)
            .unwrap()
            .with_retry(RetryPolicy::new(DEFAULT_RETRIES, Duration::from_millis(1)));
        let cancel = CancellationToken::new();

        let err = acquirer.acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)), "got: {err:?}");
        assert_eq!(transport.calls.load(Ordering::SeqCst), DEFAULT_RETRIES as usize);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_stops_retrying() {
        let base = dead_base_url().await;
        let transport = Arc::new(CountingTransport::new());
        let acquirer = TokenAcquirer::new(transport.clone(), &base)
            .unwrap()
            .with_retry(RetryPolicy::new(3, Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = acquirer.acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled), "got: {err:?}");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_while_reading_body_stops_promptly() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Headers and part of the body arrive, the rest never does
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 1000\r\n\r\n{\"done\":",
                        )
                        .await;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    drop(socket);
                });
            }
        });

        let transport = Arc::new(HttpTransport::new(Duration::from_secs(20)).unwrap());
        let acquirer = TokenAcquirer::new(transport, &format!("http://{addr}/api/v4")).unwrap();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = acquirer.acquire(&credential(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled), "got: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn debug_body_masks_access_token() {
        let logged = redacted(OK_BODY.as_bytes());
        assert!(!logged.contains("abc123"), "got: {logged}");
        assert!(logged.contains("[REDACTED]"));
        assert!(logged.contains("\"done\":true"));

        assert_eq!(redacted(b"<html>oops</html>"), "<html>oops</html>");
        assert_eq!(
            redacted(br#"{"done":false,"errors":"invalid password"}"#),
            r#"{"done":false,"errors":"invalid password"}"#
        );
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(300));
    }

    #[test]
    fn default_policy_matches_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.backoff_unit, Duration::from_secs(1));
    }

    #[test]
    fn token_url_joins_base_path() {
        let acquirer = acquirer("https://web.daichicloud.ru/api/v4");
        assert_eq!(
            acquirer.token_url().as_str(),
            "https://web.daichicloud.ru/api/v4/token"
        );
    }
}

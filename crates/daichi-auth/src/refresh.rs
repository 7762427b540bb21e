//! Token refresh strategies used by `AuthTransport` after a 401.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transport::BoxFuture;

use crate::Result;
use crate::credentials::{Credential, Token};
use crate::token::TokenAcquirer;

/// Produces a replacement token once the current one is rejected.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Token>>;
}

/// Refreshes by repeating the password grant with the client's credential.
///
/// The service has no refresh-token grant, so a "refresh" is a full login.
pub struct PasswordGrantRefresher {
    acquirer: Arc<TokenAcquirer>,
    credential: Credential,
}

impl PasswordGrantRefresher {
    pub fn new(acquirer: Arc<TokenAcquirer>, credential: Credential) -> Self {
        Self {
            acquirer,
            credential,
        }
    }
}

impl TokenRefresher for PasswordGrantRefresher {
    fn refresh<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Token>> {
        Box::pin(self.acquirer.acquire(&self.credential, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use transport::HttpTransport;

    #[tokio::test]
    async fn refresh_logs_in_again_with_the_stored_credential() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/token",
                axum::routing::post(|form: String| async move {
                    let token = if form.contains("email=owner%40example.com") {
                        "fresh-token"
                    } else {
                        ""
                    };
                    axum::Json(serde_json::json!({
                        "done": true,
                        "errors": null,
                        "updateRequired": false,
                        "data": {"access_token": token}
                    }))
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
        let acquirer = Arc::new(TokenAcquirer::new(transport, &format!("http://{addr}")).unwrap());
        let refresher = PasswordGrantRefresher::new(
            acquirer,
            Credential::with_default_client("owner@example.com", "secret"),
        );

        let cancel = CancellationToken::new();
        let token = refresher.refresh(&cancel).await.unwrap();
        assert_eq!(token.as_str(), "fresh-token");
    }

    #[tokio::test]
    async fn refresh_with_missing_credentials_fails_fast() {
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
        let acquirer = Arc::new(TokenAcquirer::new(transport, "http://127.0.0.1:9").unwrap());
        let refresher =
            PasswordGrantRefresher::new(acquirer, Credential::with_default_client("", ""));

        let cancel = CancellationToken::new();
        let err = refresher.refresh(&cancel).await.unwrap_err();
        assert!(matches!(err, crate::Error::MissingCredentials), "got: {err:?}");
    }
}

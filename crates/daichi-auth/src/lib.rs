//! Daichi cloud authentication
//!
//! Password-grant token acquisition, token storage and the authenticating
//! transport layer. The crate knows nothing about the resource endpoints;
//! callers stack `AuthTransport` over any `transport::Transport`.
//!
//! Token flow:
//! 1. `TokenAcquirer::acquire()` exchanges a `Credential` for a `Token`
//! 2. The caller stores it with `TokenStore::set()`
//! 3. `AuthTransport` attaches the stored token to every request
//! 4. On 401 it asks its `TokenRefresher` for a new token, stores it and
//!    replays the request once

pub mod auth_transport;
pub mod constants;
pub mod credentials;
pub mod refresh;
pub mod token;

pub use auth_transport::AuthTransport;
pub use constants::*;
pub use credentials::{Credential, Token, TokenStore};
pub use refresh::{PasswordGrantRefresher, TokenRefresher};
pub use token::{RetryPolicy, TokenAcquirer};
pub use transport::{Error, Result};

use reqwest::Url;

/// Join an API path onto a base URL, keeping the base's own path.
///
/// `https://host/api/v4` + `/token` gives `https://host/api/v4/token`.
/// Surrounding whitespace on either side is ignored.
pub fn endpoint(base: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim().trim_start_matches('/')
    );
    let url = Url::parse(&joined)
        .map_err(|e| Error::InvalidRequest(format!("invalid URL {joined}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidRequest(format!(
            "URL scheme must be http or https, got: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let url = endpoint(DEFAULT_API_URL, TOKEN_PATH).unwrap();
        assert_eq!(url.as_str(), "https://web.daichicloud.ru/api/v4/token");
    }

    #[test]
    fn endpoint_tolerates_slashes_and_whitespace() {
        let url = endpoint("https://web.daichicloud.ru/api/v4/ ", " buildings").unwrap();
        assert_eq!(url.as_str(), "https://web.daichicloud.ru/api/v4/buildings");
    }

    #[test]
    fn endpoint_rejects_garbage_and_non_http_schemes() {
        assert!(matches!(
            endpoint("not a url", "/user"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            endpoint("ftp://example.com", "/user"),
            Err(Error::InvalidRequest(_))
        ));
    }
}

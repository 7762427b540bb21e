//! Credential holder and token storage
//!
//! `Credential` is fixed at client construction. `TokenStore` is the single
//! slot holding the current bearer token: empty at start, overwritten on each
//! successful login or refresh, never persisted.

use std::fmt;

use common::Secret;
use tokio::sync::RwLock;

use crate::constants::DEFAULT_CLIENT_ID;
use crate::{Error, Result};

/// Login data for the password grant.
#[derive(Debug, Clone)]
pub struct Credential {
    client_id: String,
    username: String,
    password: Secret<String>,
}

impl Credential {
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret<String>>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credential for the public Daichi web client ID.
    pub fn with_default_client(
        username: impl Into<String>,
        password: impl Into<Secret<String>>,
    ) -> Self {
        Self::new(DEFAULT_CLIENT_ID, username, password)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Secret<String> {
        &self.password
    }

    /// Fails with `MissingCredentials` when username or password is empty.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.expose().is_empty() {
            return Err(Error::MissingCredentials);
        }
        Ok(())
    }
}

/// Opaque bearer token. Validity is only known from the server's answer.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token([REDACTED])")
    }
}

/// Thread-safe single-slot token holder.
///
/// Many concurrent readers or one writer. Readers clone the token out of the
/// lock so no guard is held across a network call.
#[derive(Debug, Default)]
pub struct TokenStore {
    slot: RwLock<Option<Token>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current token, `None` before the first login.
    pub async fn get(&self) -> Option<Token> {
        self.slot.read().await.clone()
    }

    /// Replace the current token.
    pub async fn set(&self, token: Token) {
        *self.slot.write().await = Some(token);
    }
}

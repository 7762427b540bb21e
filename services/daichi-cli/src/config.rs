//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The password is loaded from DAICHI_PASSWORD or password_file,
//! never stored in the TOML directly to avoid leaking secrets.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use breaker::{BreakerSettings, CircuitBreaker};
use common::Secret;
use daichi_auth::{DEFAULT_API_URL, DEFAULT_CLIENT_ID, DEFAULT_RETRIES};
use daichi_client::ClientConfig;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub breaker: BreakerSection,
}

/// Daichi cloud login
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to DAICHI_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// API client settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub base_url: String,
    pub client_id: String,
    pub retries: u32,
    pub timeout_secs: u64,
    pub debug: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            retries: DEFAULT_RETRIES,
            timeout_secs: 5,
            debug: false,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub max_requests: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        let defaults = BreakerSettings::default();
        Self {
            max_requests: defaults.max_requests,
            interval_secs: defaults.interval.as_secs(),
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. DAICHI_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.account.username.trim().is_empty() {
            return Err(common::Error::Config(
                "account.username must not be empty".into(),
            ));
        }

        if !config.client.base_url.starts_with("http://")
            && !config.client.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.client.base_url
            )));
        }

        if config.client.retries == 0 {
            return Err(common::Error::Config(
                "retries must be greater than 0".into(),
            ));
        }

        if config.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "client.timeout_secs must be greater than 0".into(),
            ));
        }

        if config.breaker.max_requests == 0 {
            return Err(common::Error::Config(
                "breaker.max_requests must be greater than 0".into(),
            ));
        }

        let password = if let Ok(password) = std::env::var("DAICHI_PASSWORD") {
            Secret::new(password)
        } else if let Some(ref password_file) = config.account.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            Secret::new(password.trim().to_owned())
        } else {
            return Err(common::Error::Config(
                "no password: set DAICHI_PASSWORD or account.password_file".into(),
            ));
        };
        if password.is_blank() {
            return Err(common::Error::Config("password must not be empty".into()));
        }
        config.account.password = Some(password);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or DAICHI_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("DAICHI_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("daichi.toml")
    }

    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings::default()
            .max_requests(self.breaker.max_requests)
            .interval(Duration::from_secs(self.breaker.interval_secs))
            .timeout(Duration::from_secs(self.breaker.timeout_secs))
    }

    /// Client options for this file, using `breaker` for every call.
    pub fn client_config(&self, breaker: Arc<CircuitBreaker>) -> daichi_client::Result<ClientConfig> {
        let password = self
            .account
            .password
            .clone()
            .unwrap_or_else(|| Secret::from(""));

        ClientConfig::builder()
            .base_url(&self.client.base_url)
            .client_id(&self.client.client_id)
            .credentials(&self.account.username, password)
            .retries(self.client.retries)
            .request_timeout(Duration::from_secs(self.client.timeout_secs))
            .debug(self.client.debug)
            .circuit_breaker(breaker)
            .build()
    }
}

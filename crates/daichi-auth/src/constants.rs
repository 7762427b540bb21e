//! Daichi cloud API constants
//!
//! Public client configuration matching the official web client. The client
//! ID identifies the application, not the user; the secrets are the user's
//! password and the bearer token obtained with it.

use std::time::Duration;

/// Base URL of the Daichi cloud REST API
pub const DEFAULT_API_URL: &str = "https://web.daichicloud.ru/api/v4";

/// Password-grant token endpoint, relative to the API base
pub const TOKEN_PATH: &str = "/token";

/// Current user profile, relative to the API base
pub const USER_INFO_PATH: &str = "/user";

/// Buildings with their devices, relative to the API base
pub const BUILDINGS_PATH: &str = "/buildings";

/// Public client ID of the Daichi web application
pub const DEFAULT_CLIENT_ID: &str = "sOJO7B6SqgaKudTfCzqLAy540cCuDzpI";

/// Attempts made for a token fetch that fails below HTTP
pub const DEFAULT_RETRIES: u32 = 3;

/// Time unit of the linear backoff between token fetch attempts
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Upper bound for the initial login, independent of the caller's deadline
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

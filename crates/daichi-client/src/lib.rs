//! Daichi cloud client
//!
//! Ties the auth layer and the circuit breaker into one authorized client:
//!
//! ```no_run
//! # async fn run() -> daichi_client::Result<()> {
//! use daichi_client::{AuthorizedClient, ClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ClientConfig::builder()
//!     .credentials("user@example.com", "password")
//!     .build()?;
//! let cancel = CancellationToken::new();
//! let client = AuthorizedClient::connect(config, &cancel).await?;
//! let buildings = client.buildings(&cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod models;

pub use client::AuthorizedClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use models::{Building, MqttUser, Place, User};
pub use transport::{Error, Result};

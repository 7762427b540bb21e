//! Error types for breaker configuration

/// Errors from breaker construction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid breaker settings: {0}")]
    InvalidSettings(String),
}

/// Result alias for breaker operations.
pub type Result<T> = std::result::Result<T, Error>;

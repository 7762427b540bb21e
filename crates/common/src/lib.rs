//! Common types shared by the Daichi cloud client crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};

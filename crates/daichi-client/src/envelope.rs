//! `{done, errors, data}` response envelope

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    errors: Value,
    #[serde(default)]
    data: Value,
}

/// Decode a resource response body and return its payload.
///
/// `done=false` is `ServerRejected`; `done=true` with non-null `errors` is
/// `ServerError`. The payload is decoded only after both checks pass.
pub fn unwrap<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| Error::Decode(e.to_string()))?;

    if !envelope.done {
        return Err(Error::ServerRejected(envelope.errors));
    }
    if !envelope.errors.is_null() {
        return Err(Error::ServerError(envelope.errors));
    }

    serde_json::from_value(envelope.data).map_err(|e| Error::Decode(e.to_string()))
}

//! CBOR encoding helpers.
//!
//! Every sealed payload and every stored record goes through these two
//! functions so that encoding failures surface as [`CoreError`] rather than
//! panics.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

/// Encode a value as CBOR.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

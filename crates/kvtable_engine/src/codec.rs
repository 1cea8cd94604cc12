//! Stored form of records.
//!
//! Records are kept as CBOR bytes so that every read hands out a detached
//! copy and writes cannot alias stored state.

use crate::error::{EngineError, EngineResult};
use bytes::Bytes;
use serde_json::Value;

/// Encodes a record to its stored form.
///
/// # Errors
///
/// Returns `Codec` if the record cannot be serialized.
pub fn encode_record(value: &Value) -> EngineResult<Bytes> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| EngineError::codec(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decodes a stored record.
///
/// # Errors
///
/// Returns `Codec` if the bytes are not a valid record.
pub fn decode_record(bytes: &[u8]) -> EngineResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| EngineError::codec(e.to_string()))
}

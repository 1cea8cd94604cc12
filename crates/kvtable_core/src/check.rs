//! Argument checks run before any engine request.
//!
//! Each check returns the value in its checked shape, or a
//! [`CoreError::Validation`] naming the offending value.

use crate::error::{CoreError, CoreResult};
use kvtable_engine::Key;
use serde_json::{Map, Value};

/// Rejects `null`.
pub fn not_null(value: &Value) -> CoreResult<&Value> {
    if value.is_null() {
        Err(CoreError::validation("invalid null value"))
    } else {
        Ok(value)
    }
}

/// Requires an object.
pub fn must_object(value: &Value) -> CoreResult<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| CoreError::validation(format!("value must be object: {value}")))
}

/// Requires a key the engine accepts: no NaN anywhere inside it.
///
/// Empty strings and zero are valid keys.
pub fn valid_key(key: &Key) -> CoreResult<&Key> {
    key.validate()
        .map(|()| key)
        .map_err(|_| CoreError::validation(format!("invalid key: {key}")))
}

/// Converts a record field into a key.
pub fn key_from_value(value: &Value) -> CoreResult<Key> {
    Key::from_json(value).ok_or_else(|| CoreError::validation(format!("value is not a key: {value}")))
}

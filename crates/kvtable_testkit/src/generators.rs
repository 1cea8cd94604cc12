//! Property-based test generators using proptest.
//!
//! Keys are kept free of NaN so every generated key is valid.

use kvtable_engine::Key;
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for scalar keys of every type.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        (-1.0e9f64..1.0e9).prop_map(Key::Number),
        any::<i32>().prop_map(Key::from),
        "[a-z0-9]{0,8}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Key::bytes),
    ]
}

/// Strategy for keys, nesting arrays up to two levels.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    scalar_key_strategy().prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Key::array)
    })
}

/// Strategy for text primary keys, the kind tables mirror.
pub fn text_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// Strategy for table records keyed by `uuid` with a small `title`
/// vocabulary so index lookups find several matches.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    (text_key_strategy(), prop::sample::select(vec!["red", "green", "blue"]), any::<i16>())
        .prop_map(|(uuid, title, size)| json!({"uuid": uuid, "title": title, "size": size}))
}

/// Strategy for batches of records with distinct keys.
pub fn records_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_map(text_key_strategy(), record_strategy(), 0..max).prop_map(|records| {
        records
            .into_iter()
            .map(|(uuid, mut record)| {
                record["uuid"] = Value::String(uuid);
                record
            })
            .collect()
    })
}

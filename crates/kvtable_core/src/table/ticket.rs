//! Optimistic version marker carried by table records.
//!
//! Fresh records carry `-1`. Each update moves the marker one further below
//! zero, so a reader holding an older copy can tell it is stale by comparing
//! markers. A stored marker that is missing, not an integer, or not negative
//! restarts the sequence at `-1`.

use crate::error::{CoreError, CoreResult};
use serde_json::Value;

/// Field holding the marker.
pub const TICKET_FIELD: &str = "ticket";

/// Marker of a record that was just added.
pub const FRESH_TICKET: i64 = -1;

/// Marker for the next version of `current`.
#[must_use]
pub fn next_ticket(current: Option<&Value>) -> i64 {
    match current.and_then(read_ticket) {
        Some(ticket) if ticket < 0 => ticket.saturating_sub(1),
        _ => FRESH_TICKET,
    }
}

/// Marker stored on a record, if it is an integer.
#[must_use]
pub fn read_ticket(record: &Value) -> Option<i64> {
    record.get(TICKET_FIELD).and_then(Value::as_i64)
}

/// Writes the marker into a record.
///
/// # Errors
///
/// Returns `Validation` if the record is not an object.
pub fn stamp(record: &mut Value, ticket: i64) -> CoreResult<()> {
    let fields = record
        .as_object_mut()
        .ok_or_else(|| CoreError::validation("table records must be objects"))?;
    fields.insert(TICKET_FIELD.to_string(), Value::from(ticket));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence() {
        assert_eq!(next_ticket(None), -1);
        assert_eq!(next_ticket(Some(&json!({}))), -1);
        assert_eq!(next_ticket(Some(&json!({"ticket": 0}))), -1);
        assert_eq!(next_ticket(Some(&json!({"ticket": 7}))), -1);
        assert_eq!(next_ticket(Some(&json!({"ticket": "x"}))), -1);
        assert_eq!(next_ticket(Some(&json!({"ticket": -1}))), -2);
        assert_eq!(next_ticket(Some(&json!({"ticket": -41}))), -42);
    }

    #[test]
    fn saturates() {
        assert_eq!(next_ticket(Some(&json!({"ticket": i64::MIN}))), i64::MIN);
    }

    #[test]
    fn stamp_needs_an_object() {
        let mut record = json!({"a": 1});
        stamp(&mut record, -3).unwrap();
        assert_eq!(read_ticket(&record), Some(-3));
        assert!(stamp(&mut json!([1]), -1).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn updates_always_go_below_the_previous(start in any::<i64>(), steps in 1usize..20) {
                let mut record = json!({"ticket": start});
                let mut last = read_ticket(&record).unwrap();
                for _ in 0..steps {
                    let next = next_ticket(Some(&record));
                    prop_assert!(next < 0);
                    prop_assert!(last >= 0 || next < last || last == i64::MIN);
                    stamp(&mut record, next).unwrap();
                    last = next;
                }
            }
        }
    }
}

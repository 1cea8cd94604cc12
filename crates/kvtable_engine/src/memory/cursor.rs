//! Cursors of the memory engine.

use super::transaction::MemoryTransaction;
use crate::backend::{EngineTransaction, RawCursor, RawEntry};
use crate::error::EngineError;
use crate::key::{Key, KeyRange};
use crate::request::Request;
use crate::types::{CursorDirection, Source};
use serde_json::Value;
use std::sync::Arc;

/// A cursor that re-seeks live data from its last position on every step,
/// so records written behind or ahead of it are observed.
#[derive(Debug)]
pub struct MemoryCursor {
    txn: Arc<MemoryTransaction>,
    source: Source,
    range: KeyRange,
    direction: CursorDirection,
    key_only: bool,
    current: Option<RawEntry>,
}

impl MemoryCursor {
    pub(crate) fn new(
        txn: Arc<MemoryTransaction>,
        source: Source,
        range: KeyRange,
        direction: CursorDirection,
        key_only: bool,
        first: RawEntry,
    ) -> Self {
        Self {
            txn,
            source,
            range,
            direction,
            key_only,
            current: Some(first),
        }
    }
}

impl RawCursor for MemoryCursor {
    fn current(&self) -> Option<RawEntry> {
        self.current.clone()
    }

    fn advance(&mut self) -> Request<Option<RawEntry>> {
        let Some(current) = self.current.as_ref() else {
            return Request::ready(Ok(None));
        };
        let next = self.txn.step(
            &self.source,
            &self.range,
            self.direction,
            Some((&current.key, &current.primary_key)),
            self.key_only,
        );
        if let Ok(entry) = &next {
            self.current = entry.clone();
        }
        Request::ready(next)
    }

    fn update(&mut self, value: Value) -> Request<Key> {
        let Some(current) = self.current.as_mut() else {
            return Request::ready(Err(EngineError::invalid_state(
                "cursor is not positioned on a record",
            )));
        };
        let request = self
            .txn
            .put(self.source.store_name(), &current.primary_key, &value);
        if !self.key_only {
            current.value = Some(value);
        }
        request
    }
}

//! Cursor iteration.
//!
//! A [`Cursor`] hands out one entry per engine request. The `for_each` driver
//! feeds entries to a handler that decides, per entry, whether iteration goes
//! on; the handler may rewrite the current record through a
//! [`CursorUpdater`] before deciding.

use crate::error::{CoreError, CoreResult};
use crate::request::settle;
use crate::transaction::Transaction;
use kvtable_engine::{Key, RawCursor, RawEntry};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// What a cursor handler wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Advance to the next entry.
    #[default]
    Continue,
    /// Stop without advancing.
    Stop,
}

impl From<()> for Flow {
    fn from((): ()) -> Self {
        Flow::Continue
    }
}

impl From<bool> for Flow {
    fn from(go_on: bool) -> Self {
        if go_on {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }
}

/// One cursor position.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorEntry {
    /// Key in the cursor's source: primary key for stores, index key for
    /// indexes.
    pub key: Key,
    /// Primary key of the record.
    pub primary_key: Key,
    /// The record; `None` on key cursors.
    pub value: Option<Value>,
}

impl From<RawEntry> for CursorEntry {
    fn from(raw: RawEntry) -> Self {
        Self {
            key: raw.key,
            primary_key: raw.primary_key,
            value: raw.value,
        }
    }
}

type SharedCursor = Arc<Mutex<Box<dyn RawCursor>>>;

/// An open cursor.
pub struct Cursor {
    raw: Option<SharedCursor>,
    started: bool,
    finished: bool,
    txn: Transaction,
}

impl Cursor {
    pub(crate) fn new(raw: Option<Box<dyn RawCursor>>, txn: Transaction) -> Self {
        Self {
            finished: raw.is_none(),
            raw: raw.map(|raw| Arc::new(Mutex::new(raw))),
            started: false,
            txn,
        }
    }

    /// The transaction the cursor runs in.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Moves to the next entry; `None` once exhausted.
    ///
    /// The first call returns the entry the cursor opened on.
    pub async fn next(&mut self) -> CoreResult<Option<CursorEntry>> {
        if self.finished {
            return Ok(None);
        }
        let Some(raw) = self.raw.as_ref() else {
            return Ok(None);
        };
        let entry = if self.started {
            let request = raw.lock().advance();
            settle("cursor.continue", request).await?
        } else {
            self.started = true;
            raw.lock().current()
        };
        if entry.is_none() {
            self.finished = true;
        }
        Ok(entry.map(CursorEntry::from))
    }

    /// Replaces the record at the current position.
    pub async fn update_current(&self, value: Value) -> CoreResult<Key> {
        match self.updater() {
            Some(updater) => updater.update(value).await,
            None => Err(CoreError::invalid_operation("cursor has no current entry")),
        }
    }

    /// Owned handle for updating the current position.
    #[must_use]
    pub fn updater(&self) -> Option<CursorUpdater> {
        self.raw.as_ref().map(|raw| CursorUpdater {
            raw: Arc::clone(raw),
        })
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("started", &self.started)
            .field("finished", &self.finished)
            .field("txn", &self.txn)
            .finish_non_exhaustive()
    }
}

/// Updates the record a cursor is positioned on.
#[derive(Clone)]
pub struct CursorUpdater {
    raw: SharedCursor,
}

impl CursorUpdater {
    /// Writes `value` at the current position and resolves to its primary
    /// key.
    pub async fn update(&self, value: Value) -> CoreResult<Key> {
        let request = self.raw.lock().update(value);
        settle("cursor.update", request).await
    }
}

impl std::fmt::Debug for CursorUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CursorUpdater")
    }
}

/// Feeds every entry of `cursor` to `handler` until it returns
/// [`Flow::Stop`], fails, or the cursor is exhausted.
pub async fn for_each<F, Fut, R>(mut cursor: Cursor, mut handler: F) -> CoreResult<()>
where
    F: FnMut(CursorEntry, CursorUpdater) -> Fut,
    Fut: Future<Output = CoreResult<R>>,
    R: Into<Flow>,
{
    let Some(updater) = cursor.updater() else {
        return Ok(());
    };
    while let Some(entry) = cursor.next().await? {
        let flow: Flow = handler(entry, updater.clone()).await?.into();
        if flow == Flow::Stop {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_conversions() {
        assert_eq!(Flow::from(()), Flow::Continue);
        assert_eq!(Flow::from(true), Flow::Continue);
        assert_eq!(Flow::from(false), Flow::Stop);
        assert_eq!(Flow::default(), Flow::Continue);
    }
}

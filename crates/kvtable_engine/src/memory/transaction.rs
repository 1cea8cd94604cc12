//! Transactions of the memory engine.

use super::cursor::MemoryCursor;
use super::DatabaseState;
use crate::backend::{EngineTransaction, RawCursor, RawEntry};
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyQuery, KeyRange};
use crate::memory::store::{IndexData, StoreData};
use crate::request::Request;
use crate::types::{CursorDirection, Source, TransactionId, TransactionMode, TransactionState};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Write captured for rollback.
#[derive(Debug)]
struct Undo {
    store: String,
    key: Key,
    previous: Option<Bytes>,
}

#[derive(Debug)]
struct TxnInner {
    state: TransactionState,
    undo: Vec<Undo>,
    /// Bumped by every request; an idle check commits only if it is unchanged.
    generation: u64,
}

/// A transaction of the [`MemoryEngine`](super::MemoryEngine).
///
/// Writes apply to the shared store immediately and are rolled back from an
/// undo log on abort, so concurrent transactions see each other's uncommitted
/// writes.
///
/// # Auto-commit
///
/// Each request spawns an idle check on the current tokio runtime. The check
/// yields once and commits if no newer request was issued in the meantime.
/// This matches the host engine model only on a current-thread runtime; with
/// no runtime the transaction stays open until `commit` or `abort`.
#[derive(Debug)]
pub struct MemoryTransaction {
    id: TransactionId,
    mode: TransactionMode,
    scope: Vec<String>,
    db: Arc<DatabaseState>,
    inner: Mutex<TxnInner>,
    this: Weak<MemoryTransaction>,
}

impl MemoryTransaction {
    pub(crate) fn start(
        db: Arc<DatabaseState>,
        id: TransactionId,
        scope: Vec<String>,
        mode: TransactionMode,
    ) -> Arc<Self> {
        let txn = Arc::new_cyclic(|this| Self {
            id,
            mode,
            scope,
            db,
            inner: Mutex::new(TxnInner {
                state: TransactionState::Active,
                undo: Vec::new(),
                generation: 0,
            }),
            this: this.clone(),
        });
        debug!(txn = %id, mode = ?mode, "transaction started");
        txn.schedule_idle_commit(0);
        txn
    }

    /// Checks a request against the transaction state and scope, then marks
    /// the transaction busy.
    fn begin(&self, store: &str, write: bool) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.is_finished() {
            return Err(EngineError::TransactionFinished { id: self.id });
        }
        if !self.scope.iter().any(|s| s == store) {
            return Err(EngineError::NotInScope {
                id: self.id,
                store: store.to_string(),
            });
        }
        if write && self.mode == TransactionMode::ReadOnly {
            return Err(EngineError::ReadOnly { id: self.id });
        }
        inner.generation += 1;
        let generation = inner.generation;
        drop(inner);
        self.schedule_idle_commit(generation);
        Ok(())
    }

    fn schedule_idle_commit(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Some(txn) = self.this.upgrade() else {
            return;
        };
        handle.spawn(async move {
            tokio::task::yield_now().await;
            txn.commit_if_idle(generation);
        });
    }

    fn commit_if_idle(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.state == TransactionState::Active && inner.generation == generation {
            inner.state = TransactionState::Committed;
            inner.undo.clear();
            debug!(txn = %self.id, "transaction auto-committed");
        }
    }

    fn read<T>(
        &self,
        source: &Source,
        f: impl FnOnce(&StoreData, Option<&IndexData>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.begin(source.store_name(), false)?;
        let stores = self.db.stores.read();
        let store = stores
            .get(source.store_name())
            .ok_or_else(|| EngineError::StoreNotFound {
                name: source.store_name().to_string(),
            })?;
        let index = match source {
            Source::Store(_) => None,
            Source::Index { store: name, index } => {
                Some(store.index(index).ok_or_else(|| EngineError::IndexNotFound {
                    store: name.clone(),
                    index: index.clone(),
                })?)
            }
        };
        f(store, index)
    }

    fn write<T>(&self, store: &str, f: impl FnOnce(&mut StoreData, &mut Vec<Undo>) -> EngineResult<T>) -> EngineResult<T> {
        self.begin(store, true)?;
        let mut stores = self.db.stores.write();
        let data = stores
            .get_mut(store)
            .ok_or_else(|| EngineError::StoreNotFound {
                name: store.to_string(),
            })?;
        let mut undo = Vec::new();
        let result = f(data, &mut undo);
        self.inner.lock().undo.extend(undo);
        result
    }

    /// Moves a cursor one step from `position`.
    pub(crate) fn step(
        &self,
        source: &Source,
        range: &KeyRange,
        direction: CursorDirection,
        position: Option<(&Key, &Key)>,
        key_only: bool,
    ) -> EngineResult<Option<RawEntry>> {
        self.read(source, |store, index| {
            match store.seek(index, range, direction, position) {
                Some((key, primary_key)) => entry(store, key, primary_key, key_only).map(Some),
                None => Ok(None),
            }
        })
    }
}

fn entry(store: &StoreData, key: Key, primary_key: Key, key_only: bool) -> EngineResult<RawEntry> {
    let value = if key_only {
        None
    } else {
        store.record(&primary_key)?
    };
    Ok(RawEntry {
        key,
        primary_key,
        value,
    })
}

fn first_record(
    store: &StoreData,
    index: Option<&IndexData>,
    range: &KeyRange,
) -> EngineResult<Option<Value>> {
    let first = store.pairs(index, range).next().map(|(_, pk)| pk.clone());
    match first {
        Some(pk) => store.record(&pk),
        None => Ok(None),
    }
}

fn limit(count: Option<u32>) -> usize {
    match count {
        None | Some(0) => usize::MAX,
        Some(n) => n as usize,
    }
}

fn to_range(query: Option<&KeyQuery>) -> EngineResult<KeyRange> {
    let range = query.map_or_else(KeyRange::all, KeyQuery::to_range);
    range.validate()?;
    Ok(range)
}

impl EngineTransaction for MemoryTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    fn scope(&self) -> Vec<String> {
        self.scope.clone()
    }

    fn commit(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.is_finished() {
            return Err(EngineError::TransactionFinished { id: self.id });
        }
        inner.state = TransactionState::Committed;
        inner.undo.clear();
        debug!(txn = %self.id, "transaction committed");
        Ok(())
    }

    fn abort(&self) -> EngineResult<()> {
        let undo = {
            let mut inner = self.inner.lock();
            if inner.state.is_finished() {
                return Err(EngineError::TransactionFinished { id: self.id });
            }
            inner.state = TransactionState::Aborted;
            std::mem::take(&mut inner.undo)
        };
        let mut stores = self.db.stores.write();
        for entry in undo.into_iter().rev() {
            let Some(data) = stores.get_mut(&entry.store) else {
                continue;
            };
            if let Err(e) = data.restore(entry.key, entry.previous) {
                warn!(txn = %self.id, store = %entry.store, error = %e, "rollback of one write failed");
            }
        }
        debug!(txn = %self.id, "transaction aborted");
        Ok(())
    }

    fn get(&self, source: &Source, query: &KeyQuery) -> Request<Option<Value>> {
        Request::ready(to_range(Some(query)).and_then(|range| {
            self.read(source, |store, index| first_record(store, index, &range))
        }))
    }

    fn get_all(
        &self,
        source: &Source,
        query: Option<&KeyQuery>,
        count: Option<u32>,
    ) -> Request<Vec<Value>> {
        Request::ready(to_range(query).and_then(|range| {
            self.read(source, |store, index| {
                store
                    .pairs(index, &range)
                    .take(limit(count))
                    .filter_map(|(_, pk)| store.record(pk).transpose())
                    .collect()
            })
        }))
    }

    fn get_all_keys(
        &self,
        source: &Source,
        query: Option<&KeyQuery>,
        count: Option<u32>,
    ) -> Request<Vec<Key>> {
        Request::ready(to_range(query).and_then(|range| {
            self.read(source, |store, index| {
                Ok(store
                    .pairs(index, &range)
                    .take(limit(count))
                    .map(|(_, pk)| pk.clone())
                    .collect())
            })
        }))
    }

    fn get_key(&self, source: &Source, query: &KeyQuery) -> Request<Option<Key>> {
        Request::ready(to_range(Some(query)).and_then(|range| {
            self.read(source, |store, index| {
                Ok(store.pairs(index, &range).next().map(|(_, pk)| pk.clone()))
            })
        }))
    }

    fn count(&self, source: &Source, query: Option<&KeyQuery>) -> Request<u64> {
        Request::ready(to_range(query).and_then(|range| {
            self.read(source, |store, index| Ok(store.pairs(index, &range).count() as u64))
        }))
    }

    fn open_cursor(
        &self,
        source: &Source,
        query: Option<&KeyQuery>,
        direction: CursorDirection,
        key_only: bool,
    ) -> Request<Option<Box<dyn RawCursor>>> {
        let opened = to_range(query).and_then(|range| {
            let txn = self
                .this
                .upgrade()
                .ok_or_else(|| EngineError::invalid_state("transaction dropped"))?;
            let first = self.step(source, &range, direction, None, key_only)?;
            Ok(first.map(|entry| {
                Box::new(MemoryCursor::new(txn, source.clone(), range, direction, key_only, entry))
                    as Box<dyn RawCursor>
            }))
        });
        Request::ready(opened)
    }

    fn put(&self, store: &str, key: &Key, value: &Value) -> Request<Key> {
        Request::ready(key.validate().and_then(|()| {
            self.write(store, |data, undo| {
                let previous = data.put(key.clone(), value)?;
                undo.push(Undo {
                    store: store.to_string(),
                    key: key.clone(),
                    previous,
                });
                Ok(key.clone())
            })
        }))
    }

    fn delete(&self, store: &str, query: &KeyQuery) -> Request<()> {
        Request::ready(to_range(Some(query)).and_then(|range| {
            self.write(store, |data, undo| {
                let keys: Vec<Key> = data.pairs(None, &range).map(|(k, _)| k.clone()).collect();
                for key in keys {
                    let previous = data.remove(&key)?;
                    undo.push(Undo {
                        store: store.to_string(),
                        key,
                        previous,
                    });
                }
                Ok(())
            })
        }))
    }

    fn clear(&self, store: &str) -> Request<()> {
        Request::ready(self.write(store, |data, undo| {
            for key in data.keys() {
                let previous = data.remove(&key)?;
                undo.push(Undo {
                    store: store.to_string(),
                    key,
                    previous,
                });
            }
            Ok(())
        }))
    }
}

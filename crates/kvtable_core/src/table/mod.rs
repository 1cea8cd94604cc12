//! Tables: a store, its indexes and optional process mirrors.
//!
//! A [`Table`] writes to the store first and touches its mirror only after
//! the engine accepted the write, so the store stays authoritative. Single
//! writes report engine failures as `false`/`None` after logging them; batch
//! writes report them per item.
//!
//! Only text primary keys are mirrored. Reads that need the whole collection
//! (all records, all keys, index equality) are served from the mirror only
//! once [`Table::hydrate`] loaded it; a point read that misses the mirror
//! goes to the store and does not populate the mirror.
//! Writing a record under a non-text key drops the hydrated mark, sending
//! those reads back to the store.

mod ticket;

pub use ticket::{next_ticket, read_ticket, stamp, FRESH_TICKET, TICKET_FIELD};

use crate::cache::{CacheNamespace, ProcessCaches};
use crate::check::{key_from_value, must_object, not_null, valid_key};
use crate::config::TableConfig;
use crate::cursor::{CursorUpdater, Flow};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::query::{Index, Store};
use crate::request::exec;
use crate::schema::SchemaItem;
use crate::transaction::Transaction;
use bytes::Bytes;
use kvtable_engine::{CursorDirection, Key, KeyPath, KeyQuery, KeyRange, TransactionMode};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, warn};

/// Failure of one item of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
    /// Key of the item, when one could be determined.
    pub key: Option<Key>,
    /// Why the item failed.
    pub error: CoreError,
}

/// Outcome counts of a batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Items written.
    pub succeeded: usize,
    /// Items reported through the error callback.
    pub failed: usize,
}

/// A table over one store.
pub struct Table {
    db: Database,
    config: TableConfig,
    store: Store,
    primary: Index,
    indexes: BTreeMap<String, Index>,
    caches: ProcessCaches,
    mirror: RwLock<Option<CacheNamespace<Value>>>,
    buffer: RwLock<Option<CacheNamespace<Bytes>>>,
}

fn mirror_key(key: &Key) -> Option<&str> {
    key.as_text()
}

fn checked_record(value: &Value) -> CoreResult<()> {
    must_object(not_null(value)?)?;
    Ok(())
}

impl Table {
    /// Creates a table. The mirrors named in `config` are attached to their
    /// namespaces in `caches`, creating them if needed.
    pub fn new(db: Database, config: TableConfig, caches: &ProcessCaches) -> Self {
        let store = db.store(&config.store);
        let primary = db.index(&config.store, &config.primary_index.name);
        let indexes = config
            .indexes
            .iter()
            .map(|index| (index.name.clone(), db.index(&config.store, &index.name)))
            .collect();
        let mirror = config
            .mirror
            .as_ref()
            .map(|m| caches.values.namespace(&m.namespace));
        let buffer = config
            .buffer
            .as_ref()
            .map(|b| caches.buffers.namespace(&b.namespace));
        Self {
            db,
            store,
            primary,
            indexes,
            caches: caches.clone(),
            mirror: RwLock::new(mirror),
            buffer: RwLock::new(buffer),
            config,
        }
    }

    /// Table declaration.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Record field carrying the primary key.
    #[must_use]
    pub fn key_field(&self) -> &str {
        &self.config.key_field
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The primary-key index.
    #[must_use]
    pub fn primary_key(&self) -> &Index {
        &self.primary
    }

    /// Secondary indexes by name.
    #[must_use]
    pub fn indexes(&self) -> &BTreeMap<String, Index> {
        &self.indexes
    }

    /// Schema objects this table needs.
    #[must_use]
    pub fn schema_items(&self) -> Vec<SchemaItem> {
        SchemaItem::for_table(&self.config)
    }

    /// The value mirror, unless absent or released.
    #[must_use]
    pub fn mirror(&self) -> Option<CacheNamespace<Value>> {
        self.mirror.read().clone()
    }

    /// The binary mirror, unless absent or released.
    #[must_use]
    pub fn buffer(&self) -> Option<CacheNamespace<Bytes>> {
        self.buffer.read().clone()
    }

    /// Index by name, primary included.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` if the table declares no such index.
    pub fn index(&self, name: &str) -> CoreResult<&Index> {
        if name == self.primary.name() {
            return Ok(&self.primary);
        }
        self.indexes.get(name).ok_or_else(|| CoreError::UnknownIndex {
            store: self.config.store.clone(),
            index: name.to_string(),
        })
    }

    fn key_path(&self, name: &str) -> Option<&KeyPath> {
        self.config.find_index(name).map(|index| &index.key_path)
    }

    fn hydrated_mirror(&self) -> Option<CacheNamespace<Value>> {
        self.mirror().filter(CacheNamespace::is_hydrated)
    }

    fn store_name(&self) -> &str {
        &self.config.store
    }

    fn remember(&self, key: &Key, value: &Value) {
        let Some(mirror) = self.mirror() else {
            return;
        };
        match mirror_key(key) {
            Some(text) => {
                mirror.set(text, value.clone());
            }
            None => self.lose_completeness(&mirror, key),
        }
    }

    fn forget(&self, key: &Key) {
        let Some(mirror) = self.mirror() else {
            return;
        };
        match mirror_key(key) {
            Some(text) => {
                mirror.del(text);
            }
            None => self.lose_completeness(&mirror, key),
        }
    }

    // The mirror can no longer answer whole-collection reads.
    fn lose_completeness(&self, mirror: &CacheNamespace<Value>, key: &Key) {
        if mirror.is_hydrated() {
            mirror.unmark_hydrated();
            debug!(store = %self.store_name(), key = %key, "non-text key written, mirror no longer complete");
        }
    }

    fn recall(&self, key: &Key) -> Option<Value> {
        let text = mirror_key(key)?;
        self.mirror()?.get(text)
    }

    /// Record under `key`: from the mirror when present there, else from the
    /// store in a throwaway read-only transaction.
    pub async fn get(&self, key: impl Into<Key>) -> CoreResult<Option<Value>> {
        let key = key.into();
        valid_key(&key)?;
        if let Some(value) = self.recall(&key) {
            return Ok(Some(value));
        }
        let tx = self.db.transaction(&[self.store_name()], TransactionMode::ReadOnly)?;
        let found = self.store.get(key, Some(&tx)).await;
        let _ = tx.abort();
        found
    }

    /// Several records; keys with no record are skipped. Mirror hits are
    /// served first, the rest is read in one read-only transaction. Results
    /// keep the order of `keys`.
    pub async fn get_lots(&self, keys: &[Key]) -> CoreResult<Vec<Value>> {
        for key in keys {
            valid_key(key)?;
        }
        let mut found: Vec<Option<Value>> = keys.iter().map(|key| self.recall(key)).collect();
        if found.iter().any(Option::is_none) {
            let tx = self.db.transaction(&[self.store_name()], TransactionMode::ReadOnly)?;
            for (slot, key) in found.iter_mut().zip(keys) {
                if slot.is_none() {
                    *slot = self.store.get(key.clone(), Some(&tx)).await?;
                }
            }
            let _ = tx.abort();
        }
        Ok(found.into_iter().flatten().collect())
    }

    /// First record whose `index` key matches `query`.
    pub async fn get_by_index_name(
        &self,
        index: &str,
        query: impl Into<KeyQuery>,
    ) -> CoreResult<Option<Value>> {
        self.index(index)?.get(query, None).await
    }

    /// Records with primary keys between `lower` and `upper`.
    pub async fn get_all_arr_bound(
        &self,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Vec<Value>> {
        self.store
            .get_all_bound(lower, upper, lower_open, upper_open, None)
            .await
    }

    /// Records with `index` keys between `lower` and `upper`.
    pub async fn get_all_arr_bound_by_index_name(
        &self,
        index: &str,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Vec<Value>> {
        self.index(index)?
            .get_all_bound(lower, upper, lower_open, upper_open, None)
            .await
    }

    /// Records with `index` keys above `lower`.
    pub async fn get_all_arr_lb_by_index_name(
        &self,
        index: &str,
        lower: impl Into<Key>,
        open: bool,
    ) -> CoreResult<Vec<Value>> {
        self.index(index)?.get_all_lb(lower, open, None).await
    }

    /// Records with `index` keys below `upper`.
    pub async fn get_all_arr_ub_by_index_name(
        &self,
        index: &str,
        upper: impl Into<Key>,
        open: bool,
    ) -> CoreResult<Vec<Value>> {
        self.index(index)?.get_all_ub(upper, open, None).await
    }

    /// Records whose `index` key equals `value`.
    ///
    /// Served by scanning the hydrated mirror when the index covers a single
    /// field; composite indexes always query the store.
    pub async fn get_all_arr_by_index_name(
        &self,
        index: &str,
        value: impl Into<Key>,
    ) -> CoreResult<Vec<Value>> {
        let index_handle = self.index(index)?;
        let value = value.into();
        valid_key(&value)?;
        if let (Some(mirror), Some(path)) = (self.hydrated_mirror(), self.key_path(index)) {
            if !path.is_compound() {
                return Ok(mirror
                    .all()
                    .into_values()
                    .filter(|record| path.extract(record).as_ref() == Some(&value))
                    .collect());
            }
        }
        index_handle.get_all(Some(value.into()), None, None).await
    }

    /// Primary keys in `range`, or all of them.
    pub async fn get_all_primary_keys(&self, range: Option<KeyRange>) -> CoreResult<Vec<Key>> {
        if let Some(mirror) = self.hydrated_mirror() {
            return Ok(mirror
                .keys()
                .into_iter()
                .map(Key::Text)
                .filter(|key| range.as_ref().map_or(true, |r| r.contains(key)))
                .collect());
        }
        self.store
            .get_all_keys(range.map(KeyQuery::Range), None, None)
            .await
    }

    /// Every record in primary-key order.
    pub async fn get_all_arr(&self) -> CoreResult<Vec<Value>> {
        if let Some(mirror) = self.hydrated_mirror() {
            return Ok(mirror.all().into_values().collect());
        }
        self.store.get_all(None, None, None).await
    }

    /// Every record by primary key.
    pub async fn get_all_kv(&self) -> CoreResult<BTreeMap<Key, Value>> {
        if let Some(mirror) = self.hydrated_mirror() {
            return Ok(mirror
                .all()
                .into_iter()
                .map(|(k, v)| (Key::Text(k), v))
                .collect());
        }
        let (keys, values) = self.read_everything().await?;
        Ok(keys.into_iter().zip(values).collect())
    }

    async fn read_everything(&self) -> CoreResult<(Vec<Key>, Vec<Value>)> {
        let tx = self.db.transaction(&[self.store_name()], TransactionMode::ReadOnly)?;
        let keys = self.store.get_all_keys(None, None, Some(&tx)).await?;
        let values = self.store.get_all(None, None, Some(&tx)).await?;
        let _ = tx.abort();
        Ok((keys, values))
    }

    /// Primary key of the first record whose `index` key matches `query`.
    pub async fn get_key_only(
        &self,
        index: &str,
        query: impl Into<KeyQuery>,
    ) -> CoreResult<Option<Key>> {
        self.index(index)?.get_key(query, None).await
    }

    /// Primary key of the first record with an `index` key above `lower`.
    pub async fn get_key_lb(
        &self,
        index: &str,
        lower: impl Into<Key>,
        open: bool,
    ) -> CoreResult<Option<Key>> {
        self.index(index)?.get_key_lb(lower, open, None).await
    }

    /// Primary key of the first record with an `index` key below `upper`.
    pub async fn get_key_ub(
        &self,
        index: &str,
        upper: impl Into<Key>,
        open: bool,
    ) -> CoreResult<Option<Key>> {
        self.index(index)?.get_key_ub(upper, open, None).await
    }

    /// Primary key of the first record with an `index` key between `lower`
    /// and `upper`.
    pub async fn get_key_bound(
        &self,
        index: &str,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Option<Key>> {
        self.index(index)?
            .get_key_bound(lower, upper, lower_open, upper_open, None)
            .await
    }

    /// Walks `index` keys in `range` and `direction`, calling
    /// `handler(primary_key, index_key, updater)` until it stops.
    pub async fn iterate_all_keys<F, Fut, R>(
        &self,
        index: &str,
        range: Option<KeyRange>,
        direction: CursorDirection,
        handler: F,
    ) -> CoreResult<()>
    where
        F: FnMut(Key, Key, CursorUpdater) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
        R: Into<Flow>,
    {
        self.index(index)?
            .iterate_all_keys(range.map(KeyQuery::Range), direction, None, handler)
            .await
    }

    /// Stores a new record under `key` with a fresh ticket.
    ///
    /// Returns false if the engine rejected the write.
    pub async fn add(&self, key: impl Into<Key>, mut value: Value) -> CoreResult<bool> {
        let key = key.into();
        valid_key(&key)?;
        stamp(&mut value, FRESH_TICKET)?;
        match self.store.put(key.clone(), &value, None).await {
            Ok(_) => {
                self.remember(&key, &value);
                Ok(true)
            }
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "add failed");
                Ok(false)
            }
        }
    }

    /// Applies `f` to the record under `key` and bumps its ticket.
    ///
    /// A missing record yields `None` unless `force` is set, in which case
    /// `f` starts from an empty object. Also `None` if the engine rejected
    /// the read or the write.
    pub async fn update<F>(&self, key: impl Into<Key>, f: F, force: bool) -> CoreResult<Option<Value>>
    where
        F: FnOnce(Value) -> Value,
    {
        let key = key.into();
        valid_key(&key)?;
        let tx = self.db.transaction(&[self.store_name()], TransactionMode::ReadWrite)?;
        let current = match self.store.get(key.clone(), Some(&tx)).await {
            Ok(current) => current,
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "update read failed");
                return Ok(None);
            }
        };
        if current.is_none() && !force {
            return Ok(None);
        }

        let ticket = next_ticket(current.as_ref());
        let mut next = f(current.unwrap_or_else(|| json!({})));
        stamp(&mut next, ticket)?;
        match self.store.put(key.clone(), &next, Some(&tx)).await {
            Ok(_) => {
                self.remember(&key, &next);
                Ok(Some(next))
            }
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "update failed");
                Ok(None)
            }
        }
    }

    /// Applies `f` to the record under `key` without touching its ticket.
    ///
    /// The record is read through the mirror. `None` if it does not exist
    /// or the write failed.
    pub async fn update_in_local<F>(&self, key: impl Into<Key>, f: F) -> CoreResult<Option<Value>>
    where
        F: FnOnce(Value) -> Value,
    {
        let key = key.into();
        let Some(current) = self.get(key.clone()).await? else {
            return Ok(None);
        };
        let next = f(current);
        checked_record(&next)?;
        match self.store.put(key.clone(), &next, None).await {
            Ok(_) => {
                self.remember(&key, &next);
                Ok(Some(next))
            }
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "local update failed");
                Ok(None)
            }
        }
    }

    /// Reads the record under `key` and writes back what `f` returns, in one
    /// transaction. `f` returning `None` skips the write.
    ///
    /// Returns true if a write happened.
    pub async fn read_write_data<F>(&self, key: impl Into<Key>, f: F) -> CoreResult<bool>
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        let key = key.into();
        valid_key(&key)?;
        let tx = self.db.transaction(&[self.store_name()], TransactionMode::ReadWrite)?;
        let current = match self.store.get(key.clone(), Some(&tx)).await {
            Ok(current) => current,
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "read-write read failed");
                return Ok(false);
            }
        };
        let Some(next) = f(current) else {
            return Ok(false);
        };
        checked_record(&next)?;
        match self.store.put(key.clone(), &next, Some(&tx)).await {
            Ok(_) => {
                self.remember(&key, &next);
                Ok(true)
            }
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "read-write write failed");
                Ok(false)
            }
        }
    }

    /// Deletes the record under `key`.
    ///
    /// Returns false if the engine rejected the delete.
    pub async fn del(&self, key: impl Into<Key>) -> CoreResult<bool> {
        let key = key.into();
        valid_key(&key)?;
        match self.store.delete(key.clone(), None).await {
            Ok(()) => {
                self.forget(&key);
                Ok(true)
            }
            Err(e) => {
                warn!(store = %self.store_name(), key = %key, error = %e, "delete failed");
                Ok(false)
            }
        }
    }

    /// Adds several records, each under the key found in its key field, in
    /// `tx` or one implicit transaction.
    ///
    /// # Errors
    ///
    /// Fails only if no transaction could be obtained; item failures go to
    /// `on_error`.
    pub async fn add_lots<S, E>(
        &self,
        values: Vec<Value>,
        mut on_success: S,
        mut on_error: E,
        tx: Option<&Transaction>,
    ) -> CoreResult<BatchSummary>
    where
        S: FnMut(&Value),
        E: FnMut(BatchError),
    {
        let tx = exec(&self.db, self.store_name(), tx, TransactionMode::ReadWrite)?;
        let mut summary = BatchSummary::default();
        for mut value in values {
            let field = value.get(self.key_field()).unwrap_or(&Value::Null);
            let key = match key_from_value(field).and_then(|key| valid_key(&key).cloned()) {
                Ok(key) => key,
                Err(error) => {
                    summary.failed += 1;
                    on_error(BatchError { key: None, error });
                    continue;
                }
            };
            let written = match stamp(&mut value, FRESH_TICKET) {
                Ok(()) => self.store.put(key.clone(), &value, Some(&tx)).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(_) => {
                    summary.succeeded += 1;
                    self.remember(&key, &value);
                    on_success(&value);
                }
                Err(error) => {
                    summary.failed += 1;
                    on_error(BatchError {
                        key: Some(key),
                        error,
                    });
                }
            }
        }
        debug!(store = %self.store_name(), ok = summary.succeeded, failed = summary.failed, "batch add");
        Ok(summary)
    }

    /// Deletes several records in `tx` or one implicit transaction.
    ///
    /// # Errors
    ///
    /// Fails only if no transaction could be obtained.
    pub async fn del_lots<S, E>(
        &self,
        keys: Vec<Key>,
        mut on_success: S,
        mut on_error: E,
        tx: Option<&Transaction>,
    ) -> CoreResult<BatchSummary>
    where
        S: FnMut(&Key),
        E: FnMut(BatchError),
    {
        let tx = exec(&self.db, self.store_name(), tx, TransactionMode::ReadWrite)?;
        let mut summary = BatchSummary::default();
        for key in keys {
            match self.store.delete(key.clone(), Some(&tx)).await {
                Ok(()) => {
                    summary.succeeded += 1;
                    self.forget(&key);
                    on_success(&key);
                }
                Err(error) => {
                    summary.failed += 1;
                    on_error(BatchError {
                        key: Some(key),
                        error,
                    });
                }
            }
        }
        debug!(store = %self.store_name(), ok = summary.succeeded, failed = summary.failed, "batch delete");
        Ok(summary)
    }

    /// Loads the whole store into the mirror and marks it hydrated.
    ///
    /// Returns false, leaving the mirror untouched, if the table has no
    /// mirror or some primary key is not text.
    pub async fn hydrate(&self) -> CoreResult<bool> {
        let Some(mirror) = self.mirror() else {
            return Ok(false);
        };
        let (keys, values) = self.read_everything().await?;
        if keys.iter().any(|key| mirror_key(key).is_none()) {
            debug!(store = %self.store_name(), "not hydrating: non-text primary keys");
            return Ok(false);
        }
        mirror.clear();
        for (key, value) in keys.iter().zip(values) {
            if let Some(text) = mirror_key(key) {
                mirror.set(text, value);
            }
        }
        mirror.mark_hydrated();
        debug!(store = %self.store_name(), records = keys.len(), "mirror hydrated");
        Ok(true)
    }

    /// Drops the value mirror; reads fall back to the store from now on.
    pub fn clear_in_memory(&self) {
        if let Some(mirror) = self.mirror.write().take() {
            self.caches.values.destroy(mirror.name());
            debug!(store = %self.store_name(), "value mirror released");
        }
    }

    /// Drops the binary mirror.
    pub fn clear_in_cache(&self) {
        if let Some(buffer) = self.buffer.write().take() {
            self.caches.buffers.destroy(buffer.name());
            debug!(store = %self.store_name(), "binary mirror released");
        }
    }

    /// Binary payload under `key`.
    #[must_use]
    pub fn get_in_cache(&self, key: &str) -> Option<Bytes> {
        self.buffer()?.get(key)
    }

    /// Every binary payload, or `None` without a binary mirror.
    #[must_use]
    pub fn get_all_in_cache(&self) -> Option<BTreeMap<String, Bytes>> {
        self.buffer().map(|buffer| buffer.all())
    }

    /// Stores a binary payload. Never written to the store.
    pub fn set_in_cache(&self, key: &str, data: Bytes) {
        if let Some(buffer) = self.buffer() {
            buffer.set(key, data);
        }
    }

    /// Removes a binary payload.
    pub fn del_in_cache(&self, key: &str) {
        if let Some(buffer) = self.buffer() {
            buffer.del(key);
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("store", &self.config.store)
            .field("key_field", &self.config.key_field)
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .field("mirror", &self.mirror())
            .field("buffer", &self.buffer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, IndexConfig, MirrorConfig};
    use kvtable_engine::{MemoryEngine, StorageEngine};
    use std::sync::Arc;

    fn config() -> TableConfig {
        TableConfig::new("test", "uuid")
            .index(IndexConfig::new("title", "title"))
            .index(IndexConfig::new("source_version", vec!["source", "version"]))
            .mirror(MirrorConfig::new("testMemory"))
            .buffer(MirrorConfig::new("testBuffer"))
    }

    async fn table() -> (Table, ProcessCaches) {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let db = Database::open_with_tables(engine, Config::new("tables"), &[config()])
            .await
            .unwrap();
        let caches = ProcessCaches::new();
        (Table::new(db, config(), &caches), caches)
    }

    fn doc(uuid: &str, title: &str) -> Value {
        json!({"uuid": uuid, "title": title, "source": "s", "version": uuid})
    }

    #[tokio::test]
    async fn add_then_get() {
        let (table, _) = table().await;
        assert!(table.add("1", doc("1", "aaa")).await.unwrap());
        let got = table.get("1").await.unwrap().unwrap();
        assert_eq!(got["title"], "aaa");
        assert_eq!(read_ticket(&got), Some(-1));
        assert!(table.mirror().unwrap().contains("1"));
    }

    #[tokio::test]
    async fn update_moves_the_ticket() {
        let (table, _) = table().await;
        table.add("1", doc("1", "a")).await.unwrap();
        let first = table
            .update("1", |mut v| {
                v["title"] = json!("b");
                v
            }, false)
            .await
            .unwrap()
            .unwrap();
        let second = table.update("1", |v| v, false).await.unwrap().unwrap();
        assert_eq!(read_ticket(&first), Some(-2));
        assert_eq!(read_ticket(&second), Some(-3));
        assert_eq!(table.get("1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn update_of_missing_record() {
        let (table, _) = table().await;
        assert_eq!(table.update("ghost", |v| v, false).await.unwrap(), None);
        let forced = table
            .update("ghost", |mut v| {
                v["title"] = json!("new");
                v
            }, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forced, json!({"title": "new", "ticket": -1}));
    }

    #[tokio::test]
    async fn delete_clears_both_copies() {
        let (table, _) = table().await;
        table.add("1", doc("1", "a")).await.unwrap();
        assert!(table.del("1").await.unwrap());
        assert_eq!(table.get("1").await.unwrap(), None);
        assert!(!table.mirror().unwrap().contains("1"));
    }

    #[tokio::test]
    async fn read_miss_does_not_populate_mirror() {
        let (table, _) = table().await;
        table
            .store()
            .put("direct", &doc("direct", "x"), None)
            .await
            .unwrap();
        assert!(table.get("direct").await.unwrap().is_some());
        assert!(!table.mirror().unwrap().contains("direct"));
    }

    #[tokio::test]
    async fn unknown_index_is_an_error() {
        let (table, _) = table().await;
        let err = table.get_by_index_name("nope", "x").await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownIndex { .. }));
        assert!(table.get_by_index_name("uuid", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hydrated_reads_match_store_reads() {
        let (table, _) = table().await;
        for (uuid, title) in [("b", "t1"), ("a", "t2"), ("c", "t1")] {
            table.add(uuid, doc(uuid, title)).await.unwrap();
        }
        let cold_all = table.get_all_arr().await.unwrap();
        let cold_t1 = table.get_all_arr_by_index_name("title", "t1").await.unwrap();
        let cold_keys = table
            .get_all_primary_keys(Some(KeyRange::bound("a", "c", true, false)))
            .await
            .unwrap();

        assert!(table.hydrate().await.unwrap());
        assert_eq!(table.get_all_arr().await.unwrap(), cold_all);
        assert_eq!(table.get_all_arr_by_index_name("title", "t1").await.unwrap(), cold_t1);
        assert_eq!(
            table
                .get_all_primary_keys(Some(KeyRange::bound("a", "c", true, false)))
                .await
                .unwrap(),
            cold_keys
        );
        assert_eq!(cold_keys, vec![Key::from("b"), Key::from("c")]);
        assert_eq!(table.get_all_kv().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn non_text_write_sends_reads_back_to_the_store() {
        let (table, _) = table().await;
        table.add("a", doc("a", "t1")).await.unwrap();
        assert!(table.hydrate().await.unwrap());

        assert!(table.add(7, json!({"uuid": 7, "title": "t1"})).await.unwrap());
        assert!(!table.mirror().unwrap().is_hydrated());

        let from_store = table.store().get_all(None, None, None).await.unwrap();
        assert_eq!(table.get_all_arr().await.unwrap(), from_store);
        assert_eq!(from_store.len(), 2);
        assert_eq!(
            table.get_all_primary_keys(None).await.unwrap(),
            vec![Key::from(7), Key::from("a")]
        );
        assert_eq!(table.get_all_arr_by_index_name("title", "t1").await.unwrap().len(), 2);
        assert_eq!(table.get_all_kv().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_text_delete_also_drops_the_mark() {
        let (table, _) = table().await;
        table.store().put(3, &json!({"uuid": 3}), None).await.unwrap();
        table.mirror().unwrap().mark_hydrated();
        assert!(table.del(3).await.unwrap());
        assert!(!table.mirror().unwrap().is_hydrated());
    }

    #[tokio::test]
    async fn rewrites_must_be_objects() {
        let (table, _) = table().await;
        table.add("1", doc("1", "a")).await.unwrap();

        let err = table.update_in_local("1", |_| Value::Null).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        let err = table
            .read_write_data("1", |_| Some(json!([1, 2])))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));

        let stored = table.store().get("1", None).await.unwrap().unwrap();
        assert_eq!(stored["title"], "a");
    }

    #[tokio::test]
    async fn batches_report_per_item() {
        let (table, _) = table().await;
        let mut ok = Vec::new();
        let mut failed = Vec::new();
        let summary = table
            .add_lots(
                vec![doc("1", "a"), json!({"title": "no key"}), doc("2", "b")],
                |v| ok.push(v["uuid"].clone()),
                |e| failed.push(e),
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary, BatchSummary { succeeded: 2, failed: 1 });
        assert_eq!(ok, vec![json!("1"), json!("2")]);
        assert_eq!(failed[0].key, None);
        assert!(matches!(failed[0].error, CoreError::Validation { .. }));

        let summary = table
            .del_lots(vec![Key::from("1"), Key::from("2")], |_| {}, |_| {}, None)
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 2);
        assert!(table.get_all_arr().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_lots_keeps_order_and_skips_missing() {
        let (table, _) = table().await;
        table.add("1", doc("1", "a")).await.unwrap();
        table.store().put("2", &doc("2", "b"), None).await.unwrap();
        let got = table
            .get_lots(&[Key::from("2"), Key::from("missing"), Key::from("1")])
            .await
            .unwrap();
        let ids: Vec<_> = got.iter().map(|v| v["uuid"].clone()).collect();
        assert_eq!(ids, vec![json!("2"), json!("1")]);
    }

    #[tokio::test]
    async fn read_write_data_can_skip() {
        let (table, _) = table().await;
        assert!(!table.read_write_data("1", |_| None).await.unwrap());
        assert!(table
            .read_write_data("1", |current| {
                assert!(current.is_none());
                Some(doc("1", "rw"))
            })
            .await
            .unwrap());
        assert_eq!(table.get("1").await.unwrap().unwrap()["title"], "rw");
    }

    #[tokio::test]
    async fn binary_mirror_and_teardown() {
        let (table, caches) = table().await;
        table.set_in_cache("blob", Bytes::from_static(b"\x00\x01"));
        assert_eq!(table.get_in_cache("blob"), Some(Bytes::from_static(b"\x00\x01")));
        assert_eq!(table.get_all_in_cache().unwrap().len(), 1);
        table.del_in_cache("blob");
        assert!(table.get_in_cache("blob").is_none());

        table.add("1", doc("1", "a")).await.unwrap();
        table.clear_in_memory();
        table.clear_in_cache();
        assert!(table.mirror().is_none());
        assert!(table.get_all_in_cache().is_none());
        assert!(!caches.values.contains("testMemory"));
        // The store still answers.
        assert!(table.get("1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn engine_failure_becomes_false() {
        let (table, _) = table().await;
        table.add("1", doc("1", "a")).await.unwrap();
        table.db.close();
        assert!(!table.del("1").await.unwrap());
        assert!(!table.add("2", doc("2", "b")).await.unwrap());
        // Still mirrored: the failed delete left the mirror alone.
        assert!(table.mirror().unwrap().contains("1"));
    }
}

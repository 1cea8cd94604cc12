//! Store and index queries.
//!
//! [`Reader`] is the read surface shared by stores and indexes: against a
//! store, keys are primary keys; against an index, keys are index keys and
//! results still come back in index order. [`Store`] adds the writes.
//!
//! Every call takes an optional [`Transaction`]. With `None`, the call opens
//! an implicit read-write transaction of its own, which the engine commits
//! once the caller goes idle.

use crate::cursor::{for_each, Cursor, CursorUpdater, Flow};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::request::{exec, settle};
use crate::transaction::Transaction;
use kvtable_engine::{CursorDirection, Key, KeyQuery, KeyRange, Source, TransactionMode};
use serde_json::Value;
use std::future::Future;
use std::ops::Deref;

fn checked(query: &KeyQuery) -> CoreResult<()> {
    query
        .validate()
        .map_err(|e| CoreError::validation(format!("invalid key or range: {e}")))
}

fn checked_opt(query: Option<&KeyQuery>) -> CoreResult<()> {
    query.map_or(Ok(()), checked)
}

/// Read surface over a store or an index.
#[derive(Debug, Clone)]
pub struct Reader {
    db: Database,
    source: Source,
}

impl Reader {
    fn txn(&self, tx: Option<&Transaction>) -> CoreResult<Transaction> {
        exec(&self.db, self.source.store_name(), tx, TransactionMode::ReadWrite)
    }

    /// What this reader targets.
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Store behind this reader.
    #[must_use]
    pub fn store_name(&self) -> &str {
        self.source.store_name()
    }

    /// Database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// First record matching `query`.
    pub async fn get(
        &self,
        query: impl Into<KeyQuery>,
        tx: Option<&Transaction>,
    ) -> CoreResult<Option<Value>> {
        let query = query.into();
        checked(&query)?;
        let tx = self.txn(tx)?;
        settle("get", tx.engine().get(&self.source, &query)).await
    }

    /// Matching records in key order, at most `count` of them (`Some(0)`
    /// means no limit).
    pub async fn get_all(
        &self,
        query: Option<KeyQuery>,
        count: Option<u32>,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Value>> {
        checked_opt(query.as_ref())?;
        let tx = self.txn(tx)?;
        settle("get_all", tx.engine().get_all(&self.source, query.as_ref(), count)).await
    }

    /// Records with keys between `lower` and `upper`; each end is excluded
    /// when its `open` flag is set.
    pub async fn get_all_bound(
        &self,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Value>> {
        let range = KeyRange::bound(lower, upper, lower_open, upper_open);
        self.get_all(Some(range.into()), None, tx).await
    }

    /// Records with keys above `lower`.
    pub async fn get_all_lb(
        &self,
        lower: impl Into<Key>,
        open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Value>> {
        self.get_all(Some(KeyRange::lower_bound(lower, open).into()), None, tx)
            .await
    }

    /// Records with keys below `upper`.
    pub async fn get_all_ub(
        &self,
        upper: impl Into<Key>,
        open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Value>> {
        self.get_all(Some(KeyRange::upper_bound(upper, open).into()), None, tx)
            .await
    }

    /// Primary keys of matching records in key order.
    pub async fn get_all_keys(
        &self,
        query: Option<KeyQuery>,
        count: Option<u32>,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Key>> {
        checked_opt(query.as_ref())?;
        let tx = self.txn(tx)?;
        settle(
            "get_all_keys",
            tx.engine().get_all_keys(&self.source, query.as_ref(), count),
        )
        .await
    }

    /// Primary keys of records with keys between `lower` and `upper`.
    pub async fn get_all_keys_bound(
        &self,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Key>> {
        let range = KeyRange::bound(lower, upper, lower_open, upper_open);
        self.get_all_keys(Some(range.into()), None, tx).await
    }

    /// Primary keys of records with keys above `lower`.
    pub async fn get_all_keys_lb(
        &self,
        lower: impl Into<Key>,
        open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Key>> {
        self.get_all_keys(Some(KeyRange::lower_bound(lower, open).into()), None, tx)
            .await
    }

    /// Primary keys of records with keys below `upper`.
    pub async fn get_all_keys_ub(
        &self,
        upper: impl Into<Key>,
        open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Vec<Key>> {
        self.get_all_keys(Some(KeyRange::upper_bound(upper, open).into()), None, tx)
            .await
    }

    /// Primary key of the first matching record.
    ///
    /// The last match is found by iterating in a reverse direction.
    pub async fn get_key(
        &self,
        query: impl Into<KeyQuery>,
        tx: Option<&Transaction>,
    ) -> CoreResult<Option<Key>> {
        let query = query.into();
        checked(&query)?;
        let tx = self.txn(tx)?;
        settle("get_key", tx.engine().get_key(&self.source, &query)).await
    }

    /// Primary key of the first record with a key between `lower` and
    /// `upper`.
    pub async fn get_key_bound(
        &self,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Option<Key>> {
        self.get_key(KeyRange::bound(lower, upper, lower_open, upper_open), tx)
            .await
    }

    /// Primary key of the first record with a key above `lower`.
    pub async fn get_key_lb(
        &self,
        lower: impl Into<Key>,
        open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Option<Key>> {
        self.get_key(KeyRange::lower_bound(lower, open), tx).await
    }

    /// Primary key of the first record with a key below `upper`.
    pub async fn get_key_ub(
        &self,
        upper: impl Into<Key>,
        open: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Option<Key>> {
        self.get_key(KeyRange::upper_bound(upper, open), tx).await
    }

    /// Number of matching records.
    pub async fn count(&self, query: Option<KeyQuery>, tx: Option<&Transaction>) -> CoreResult<u64> {
        checked_opt(query.as_ref())?;
        let tx = self.txn(tx)?;
        settle("count", tx.engine().count(&self.source, query.as_ref())).await
    }

    /// Opens a cursor carrying records.
    pub async fn open_cursor(
        &self,
        query: Option<KeyQuery>,
        direction: CursorDirection,
        tx: Option<&Transaction>,
    ) -> CoreResult<Cursor> {
        self.cursor(query, direction, false, tx).await
    }

    /// Opens a cursor carrying keys only.
    pub async fn open_key_cursor(
        &self,
        query: Option<KeyQuery>,
        direction: CursorDirection,
        tx: Option<&Transaction>,
    ) -> CoreResult<Cursor> {
        self.cursor(query, direction, true, tx).await
    }

    async fn cursor(
        &self,
        query: Option<KeyQuery>,
        direction: CursorDirection,
        key_only: bool,
        tx: Option<&Transaction>,
    ) -> CoreResult<Cursor> {
        checked_opt(query.as_ref())?;
        let tx = self.txn(tx)?;
        let raw = settle(
            "open_cursor",
            tx.engine()
                .open_cursor(&self.source, query.as_ref(), direction, key_only),
        )
        .await?;
        Ok(Cursor::new(raw, tx))
    }

    /// Calls `handler(key, record, updater)` for every match in `direction`
    /// order until it returns [`Flow::Stop`] or `false`.
    pub async fn iterate_all<F, Fut, R>(
        &self,
        query: Option<KeyQuery>,
        direction: CursorDirection,
        tx: Option<&Transaction>,
        mut handler: F,
    ) -> CoreResult<()>
    where
        F: FnMut(Key, Value, CursorUpdater) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
        R: Into<Flow>,
    {
        let cursor = self.open_cursor(query, direction, tx).await?;
        for_each(cursor, |entry, updater| {
            handler(entry.key, entry.value.unwrap_or(Value::Null), updater)
        })
        .await
    }

    /// Calls `handler(primary_key, key, updater)` for every match in
    /// `direction` order until it returns [`Flow::Stop`] or `false`.
    pub async fn iterate_all_keys<F, Fut, R>(
        &self,
        query: Option<KeyQuery>,
        direction: CursorDirection,
        tx: Option<&Transaction>,
        mut handler: F,
    ) -> CoreResult<()>
    where
        F: FnMut(Key, Key, CursorUpdater) -> Fut,
        Fut: Future<Output = CoreResult<R>>,
        R: Into<Flow>,
    {
        let cursor = self.open_key_cursor(query, direction, tx).await?;
        for_each(cursor, |entry, updater| {
            handler(entry.primary_key, entry.key, updater)
        })
        .await
    }
}

/// A store: reads by primary key, plus writes.
#[derive(Debug, Clone)]
pub struct Store {
    reader: Reader,
}

impl Store {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Self {
            reader: Reader {
                db,
                source: Source::Store(name.to_string()),
            },
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.reader.store_name()
    }

    /// Inserts or replaces the record under `key`.
    pub async fn put(
        &self,
        key: impl Into<Key>,
        value: &Value,
        tx: Option<&Transaction>,
    ) -> CoreResult<Key> {
        let key = key.into();
        checked(&KeyQuery::Key(key.clone()))?;
        let tx = self.reader.txn(tx)?;
        settle("put", tx.engine().put(self.name(), &key, value)).await
    }

    /// Deletes every record matching `query`.
    pub async fn delete(
        &self,
        query: impl Into<KeyQuery>,
        tx: Option<&Transaction>,
    ) -> CoreResult<()> {
        let query = query.into();
        checked(&query)?;
        let tx = self.reader.txn(tx)?;
        settle("delete", tx.engine().delete(self.name(), &query)).await
    }

    /// Deletes every record.
    pub async fn clear(&self, tx: Option<&Transaction>) -> CoreResult<()> {
        let tx = self.reader.txn(tx)?;
        settle("clear", tx.engine().clear(self.name())).await
    }
}

impl Deref for Store {
    type Target = Reader;

    fn deref(&self) -> &Reader {
        &self.reader
    }
}

/// An index of a store: reads by index key.
#[derive(Debug, Clone)]
pub struct Index {
    reader: Reader,
}

impl Index {
    pub(crate) fn new(db: Database, store: &str, index: &str) -> Self {
        Self {
            reader: Reader {
                db,
                source: Source::Index {
                    store: store.to_string(),
                    index: index.to_string(),
                },
            },
        }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.reader.source {
            Source::Index { index, .. } => index,
            Source::Store(name) => name,
        }
    }
}

impl Deref for Index {
    type Target = Reader;

    fn deref(&self) -> &Reader {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, IndexConfig, TableConfig};
    use kvtable_engine::{MemoryEngine, StorageEngine};
    use serde_json::json;
    use std::sync::Arc;

    async fn open() -> Database {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let table = TableConfig::new("nums", "n").index(IndexConfig::new("parity", "parity"));
        Database::open_with_tables(engine, Config::new("query"), &[table])
            .await
            .unwrap()
    }

    async fn fill(store: &Store) {
        let tx = store.database().transaction(&["nums"], TransactionMode::ReadWrite).unwrap();
        for n in 1..=10 {
            let parity = if n % 2 == 0 { "even" } else { "odd" };
            store
                .put(n, &json!({"n": n, "parity": parity}), Some(&tx))
                .await
                .unwrap();
        }
    }

    fn ns(values: &[Value]) -> Vec<i64> {
        values.iter().map(|v| v["n"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn bounds() {
        let db = open().await;
        let store = db.store("nums");
        fill(&store).await;

        assert_eq!(ns(&store.get_all_bound(3, 6, false, false, None).await.unwrap()), vec![3, 4, 5, 6]);
        assert_eq!(ns(&store.get_all_bound(3, 6, true, true, None).await.unwrap()), vec![4, 5]);
        assert_eq!(ns(&store.get_all_lb(9, false, None).await.unwrap()), vec![9, 10]);
        assert_eq!(ns(&store.get_all_ub(2, true, None).await.unwrap()), vec![1]);
        assert!(store.get_all_bound(6, 3, false, false, None).await.unwrap().is_empty());
        assert_eq!(store.get_all(None, Some(3), None).await.unwrap().len(), 3);
        assert_eq!(store.get_all(None, Some(0), None).await.unwrap().len(), 10);
        assert_eq!(store.get_key_lb(4, true, None).await.unwrap(), Some(Key::from(5)));
        assert_eq!(store.count(None, None).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn index_reads() {
        let db = open().await;
        fill(&db.store("nums")).await;
        let parity = db.index("nums", "parity");
        assert_eq!(parity.name(), "parity");
        assert_eq!(parity.count(Some("odd".into()), None).await.unwrap(), 5);
        assert_eq!(
            parity.get_all_keys(Some("even".into()), Some(2), None).await.unwrap(),
            vec![Key::from(2), Key::from(4)]
        );
        assert_eq!(parity.get_key("odd", None).await.unwrap(), Some(Key::from(1)));
        let missing = db.index("nums", "nope");
        assert!(matches!(
            missing.get("x", None).await.unwrap_err().engine(),
            Some(kvtable_engine::EngineError::IndexNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_keys_fail_before_the_engine() {
        let db = open().await;
        let store = db.store("nums");
        let err = store.put(f64::NAN, &json!({}), None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        let err = store
            .get(Key::array(vec![Key::from(1), Key::Number(f64::NAN)]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        store.put("", &json!({"n": 0}), None).await.unwrap();
        store.put(0, &json!({"n": 0}), None).await.unwrap();
    }

    #[tokio::test]
    async fn iteration_stops_when_asked() {
        let db = open().await;
        let store = db.store("nums");
        fill(&store).await;

        let mut seen = Vec::new();
        store
            .iterate_all(None, CursorDirection::Next, None, |key, _, _| {
                seen.push(key);
                let go_on = seen.len() < 3;
                async move { Ok::<_, CoreError>(go_on) }
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![Key::from(1), Key::from(2), Key::from(3)]);
    }

    #[tokio::test]
    async fn handler_error_ends_iteration() {
        let db = open().await;
        let store = db.store("nums");
        fill(&store).await;

        let mut calls = 0;
        let err = store
            .iterate_all(None, CursorDirection::Next, None, |_, _, _| {
                calls += 1;
                let result = if calls == 2 {
                    Err(CoreError::invalid_operation("handler gave up"))
                } else {
                    Ok(())
                };
                async move { result }
            })
            .await
            .unwrap_err();
        assert_eq!(calls, 2);
        assert_eq!(err, CoreError::invalid_operation("handler gave up"));
    }

    #[tokio::test]
    async fn cursor_update_in_place() {
        let db = open().await;
        let store = db.store("nums");
        fill(&store).await;

        let tx = db.transaction(&["nums"], TransactionMode::ReadWrite).unwrap();
        store
            .iterate_all(None, CursorDirection::Prev, Some(&tx), |_, mut value, updater| async move {
                value["seen"] = json!(true);
                updater.update(value).await?;
                Ok::<_, CoreError>(())
            })
            .await
            .unwrap();
        let all = store.get_all(None, None, Some(&tx)).await.unwrap();
        assert!(all.iter().all(|v| v["seen"] == json!(true)));
    }

    #[tokio::test]
    async fn store_writes() {
        let db = open().await;
        let store = db.store("nums");
        fill(&store).await;
        store.delete(KeyRange::bound(1, 5, false, false), None).await.unwrap();
        assert_eq!(store.count(None, None).await.unwrap(), 5);
        store.clear(None).await.unwrap();
        assert_eq!(store.count(None, None).await.unwrap(), 0);
    }
}

//! The storage engine contract.
//!
//! A host engine is an asynchronous, ordered, transactional key-value store.
//! These traits describe the part of it the table layer depends on.
//!
//! # Invariants
//!
//! - Every operation returns a [`Request`] that settles exactly once
//! - Requests against one transaction settle in issue order
//! - A transaction commits on its own once its last request settled and the
//!   issuing task yielded without enqueueing another request
//! - Any request against a finished transaction fails with
//!   [`EngineError::TransactionFinished`](crate::EngineError::TransactionFinished)
//! - Stores and indexes are created or dropped only inside the upgrade callback
//!
//! # Implementors
//!
//! - [`crate::MemoryEngine`] - in-process reference engine

use crate::error::EngineResult;
use crate::key::{Key, KeyQuery};
use crate::request::Request;
use crate::schema::{IndexDecl, StoreDecl};
use crate::types::{CursorDirection, Source, TransactionId, TransactionMode, TransactionState};
use serde_json::Value;
use std::sync::Arc;

/// Version change reported to the upgrade callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeInfo {
    /// Version on record before the open; 0 for a new database.
    pub old_version: u64,
    /// Version being opened.
    pub new_version: u64,
}

/// Callback run once when a database is opened at a newer version.
pub type UpgradeCallback =
    Box<dyn FnOnce(&mut dyn SchemaEditor, UpgradeInfo) -> EngineResult<()> + Send>;

/// Entry point of an engine.
pub trait StorageEngine: Send + Sync {
    /// Opens a database, running `on_upgrade` if `version` is newer than the
    /// version on record.
    fn open(
        &self,
        name: &str,
        version: u64,
        on_upgrade: Option<UpgradeCallback>,
    ) -> Request<Arc<dyn Connection>>;

    /// Deletes a database. Fails with `Blocked` while connections are open.
    fn delete_database(&self, name: &str) -> Request<()>;
}

/// An open database connection.
pub trait Connection: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the connection was opened at.
    fn version(&self) -> u64;

    /// Names of every store, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Starts a transaction over `stores`.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound` for an unknown store, `InvalidState` for an
    /// empty scope or a closed connection.
    fn transaction(
        &self,
        stores: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn EngineTransaction>>;

    /// Closes the connection. Transactions already started keep working.
    fn close(&self);
}

/// Schema operations available inside the upgrade callback.
pub trait SchemaEditor {
    /// Names of every store, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Creates a store.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the name is taken.
    fn create_store(&mut self, decl: &StoreDecl) -> EngineResult<()>;

    /// Drops a store with its records and indexes.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound` if the store does not exist.
    fn delete_store(&mut self, name: &str) -> EngineResult<()>;

    /// Creates an index and fills it from the records already stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound`, `AlreadyExists`, or `Constraint` if existing
    /// records violate a unique index.
    fn create_index(&mut self, decl: &IndexDecl) -> EngineResult<()>;

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound` or `IndexNotFound`.
    fn delete_index(&mut self, store: &str, name: &str) -> EngineResult<()>;
}

/// An engine transaction.
pub trait EngineTransaction: Send + Sync {
    /// Transaction identifier.
    fn id(&self) -> TransactionId;

    /// Access mode.
    fn mode(&self) -> TransactionMode;

    /// Current state.
    fn state(&self) -> TransactionState;

    /// Stores the transaction may touch.
    fn scope(&self) -> Vec<String>;

    /// Commits now.
    ///
    /// # Errors
    ///
    /// Returns `TransactionFinished` if already finished.
    fn commit(&self) -> EngineResult<()>;

    /// Aborts now, rolling back every write of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionFinished` if already finished.
    fn abort(&self) -> EngineResult<()>;

    /// First record matching the query.
    fn get(&self, source: &Source, query: &KeyQuery) -> Request<Option<Value>>;

    /// Matching records in key order; `count` of `None` or `Some(0)` is
    /// unlimited.
    fn get_all(&self, source: &Source, query: Option<&KeyQuery>, count: Option<u32>)
        -> Request<Vec<Value>>;

    /// Primary keys of matching records in key order.
    fn get_all_keys(
        &self,
        source: &Source,
        query: Option<&KeyQuery>,
        count: Option<u32>,
    ) -> Request<Vec<Key>>;

    /// Primary key of the first matching record.
    fn get_key(&self, source: &Source, query: &KeyQuery) -> Request<Option<Key>>;

    /// Number of matching records.
    fn count(&self, source: &Source, query: Option<&KeyQuery>) -> Request<u64>;

    /// Opens a cursor positioned on the first matching entry, or `None` if
    /// nothing matches. With `key_only` the entries carry no value.
    fn open_cursor(
        &self,
        source: &Source,
        query: Option<&KeyQuery>,
        direction: CursorDirection,
        key_only: bool,
    ) -> Request<Option<Box<dyn RawCursor>>>;

    /// Inserts or replaces the record under `key`, returning the key.
    fn put(&self, store: &str, key: &Key, value: &Value) -> Request<Key>;

    /// Deletes every record matching the query.
    fn delete(&self, store: &str, query: &KeyQuery) -> Request<()>;

    /// Deletes every record of the store.
    fn clear(&self, store: &str) -> Request<()>;
}

/// One cursor position.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    /// Key in the cursor's source: the primary key for stores, the index key
    /// for indexes.
    pub key: Key,
    /// Primary key of the record.
    pub primary_key: Key,
    /// Record, absent for key-only cursors.
    pub value: Option<Value>,
}

/// A cursor over a store or index.
pub trait RawCursor: Send {
    /// Entry the cursor is positioned on.
    fn current(&self) -> Option<RawEntry>;

    /// Moves to the next entry in the cursor's direction; `None` once
    /// exhausted.
    fn advance(&mut self) -> Request<Option<RawEntry>>;

    /// Replaces the record at the current position, returning its primary
    /// key.
    fn update(&mut self, value: Value) -> Request<Key>;
}

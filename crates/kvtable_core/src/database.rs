//! Database handle.

use crate::config::{Config, TableConfig};
use crate::error::CoreResult;
use crate::query::{Index, Store};
use crate::request::settle;
use crate::schema::{self, SchemaItem};
use crate::transaction::Transaction;
use kvtable_engine::{
    Connection, SchemaEditor, StorageEngine, TransactionMode, UpgradeCallback, UpgradeInfo,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

struct DbInner {
    engine: Arc<dyn StorageEngine>,
    conn: Arc<dyn Connection>,
    config: Config,
}

/// An open database.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    /// Opens a database, running `on_upgrade` when `config.version` is newer
    /// than the stored version.
    ///
    /// Engines commit idle transactions on their own, so the handle must be
    /// driven from a current-thread runtime (`#[tokio::test]` and
    /// `Builder::new_current_thread`). On a multi-thread runtime an implicit
    /// transaction can commit between the read and the write of
    /// [`Table::update`](crate::Table::update), which then returns `None`.
    ///
    /// # Errors
    ///
    /// Fails with the engine's `Version`, `Blocked` or `UpgradeAborted` error.
    pub async fn open(
        engine: Arc<dyn StorageEngine>,
        config: Config,
        on_upgrade: Option<UpgradeCallback>,
    ) -> CoreResult<Self> {
        let conn = settle("open", engine.open(&config.name, config.version, on_upgrade)).await?;
        info!(database = %config.name, version = config.version, "database ready");
        Ok(Self {
            inner: Arc::new(DbInner {
                engine,
                conn,
                config,
            }),
        })
    }

    /// Opens a database whose schema is derived from table declarations.
    ///
    /// On upgrade every existing store is dropped and the declared stores and
    /// indexes are created from scratch.
    pub async fn open_with_tables(
        engine: Arc<dyn StorageEngine>,
        config: Config,
        tables: &[TableConfig],
    ) -> CoreResult<Self> {
        let items = SchemaItem::collect(tables);
        let on_upgrade: UpgradeCallback =
            Box::new(move |editor: &mut dyn SchemaEditor, info: UpgradeInfo| {
                debug!(from = info.old_version, to = info.new_version, "rebuilding schema");
                schema::clear(editor)?;
                schema::apply(editor, &items)
            });
        Self::open(engine, config, Some(on_upgrade)).await
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Version the database was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.conn.version()
    }

    /// Configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Names of every store.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.inner.conn.store_names()
    }

    /// Query surface over a store.
    #[must_use]
    pub fn store(&self, name: &str) -> Store {
        Store::new(self.clone(), name)
    }

    /// Query surface over an index of a store.
    #[must_use]
    pub fn index(&self, store: &str, index: &str) -> Index {
        Index::new(self.clone(), store, index)
    }

    /// Starts a transaction over `stores`.
    pub fn transaction(&self, stores: &[&str], mode: TransactionMode) -> CoreResult<Transaction> {
        Ok(Transaction::from_engine(self.inner.conn.transaction(stores, mode)?))
    }

    /// Closes the connection for every handle.
    pub fn close(&self) {
        self.inner.conn.close();
        debug!(database = %self.name(), "database closed");
    }

    /// Closes the connection and deletes the database.
    ///
    /// # Errors
    ///
    /// Fails with `Blocked` while other connections remain open.
    pub async fn delete(self) -> CoreResult<()> {
        self.close();
        settle("delete_database", self.inner.engine.delete_database(self.name())).await?;
        info!(database = %self.name(), "database deleted");
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

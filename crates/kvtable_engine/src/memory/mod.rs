//! In-process reference engine.
//!
//! `MemoryEngine` implements the full engine contract over ordered maps. It
//! keeps nothing across process restarts and makes no durability claims.

mod cursor;
mod store;
mod transaction;

pub use cursor::MemoryCursor;
pub use transaction::MemoryTransaction;

use crate::backend::{Connection, EngineTransaction, SchemaEditor, StorageEngine, UpgradeCallback, UpgradeInfo};
use crate::error::{EngineError, EngineResult};
use crate::request::Request;
use crate::schema::{IndexDecl, StoreDecl};
use crate::types::{TransactionId, TransactionMode};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use store::StoreData;
use tracing::debug;

/// Shared state of one database.
#[derive(Debug)]
pub(crate) struct DatabaseState {
    name: String,
    meta: Mutex<Meta>,
    stores: RwLock<BTreeMap<String, StoreData>>,
    next_txn: AtomicU64,
}

#[derive(Debug, Default)]
struct Meta {
    version: u64,
    connections: usize,
}

impl DatabaseState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            meta: Mutex::new(Meta::default()),
            stores: RwLock::new(BTreeMap::new()),
            next_txn: AtomicU64::new(1),
        }
    }
}

/// An in-memory engine.
///
/// # Example
///
/// ```rust
/// use kvtable_engine::{MemoryEngine, StorageEngine, StoreDecl, SchemaEditor, UpgradeInfo};
///
/// let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// rt.block_on(async {
///     let engine = MemoryEngine::new();
///     let conn = engine
///         .open("app", 1, Some(Box::new(|schema: &mut dyn SchemaEditor, _: UpgradeInfo| {
///             schema.create_store(&StoreDecl::new("notes"))
///         })))
///         .await
///         .unwrap();
///     assert_eq!(conn.store_names(), vec!["notes".to_string()]);
/// });
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<DatabaseState>>>,
}

impl MemoryEngine {
    /// Creates an engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every database, sorted.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn open_now(
        &self,
        name: &str,
        version: u64,
        on_upgrade: Option<UpgradeCallback>,
    ) -> EngineResult<Arc<dyn Connection>> {
        let mut databases = self.databases.lock();
        let created = !databases.contains_key(name);
        let db = databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DatabaseState::new(name)))
            .clone();

        let upgraded = Self::upgrade(&db, version, on_upgrade);
        if upgraded.is_err() && created {
            databases.remove(name);
        }
        upgraded?;

        db.meta.lock().connections += 1;
        debug!(database = name, version, "database opened");
        Ok(Arc::new(MemoryConnection {
            db,
            version,
            closed: AtomicBool::new(false),
        }))
    }

    fn upgrade(db: &DatabaseState, version: u64, on_upgrade: Option<UpgradeCallback>) -> EngineResult<()> {
        let mut meta = db.meta.lock();
        let current = meta.version;
        if version == 0 || version < current {
            return Err(EngineError::Version {
                requested: version,
                current,
            });
        }
        if version == current {
            return Ok(());
        }
        if meta.connections > 0 {
            return Err(EngineError::blocked(format!(
                "{} open connection(s) to '{}' prevent upgrade to version {version}",
                meta.connections, db.name
            )));
        }

        let mut stage = SchemaStage {
            stores: db.stores.read().clone(),
        };
        if let Some(callback) = on_upgrade {
            let info = UpgradeInfo {
                old_version: current,
                new_version: version,
            };
            callback(&mut stage, info).map_err(|e| EngineError::UpgradeAborted {
                message: e.to_string(),
            })?;
        }
        *db.stores.write() = stage.stores;
        meta.version = version;
        debug!(database = %db.name, from = current, to = version, "database upgraded");
        Ok(())
    }
}

impl StorageEngine for MemoryEngine {
    fn open(
        &self,
        name: &str,
        version: u64,
        on_upgrade: Option<UpgradeCallback>,
    ) -> Request<Arc<dyn Connection>> {
        Request::ready(self.open_now(name, version, on_upgrade))
    }

    fn delete_database(&self, name: &str) -> Request<()> {
        let mut databases = self.databases.lock();
        if let Some(db) = databases.get(name) {
            let connections = db.meta.lock().connections;
            if connections > 0 {
                return Request::ready(Err(EngineError::blocked(format!(
                    "{connections} open connection(s) to '{name}'"
                ))));
            }
            databases.remove(name);
            debug!(database = name, "database deleted");
        }
        Request::ready(Ok(()))
    }
}

/// Schema copy edited by the upgrade callback, installed only on success.
#[derive(Debug)]
struct SchemaStage {
    stores: BTreeMap<String, StoreData>,
}

impl SchemaEditor for SchemaStage {
    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn create_store(&mut self, decl: &StoreDecl) -> EngineResult<()> {
        if self.stores.contains_key(&decl.name) {
            return Err(EngineError::AlreadyExists {
                name: decl.name.clone(),
            });
        }
        self.stores.insert(decl.name.clone(), StoreData::default());
        Ok(())
    }

    fn delete_store(&mut self, name: &str) -> EngineResult<()> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::StoreNotFound {
                name: name.to_string(),
            })
    }

    fn create_index(&mut self, decl: &IndexDecl) -> EngineResult<()> {
        let store = self
            .stores
            .get_mut(&decl.store)
            .ok_or_else(|| EngineError::StoreNotFound {
                name: decl.store.clone(),
            })?;
        store.add_index(decl.clone())
    }

    fn delete_index(&mut self, store: &str, name: &str) -> EngineResult<()> {
        let data = self
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::StoreNotFound {
                name: store.to_string(),
            })?;
        if data.drop_index(name) {
            Ok(())
        } else {
            Err(EngineError::IndexNotFound {
                store: store.to_string(),
                index: name.to_string(),
            })
        }
    }
}

/// A connection to a [`MemoryEngine`] database.
#[derive(Debug)]
pub struct MemoryConnection {
    db: Arc<DatabaseState>,
    version: u64,
    closed: AtomicBool,
}

impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.db.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.db.stores.read().keys().cloned().collect()
    }

    fn transaction(
        &self,
        stores: &[&str],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn EngineTransaction>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::invalid_state("connection is closed"));
        }
        if stores.is_empty() {
            return Err(EngineError::invalid_state("transaction scope is empty"));
        }
        let known = self.db.stores.read();
        let mut scope = Vec::with_capacity(stores.len());
        for name in stores {
            if !known.contains_key(*name) {
                return Err(EngineError::StoreNotFound {
                    name: (*name).to_string(),
                });
            }
            if !scope.iter().any(|s: &String| s == name) {
                scope.push((*name).to_string());
            }
        }
        drop(known);

        let id = TransactionId::new(self.db.next_txn.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTransaction::start(Arc::clone(&self.db), id, scope, mode))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut meta = self.db.meta.lock();
            meta.connections = meta.connections.saturating_sub(1);
            debug!(database = %self.db.name, "connection closed");
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

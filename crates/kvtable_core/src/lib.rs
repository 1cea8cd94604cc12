//! # kvtable core
//!
//! Tables over an asynchronous transactional key-value engine.
//!
//! This crate provides:
//! - Awaitable requests and cursor iteration with early stop and in-place
//!   update
//! - A query layer over stores and indexes (point, range and bound reads,
//!   key-only reads, counts, iteration)
//! - Tables: a store plus its indexes, an optional write-through value
//!   mirror, an optional binary mirror and a per-record ticket
//! - Namespaced process caches shared between tables
//! - Value checks for validating records
//!
//! ## Runtime
//!
//! Transactions commit once the task using them goes idle. Run kvtable on a
//! current-thread tokio runtime; a multi-thread runtime can commit a
//! transaction in the middle of a read-modify-write.
//!
//! ## Example
//!
//! ```rust
//! use kvtable_core::{Config, Database, IndexConfig, MirrorConfig, ProcessCaches, Table, TableConfig};
//! use kvtable_engine::{MemoryEngine, StorageEngine};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! rt.block_on(async {
//!     let students = TableConfig::new("students", "id")
//!         .index(IndexConfig::new("name", "name"))
//!         .mirror(MirrorConfig::new("students"));
//!     let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
//!     let db = Database::open_with_tables(engine, Config::new("school"), &[students.clone()])
//!         .await
//!         .unwrap();
//!
//!     let table = Table::new(db, students, &ProcessCaches::new());
//!     table.add("s1", json!({"id": "s1", "name": "Ada"})).await.unwrap();
//!     let ada = table.get("s1").await.unwrap().unwrap();
//!     assert_eq!(ada["ticket"], -1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod check;
pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod query;
pub mod request;
pub mod schema;
pub mod table;
pub mod transaction;

pub use cache::{BufferCache, CacheNamespace, CacheRegistry, ProcessCaches, ValueCache};
pub use config::{Config, IndexConfig, MirrorConfig, TableConfig};
pub use cursor::{for_each, Cursor, CursorEntry, CursorUpdater, Flow};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use query::{Index, Reader, Store};
pub use request::settle;
pub use schema::SchemaItem;
pub use table::{BatchError, BatchSummary, Table};
pub use transaction::Transaction;

//! # kvtable engine
//!
//! The storage engine contract kvtable is built on, plus an in-memory
//! reference engine.
//!
//! A host engine is an asynchronous, ordered, transactional key-value store:
//! named stores of records under out-of-line primary keys, secondary indexes
//! over record fields, and transactions that commit on their own once the
//! issuing task goes idle. The engine's durability and locking are its own
//! business; this crate only fixes the surface.
//!
//! [`MemoryEngine`] spawns its idle commit checks on the current tokio
//! runtime, which must be a current-thread runtime for the idle rule to
//! hold.
//!
//! ## Contents
//!
//! - [`StorageEngine`], [`Connection`], [`EngineTransaction`], [`RawCursor`],
//!   [`SchemaEditor`] - the contract
//! - [`Key`], [`KeyRange`], [`KeyQuery`], [`KeyPath`] - the key model
//! - [`Request`] - single-settlement handle every operation returns
//! - [`MemoryEngine`] - reference implementation
//!
//! ## Example
//!
//! ```rust
//! use kvtable_engine::{
//!     Key, KeyQuery, MemoryEngine, SchemaEditor, Source, StorageEngine, StoreDecl,
//!     TransactionMode, UpgradeInfo,
//! };
//! use serde_json::json;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! rt.block_on(async {
//!     let engine = MemoryEngine::new();
//!     let conn = engine
//!         .open("app", 1, Some(Box::new(|schema: &mut dyn SchemaEditor, _: UpgradeInfo| {
//!             schema.create_store(&StoreDecl::new("notes"))
//!         })))
//!         .await
//!         .unwrap();
//!
//!     let txn = conn.transaction(&["notes"], TransactionMode::ReadWrite).unwrap();
//!     txn.put("notes", &Key::from("n1"), &json!({"text": "hi"})).await.unwrap();
//!     let note = txn.get(&Source::Store("notes".into()), &KeyQuery::from("n1")).await.unwrap();
//!     assert_eq!(note, Some(json!({"text": "hi"})));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod codec;
mod error;
mod key;
mod memory;
mod request;
mod schema;
mod types;

pub use backend::{
    Connection, EngineTransaction, RawCursor, RawEntry, SchemaEditor, StorageEngine,
    UpgradeCallback, UpgradeInfo,
};
pub use codec::{decode_record, encode_record};
pub use error::{EngineError, EngineResult};
pub use key::{Key, KeyPath, KeyQuery, KeyRange};
pub use memory::{MemoryConnection, MemoryCursor, MemoryEngine, MemoryTransaction};
pub use request::{Request, Responder};
pub use schema::{IndexDecl, StoreDecl};
pub use types::{CursorDirection, Source, TransactionId, TransactionMode, TransactionState};

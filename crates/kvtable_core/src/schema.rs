//! Schema setup from table declarations.
//!
//! Runs inside the engine's upgrade callback: existing stores are dropped,
//! then every declared store is created, then every declared index.

use crate::config::TableConfig;
use kvtable_engine::{EngineResult, IndexDecl, SchemaEditor, StoreDecl};
use tracing::{debug, warn};

/// One schema object declared by a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaItem {
    /// An object store.
    Collection(StoreDecl),
    /// An index on a store.
    Index(IndexDecl),
}

impl SchemaItem {
    /// Schema objects of one table: its store, then its indexes.
    pub fn for_table(table: &TableConfig) -> Vec<SchemaItem> {
        std::iter::once(SchemaItem::Collection(table.store_decl()))
            .chain(table.index_decls().into_iter().map(SchemaItem::Index))
            .collect()
    }

    /// Schema objects of several tables.
    pub fn collect(tables: &[TableConfig]) -> Vec<SchemaItem> {
        tables.iter().flat_map(SchemaItem::for_table).collect()
    }
}

/// Creates every collection, then every index whose collection exists.
///
/// An index whose collection is neither declared nor already present is
/// skipped with a warning.
pub fn apply(editor: &mut dyn SchemaEditor, items: &[SchemaItem]) -> EngineResult<()> {
    let (collections, indexes): (Vec<_>, Vec<_>) = items
        .iter()
        .partition(|item| matches!(item, SchemaItem::Collection(_)));

    for item in collections.into_iter().chain(indexes) {
        match item {
            SchemaItem::Collection(store) => {
                editor.create_store(store)?;
                debug!(store = %store.name, "store created");
            }
            SchemaItem::Index(index) => {
                if !editor.store_names().contains(&index.store) {
                    warn!(
                        store = %index.store,
                        index = %index.name,
                        "skipping index of an undeclared store"
                    );
                    continue;
                }
                editor.create_index(index)?;
                debug!(store = %index.store, index = %index.name, "index created");
            }
        }
    }
    Ok(())
}

/// Drops every store.
pub fn clear(editor: &mut dyn SchemaEditor) -> EngineResult<()> {
    for name in editor.store_names() {
        editor.delete_store(&name)?;
    }
    Ok(())
}

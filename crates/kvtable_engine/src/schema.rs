//! Schema declarations for stores and indexes.

use crate::key::KeyPath;

/// Declaration of an object store.
///
/// Stores use out-of-line keys: the primary key is supplied with every put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDecl {
    /// Store name, unique within a database.
    pub name: String,
}

impl StoreDecl {
    /// Creates a store declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Declaration of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDecl {
    /// Store the index belongs to.
    pub store: String,
    /// Index name, unique within the store.
    pub name: String,
    /// Where the index key comes from in each record.
    pub key_path: KeyPath,
    /// Whether two records may share an index key.
    pub unique: bool,
}

impl IndexDecl {
    /// Creates a non-unique index declaration.
    pub fn new(store: impl Into<String>, name: impl Into<String>, key_path: impl Into<KeyPath>) -> Self {
        Self {
            store: store.into(),
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// Sets whether the index is unique.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

//! Database and table configuration.

use kvtable_engine::{IndexDecl, KeyPath, StoreDecl};

/// Configuration for opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database name.
    pub name: String,

    /// Schema version. Opening at a newer version runs the upgrade callback.
    pub version: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "kvtable".to_string(),
            version: 1,
        }
    }
}

impl Config {
    /// Creates a configuration for `name` at version 1.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// A secondary index declared by a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Index name.
    pub name: String,
    /// Field (or fields, for a composite index) the index is keyed by.
    pub key_path: KeyPath,
    /// Whether two records may share an index key.
    pub unique: bool,
}

impl IndexConfig {
    /// A non-unique index.
    pub fn new(name: impl Into<String>, key_path: impl Into<KeyPath>) -> Self {
        Self {
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

/// Process cache namespace backing a table mirror.
///
/// An empty namespace is allowed and is distinct from every other name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorConfig {
    /// Namespace name.
    pub namespace: String,
}

impl MirrorConfig {
    /// Mirror in `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

/// Declaration of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Store holding the records.
    pub store: String,
    /// Record field carrying the primary key.
    pub key_field: String,
    /// Index over the key field.
    pub primary_index: IndexConfig,
    /// Secondary indexes.
    pub indexes: Vec<IndexConfig>,
    /// Value mirror, if any.
    pub mirror: Option<MirrorConfig>,
    /// Binary payload mirror, if any.
    pub buffer: Option<MirrorConfig>,
}

impl TableConfig {
    /// A table over `store` keyed by `key_field`.
    ///
    /// The primary index is named after the key field and is not unique.
    pub fn new(store: impl Into<String>, key_field: impl Into<String>) -> Self {
        let key_field = key_field.into();
        Self {
            store: store.into(),
            primary_index: IndexConfig::new(key_field.clone(), key_field.as_str()),
            key_field,
            indexes: Vec::new(),
            mirror: None,
            buffer: None,
        }
    }

    /// Replaces the primary index.
    #[must_use]
    pub fn primary_index(mut self, index: IndexConfig) -> Self {
        self.primary_index = index;
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    /// Enables the value mirror.
    #[must_use]
    pub fn mirror(mut self, mirror: MirrorConfig) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Enables the binary payload mirror.
    #[must_use]
    pub fn buffer(mut self, buffer: MirrorConfig) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Every index of the table, primary first.
    pub fn all_indexes(&self) -> impl Iterator<Item = &IndexConfig> {
        std::iter::once(&self.primary_index).chain(&self.indexes)
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn find_index(&self, name: &str) -> Option<&IndexConfig> {
        self.all_indexes().find(|index| index.name == name)
    }

    /// Store declaration.
    #[must_use]
    pub fn store_decl(&self) -> StoreDecl {
        StoreDecl::new(self.store.clone())
    }

    /// Index declarations, primary first.
    #[must_use]
    pub fn index_decls(&self) -> Vec<IndexDecl> {
        self.all_indexes()
            .map(|index| {
                IndexDecl::new(self.store.clone(), index.name.clone(), index.key_path.clone())
                    .unique(index.unique)
            })
            .collect()
    }
}

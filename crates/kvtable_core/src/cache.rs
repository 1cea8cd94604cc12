//! Namespaced process caches.
//!
//! A [`CacheRegistry`] maps namespace names to key-value maps that live for as
//! long as the registry does. Every handle obtained for the same name shares
//! the same map, so two tables configured with one namespace see each other's
//! writes.
//!
//! Locks are taken per call and never held across an await.

use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct NamespaceData<V> {
    entries: HashMap<String, V>,
    hydrated: bool,
}

impl<V> Default for NamespaceData<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hydrated: false,
        }
    }
}

type Shared<V> = Arc<RwLock<NamespaceData<V>>>;

/// Registry of cache namespaces.
///
/// Cloning the registry yields another handle to the same namespaces.
pub struct CacheRegistry<V> {
    namespaces: Arc<RwLock<HashMap<String, Shared<V>>>>,
}

/// Cache of records, the table value mirror.
pub type ValueCache = CacheRegistry<Value>;

/// Cache of binary payloads, the table buffer mirror.
pub type BufferCache = CacheRegistry<Bytes>;

impl<V> Clone for CacheRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            namespaces: Arc::clone(&self.namespaces),
        }
    }
}

impl<V> Default for CacheRegistry<V> {
    fn default() -> Self {
        Self {
            namespaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<V> fmt::Debug for CacheRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("namespaces", &self.names())
            .finish()
    }
}

impl<V> CacheRegistry<V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the namespace, creating it on first use.
    pub fn namespace(&self, name: &str) -> CacheNamespace<V> {
        if let Some(data) = self.namespaces.read().get(name) {
            return CacheNamespace {
                name: name.to_string(),
                data: Arc::clone(data),
            };
        }
        let data = Arc::clone(self.namespaces.write().entry(name.to_string()).or_default());
        CacheNamespace {
            name: name.to_string(),
            data,
        }
    }

    /// Returns true if the namespace exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.namespaces.read().contains_key(name)
    }

    /// Names of every namespace, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Empties a namespace in place; existing handles stay attached to it.
    pub fn clear(&self, name: &str) {
        if let Some(data) = self.namespaces.read().get(name) {
            let mut data = data.write();
            data.entries.clear();
            data.hydrated = false;
        }
    }

    /// Removes a namespace. Returns false if it did not exist.
    ///
    /// Handles obtained earlier keep their now detached map; the next
    /// [`namespace`](Self::namespace) call starts a fresh one.
    pub fn destroy(&self, name: &str) -> bool {
        self.namespaces.write().remove(name).is_some()
    }
}

/// Handle to one cache namespace.
pub struct CacheNamespace<V> {
    name: String,
    data: Shared<V>,
}

impl<V> Clone for CacheNamespace<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data: Arc::clone(&self.data),
        }
    }
}

impl<V> fmt::Debug for CacheNamespace<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("CacheNamespace")
            .field("name", &self.name)
            .field("len", &data.entries.len())
            .field("hydrated", &data.hydrated)
            .finish()
    }
}

impl<V: Clone> CacheNamespace<V> {
    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.data.read().entries.get(key).cloned()
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.data.write().entries.insert(key.into(), value)
    }

    /// Removes `key`, returning its value.
    pub fn del(&self, key: &str) -> Option<V> {
        self.data.write().entries.remove(key)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.read().entries.contains_key(key)
    }

    /// Snapshot of every entry, ordered by key.
    #[must_use]
    pub fn all(&self) -> BTreeMap<String, V> {
        self.data
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Every key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.data.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    /// Returns true if the namespace holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().entries.is_empty()
    }

    /// Empties the namespace and drops its hydrated mark.
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.entries.clear();
        data.hydrated = false;
    }

    /// Records that the namespace now mirrors its whole store.
    pub fn mark_hydrated(&self) {
        self.data.write().hydrated = true;
    }

    /// Records that the namespace may be missing entries of its store.
    pub fn unmark_hydrated(&self) {
        self.data.write().hydrated = false;
    }

    /// Returns true once [`mark_hydrated`](Self::mark_hydrated) was called
    /// and no clear or [`unmark_hydrated`](Self::unmark_hydrated) happened
    /// since.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.data.read().hydrated
    }
}

/// The value and buffer registries of a process.
#[derive(Debug, Clone, Default)]
pub struct ProcessCaches {
    /// Record mirrors.
    pub values: ValueCache,
    /// Binary payload mirrors.
    pub buffers: BufferCache,
}

impl ProcessCaches {
    /// Creates empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

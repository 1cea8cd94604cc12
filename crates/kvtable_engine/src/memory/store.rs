//! Record and index storage of the memory engine.

use crate::codec::{decode_record, encode_record};
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyRange};
use crate::schema::IndexDecl;
use crate::types::CursorDirection;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Ordered index key to primary keys mapping.
///
/// Duplicate index keys keep their primary keys ordered, so traversal visits
/// duplicates in primary-key order.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    decl: IndexDecl,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexData {
    pub(crate) fn new(decl: IndexDecl) -> Self {
        Self {
            decl,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn decl(&self) -> &IndexDecl {
        &self.decl
    }

    /// Fails if a unique index already maps `key` to another record.
    fn check(&self, key: &Key, primary_key: &Key) -> EngineResult<()> {
        if self.decl.unique {
            if let Some(existing) = self.entries.get(key) {
                if existing.iter().any(|pk| pk != primary_key) {
                    return Err(EngineError::Constraint {
                        store: self.decl.store.clone(),
                        index: self.decl.name.clone(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, key: Key, primary_key: Key) {
        self.entries.entry(key).or_default().insert(primary_key);
    }

    fn remove(&mut self, key: &Key, primary_key: &Key) {
        if let Some(set) = self.entries.get_mut(key) {
            set.remove(primary_key);
            if set.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn key_of(&self, record: &Value) -> Option<Key> {
        self.decl.key_path.extract(record)
    }
}

/// Records of one store plus its indexes.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreData {
    records: BTreeMap<Key, Bytes>,
    indexes: BTreeMap<String, IndexData>,
}

impl StoreData {
    pub(crate) fn index(&self, name: &str) -> Option<&IndexData> {
        self.indexes.get(name)
    }

    pub(crate) fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub(crate) fn record(&self, primary_key: &Key) -> EngineResult<Option<Value>> {
        self.records
            .get(primary_key)
            .map(|bytes| decode_record(bytes))
            .transpose()
    }

    /// Inserts or replaces a record, returning the previous stored form.
    ///
    /// Unique violations are reported before anything changes.
    pub(crate) fn put(&mut self, key: Key, value: &Value) -> EngineResult<Option<Bytes>> {
        let bytes = encode_record(value)?;
        let mut index_keys = Vec::with_capacity(self.indexes.len());
        for (name, index) in &self.indexes {
            if let Some(index_key) = index.key_of(value) {
                index.check(&index_key, &key)?;
                index_keys.push((name.clone(), index_key));
            }
        }

        let previous = self.remove(&key)?;
        for (name, index_key) in index_keys {
            if let Some(index) = self.indexes.get_mut(&name) {
                index.insert(index_key, key.clone());
            }
        }
        self.records.insert(key, bytes);
        Ok(previous)
    }

    /// Removes a record and its index entries, returning its stored form.
    pub(crate) fn remove(&mut self, key: &Key) -> EngineResult<Option<Bytes>> {
        let Some(bytes) = self.records.remove(key) else {
            return Ok(None);
        };
        let old = decode_record(&bytes)?;
        for index in self.indexes.values_mut() {
            if let Some(index_key) = index.key_of(&old) {
                index.remove(&index_key, key);
            }
        }
        Ok(Some(bytes))
    }

    /// Puts back a stored form captured by `put` or `remove`.
    pub(crate) fn restore(&mut self, key: Key, previous: Option<Bytes>) -> EngineResult<()> {
        self.remove(&key)?;
        if let Some(bytes) = previous {
            let value = decode_record(&bytes)?;
            for index in self.indexes.values_mut() {
                if let Some(index_key) = index.key_of(&value) {
                    index.insert(index_key, key.clone());
                }
            }
            self.records.insert(key, bytes);
        }
        Ok(())
    }

    /// Creates an index over the records already stored.
    pub(crate) fn add_index(&mut self, decl: IndexDecl) -> EngineResult<()> {
        if self.indexes.contains_key(&decl.name) {
            return Err(EngineError::AlreadyExists {
                name: format!("{}.{}", decl.store, decl.name),
            });
        }
        let mut index = IndexData::new(decl);
        for (primary_key, bytes) in &self.records {
            let value = decode_record(bytes)?;
            if let Some(index_key) = index.key_of(&value) {
                index.check(&index_key, primary_key)?;
                index.insert(index_key, primary_key.clone());
            }
        }
        self.indexes.insert(index.decl.name.clone(), index);
        Ok(())
    }

    pub(crate) fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    /// `(source key, primary key)` pairs inside `range`, in ascending order.
    pub(crate) fn pairs<'a>(
        &'a self,
        index: Option<&'a IndexData>,
        range: &KeyRange,
    ) -> Box<dyn DoubleEndedIterator<Item = (&'a Key, &'a Key)> + 'a> {
        match index {
            None => Box::new(range_iter(&self.records, range).map(|(k, _)| (k, k))),
            Some(index) => Box::new(
                range_iter(&index.entries, range)
                    .flat_map(|(ik, pks)| pks.iter().map(move |pk| (ik, pk))),
            ),
        }
    }

    /// Primary keys of every record, in order.
    pub(crate) fn keys(&self) -> Vec<Key> {
        self.records.keys().cloned().collect()
    }

    /// Finds the next cursor position after `position` within `range`.
    ///
    /// With no position, returns the starting position for `direction`.
    pub(crate) fn seek(
        &self,
        index: Option<&IndexData>,
        range: &KeyRange,
        direction: CursorDirection,
        position: Option<(&Key, &Key)>,
    ) -> Option<(Key, Key)> {
        let reverse = direction.is_reverse();
        let window = match position {
            None => range.clone(),
            Some((key, _)) if reverse => before(range, key),
            Some((key, _)) => after(range, key),
        };

        let Some(index) = index else {
            let mut keys = range_iter(&self.records, &window).map(|(k, _)| k);
            let found = if reverse { keys.next_back() } else { keys.next() };
            return found.map(|k| (k.clone(), k.clone()));
        };

        if let (Some((key, primary_key)), false) = (position, direction.is_unique()) {
            if let Some(pks) = index.entries.get(key) {
                let dup = if reverse {
                    pks.range::<Key, _>(..primary_key).next_back()
                } else {
                    pks.range::<Key, _>((Bound::Excluded(primary_key), Bound::Unbounded))
                        .next()
                };
                if let Some(dup) = dup {
                    return Some((key.clone(), dup.clone()));
                }
            }
        }

        let mut groups = range_iter(&index.entries, &window);
        let (key, pks) = if reverse {
            groups.next_back()?
        } else {
            groups.next()?
        };
        // Unique directions land on the lowest primary key of a group.
        let pk = if direction == CursorDirection::Prev {
            pks.last()?
        } else {
            pks.first()?
        };
        Some((key.clone(), pk.clone()))
    }
}

fn range_iter<'a, V>(
    map: &'a BTreeMap<Key, V>,
    range: &KeyRange,
) -> impl DoubleEndedIterator<Item = (&'a Key, &'a V)> {
    (!range.is_empty())
        .then(|| map.range::<Key, _>(range.as_bounds()))
        .into_iter()
        .flatten()
}

fn after(range: &KeyRange, key: &Key) -> KeyRange {
    let tighter = match range.lower() {
        Bound::Included(lo) => lo > key,
        Bound::Excluded(lo) => lo >= key,
        Bound::Unbounded => false,
    };
    if tighter {
        range.clone()
    } else {
        KeyRange::from_bounds(Bound::Excluded(key.clone()), range.upper().cloned())
    }
}

fn before(range: &KeyRange, key: &Key) -> KeyRange {
    let tighter = match range.upper() {
        Bound::Included(hi) => hi < key,
        Bound::Excluded(hi) => hi <= key,
        Bound::Unbounded => false,
    };
    if tighter {
        range.clone()
    } else {
        KeyRange::from_bounds(range.lower().cloned(), Bound::Excluded(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn students() -> StoreData {
        let mut store = StoreData::default();
        store
            .add_index(IndexDecl::new("students", "id_time", vec!["id", "time"]).unique(true))
            .unwrap();
        store.add_index(IndexDecl::new("students", "id", "id")).unwrap();
        for (pk, id, time) in [("a", 1, 200), ("b", 1, 100), ("c", 1, 300), ("d", 2, 50)] {
            store
                .put(Key::from(pk), &json!({"id": id, "time": time}))
                .unwrap();
        }
        store
    }

    fn walk(store: &StoreData, index: &str, range: &KeyRange, direction: CursorDirection) -> Vec<Key> {
        let index = store.index(index);
        let mut out = Vec::new();
        let mut pos = store.seek(index, range, direction, None);
        while let Some((key, pk)) = pos {
            out.push(pk.clone());
            pos = store.seek(index, range, direction, Some((&key, &pk)));
        }
        out
    }

    #[test]
    fn unique_violation_leaves_store_untouched() {
        let mut store = students();
        let err = store
            .put(Key::from("e"), &json!({"id": 1, "time": 100}))
            .unwrap_err();
        assert!(err.is_constraint());
        assert!(store.record(&Key::from("e")).unwrap().is_none());
        assert_eq!(
            store.record(&Key::from("b")).unwrap(),
            Some(json!({"id": 1, "time": 100}))
        );
    }

    #[test]
    fn replacing_a_record_moves_its_index_entries() {
        let mut store = students();
        store.put(Key::from("b"), &json!({"id": 2, "time": 100})).unwrap();
        let ids = store.index("id");
        let ones: Vec<_> = store.pairs(ids, &KeyRange::only(1)).map(|(_, pk)| pk.clone()).collect();
        assert_eq!(ones, vec![Key::from("a"), Key::from("c")]);
    }

    #[test]
    fn duplicate_directions() {
        let store = students();
        let all = KeyRange::all();
        assert_eq!(
            walk(&store, "id", &all, CursorDirection::Next),
            vec![Key::from("a"), Key::from("b"), Key::from("c"), Key::from("d")]
        );
        assert_eq!(
            walk(&store, "id", &all, CursorDirection::NextUnique),
            vec![Key::from("a"), Key::from("d")]
        );
        assert_eq!(
            walk(&store, "id", &all, CursorDirection::Prev),
            vec![Key::from("d"), Key::from("c"), Key::from("b"), Key::from("a")]
        );
        assert_eq!(
            walk(&store, "id", &all, CursorDirection::PrevUnique),
            vec![Key::from("d"), Key::from("a")]
        );
    }

    #[test]
    fn composite_prefix_walk() {
        let store = students();
        let range = KeyRange::prefix(vec![Key::from(1)]);
        assert_eq!(
            walk(&store, "id_time", &range, CursorDirection::Next),
            vec![Key::from("b"), Key::from("a"), Key::from("c")]
        );
        assert_eq!(
            walk(&store, "id_time", &range, CursorDirection::Prev),
            vec![Key::from("c"), Key::from("a"), Key::from("b")]
        );
    }

    #[test]
    fn restore_undoes_put() {
        let mut store = students();
        let previous = store.put(Key::from("a"), &json!({"id": 9, "time": 9})).unwrap();
        store.restore(Key::from("a"), previous).unwrap();
        assert_eq!(
            store.record(&Key::from("a")).unwrap(),
            Some(json!({"id": 1, "time": 200}))
        );
        assert_eq!(store.pairs(store.index("id"), &KeyRange::only(9)).count(), 0);
    }

    #[test]
    fn unique_index_over_conflicting_records_fails() {
        let mut store = students();
        let err = store
            .add_index(IndexDecl::new("students", "by_id", "id").unique(true))
            .unwrap_err();
        assert!(err.is_constraint());
        assert!(!store.has_index("by_id"));
    }
}

//! Test fixtures and database helpers.
//!
//! Provides the students database used across the integration tests and a
//! typed table wrapper showing how applications sit on top of [`Table`].

use kvtable_core::{
    Config, CoreResult, Database, IndexConfig, MirrorConfig, ProcessCaches, Table, TableConfig,
};
use kvtable_engine::{Key, MemoryEngine, StorageEngine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Store of the students fixture.
pub const STUDENTS: &str = "students";

/// Composite unique index over `[id, time]`.
pub const ID_TIME: &str = "id_time";

/// Students table: keyed out of line by `uuid`, indexed by `id` and by the
/// unique pair `[id, time]`, mirrored in the `students` namespace.
pub fn students_table() -> TableConfig {
    TableConfig::new(STUDENTS, "uuid")
        .index(IndexConfig::new("id", "id"))
        .index(IndexConfig::new(ID_TIME, vec!["id", "time"]).unique(true))
        .mirror(MirrorConfig::new(STUDENTS))
}

/// Table with a unique `by_id` index and a plain `by_name` index.
pub fn people_table() -> TableConfig {
    TableConfig::new("people", "key")
        .index(IndexConfig::new("by_id", "id").unique(true))
        .index(IndexConfig::new("by_name", "name"))
        .buffer(MirrorConfig::new("avatars"))
}

/// A fresh in-memory engine.
pub fn memory_engine() -> Arc<dyn StorageEngine> {
    Arc::new(MemoryEngine::new())
}

/// Opens `name` on a fresh engine with the schema of `tables`.
pub async fn open_memory(name: &str, tables: &[TableConfig]) -> Database {
    Database::open_with_tables(memory_engine(), Config::new(name), tables)
        .await
        .expect("Failed to open in-memory database")
}

/// The students database with its table and caches.
pub struct School {
    /// The database instance.
    pub db: Database,
    /// Caches the tables were built with.
    pub caches: ProcessCaches,
    /// The students table.
    pub students: Table,
}

impl School {
    /// Opens an empty students database.
    pub async fn open() -> Self {
        let db = open_memory("school", &[students_table()]).await;
        let caches = ProcessCaches::new();
        let students = Table::new(db.clone(), students_table(), &caches);
        Self {
            db,
            caches,
            students,
        }
    }

    /// Adds student 1 at times 200, 100 and 300 and student 2 at 150.
    ///
    /// The insertion order is deliberately not time order.
    pub async fn seed_times(&self) {
        for (uuid, id, time) in [("s1-b", 1, 200), ("s1-a", 1, 100), ("s1-c", 1, 300), ("s2-a", 2, 150)] {
            let added = self
                .students
                .add(uuid, json!({"uuid": uuid, "id": id, "time": time}))
                .await
                .expect("Failed to add student");
            assert!(added, "student {uuid} was rejected");
        }
    }
}

/// A person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Primary key.
    pub key: String,
    /// Unique external id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Version marker maintained by the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<i64>,
}

impl Person {
    /// A person without a ticket.
    pub fn new(key: &str, id: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            ticket: None,
        }
    }
}

/// Typed view of the people table.
pub struct People {
    table: Table,
}

impl People {
    /// Wraps a table built from [`people_table`].
    pub fn new(db: Database, caches: &ProcessCaches) -> Self {
        Self {
            table: Table::new(db, people_table(), caches),
        }
    }

    /// The untyped table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Adds a person under its key.
    pub async fn add(&self, person: &Person) -> CoreResult<bool> {
        let value = serde_json::to_value(person)?;
        self.table.add(person.key.as_str(), value).await
    }

    /// Person under `key`.
    pub async fn get(&self, key: &str) -> CoreResult<Option<Person>> {
        self.table.get(key).await?.map(decode).transpose()
    }

    /// Person with the given external id.
    pub async fn by_id(&self, id: &str) -> CoreResult<Option<Person>> {
        self.table
            .get_by_index_name("by_id", Key::from(id))
            .await?
            .map(decode)
            .transpose()
    }

    /// Renames a person, bumping the ticket.
    pub async fn rename(&self, key: &str, name: &str) -> CoreResult<Option<Person>> {
        let name = name.to_string();
        self.table
            .update(key, move |mut value| {
                value["name"] = Value::String(name);
                value
            }, false)
            .await?
            .map(decode)
            .transpose()
    }
}

fn decode(value: Value) -> CoreResult<Person> {
    Ok(serde_json::from_value(value)?)
}

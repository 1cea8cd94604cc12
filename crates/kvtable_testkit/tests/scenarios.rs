//! End-to-end scenarios over the students and people fixtures.

use kvtable_core::{CoreError, Flow, ProcessCaches, Table, TableConfig};
use kvtable_engine::{CursorDirection, EngineError, Key, KeyRange, TransactionMode};
use kvtable_testkit::prelude::*;
use serde_json::json;
use std::time::Duration;

/// Walks `id_time` over student `id` in `direction` and returns the time of
/// the last entry visited.
async fn last_time(school: &School, id: i64, direction: CursorDirection) -> Option<f64> {
    let mut last = None;
    school
        .students
        .iterate_all_keys(
            ID_TIME,
            Some(KeyRange::prefix(vec![Key::from(id)])),
            direction,
            |_, index_key, _| {
                last = index_key.as_array().and_then(|parts| parts[1].as_number());
                async { Ok::<_, CoreError>(()) }
            },
        )
        .await
        .unwrap();
    last
}

#[tokio::test]
async fn earliest_and_latest_by_composite_index() {
    init_logging();
    let school = School::open().await;
    school.seed_times().await;

    assert_eq!(last_time(&school, 1, CursorDirection::PrevUnique).await, Some(100.0));
    assert_eq!(last_time(&school, 1, CursorDirection::NextUnique).await, Some(300.0));
    assert_eq!(last_time(&school, 2, CursorDirection::Next).await, Some(150.0));
    assert_eq!(last_time(&school, 3, CursorDirection::Next).await, None);
}

#[tokio::test]
async fn first_entry_of_each_direction() {
    let school = School::open().await;
    school.seed_times().await;

    let range = Some(KeyRange::prefix(vec![Key::from(1)]));
    let mut first = None;
    school
        .students
        .iterate_all_keys(ID_TIME, range, CursorDirection::Prev, |primary, _, _| {
            first = Some(primary);
            async { Ok::<_, CoreError>(Flow::Stop) }
        })
        .await
        .unwrap();
    assert_eq!(first, Some(Key::from("s1-c")));
}

#[tokio::test]
async fn composite_unique_index_rejects_duplicates() {
    let school = School::open().await;
    school.seed_times().await;

    let clash = json!({"uuid": "dup", "id": 1, "time": 100});
    assert!(!school.students.add("dup", clash).await.unwrap());
    assert_eq!(school.students.get("dup").await.unwrap(), None);
    assert_eq!(school.students.get_all_arr().await.unwrap().len(), 4);
}

#[tokio::test]
async fn unique_violation_keeps_the_first_record() {
    let db = open_memory("people", &[people_table()]).await;
    let people = People::new(db, &ProcessCaches::new());

    assert!(people.add(&Person::new("1234", "12341234", "asdf")).await.unwrap());
    assert!(!people.add(&Person::new("4321", "12341234", "asdf")).await.unwrap());

    let first = people.get("1234").await.unwrap().unwrap();
    assert_eq!(first.name, "asdf");
    assert_eq!(first.ticket, Some(-1));
    assert_eq!(people.by_id("12341234").await.unwrap().unwrap().key, "1234");
    assert_eq!(people.get("4321").await.unwrap(), None);
}

#[tokio::test]
async fn typed_updates_move_the_ticket() {
    let db = open_memory("people", &[people_table()]).await;
    let people = People::new(db, &ProcessCaches::new());
    people.add(&Person::new("k", "i", "before")).await.unwrap();

    let renamed = people.rename("k", "after").await.unwrap().unwrap();
    assert_eq!(renamed.name, "after");
    assert_eq!(renamed.ticket, Some(-2));
    assert_eq!(people.rename("missing", "x").await.unwrap(), None);
}

#[tokio::test]
async fn shared_transaction_finishes_when_idle() {
    let school = School::open().await;
    let store = school.students.store();
    let tx = school
        .db
        .transaction(&[STUDENTS], TransactionMode::ReadWrite)
        .unwrap();

    for n in 0..100 {
        let uuid = format!("u{n:03}");
        store
            .put(uuid.as_str(), &json!({"uuid": uuid, "id": n, "time": n}), Some(&tx))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = store
        .put("late", &json!({"uuid": "late", "id": -1, "time": 0}), Some(&tx))
        .await
        .unwrap_err();
    assert!(err.is_transaction_finished());
    assert_eq!(store.count(None, None).await.unwrap(), 100);
}

#[tokio::test]
async fn aborted_transaction_rolls_back() {
    let school = School::open().await;
    let store = school.students.store();
    let tx = school
        .db
        .transaction(&[STUDENTS], TransactionMode::ReadWrite)
        .unwrap();
    store
        .put("gone", &json!({"uuid": "gone", "id": 9, "time": 9}), Some(&tx))
        .await
        .unwrap();
    tx.abort().unwrap();

    assert_eq!(store.get("gone", None).await.unwrap(), None);
    let err = store.get("gone", Some(&tx)).await.unwrap_err();
    assert!(matches!(err.engine(), Some(EngineError::TransactionFinished { .. })));
}

#[tokio::test]
async fn tables_sharing_a_namespace_share_a_mirror() {
    let db = open_memory("shared", &[students_table()]).await;
    let caches = ProcessCaches::new();
    let a = Table::new(db.clone(), students_table(), &caches);
    let b = Table::new(db, students_table(), &caches);

    a.add("x", json!({"uuid": "x", "id": 1, "time": 1})).await.unwrap();
    assert!(b.mirror().unwrap().contains("x"));
    b.del("x").await.unwrap();
    assert!(!a.mirror().unwrap().contains("x"));
}

#[tokio::test]
async fn binary_mirror_never_reaches_the_store() {
    let db = open_memory("people", &[people_table()]).await;
    let people = People::new(db, &ProcessCaches::new());
    let table = people.table();

    table.set_in_cache("1234", bytes::Bytes::from_static(b"png"));
    assert!(table.get_in_cache("1234").is_some());
    assert!(table.get_all_arr().await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_index_errors_surface_verbatim() {
    let config = TableConfig::new("solo", "k");
    let db = open_memory("solo", &[config]).await;
    assert_eq!(db.store_names(), vec!["solo".to_string()]);
    let err = db.index("solo", "nope").get("x", None).await.unwrap_err();
    assert!(matches!(err.engine(), Some(EngineError::IndexNotFound { .. })));
}

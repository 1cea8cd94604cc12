//! Table properties: tickets, mirror coherence, bound semantics.

use kvtable_core::table::read_ticket;
use kvtable_core::{CoreError, IndexConfig, MirrorConfig, ProcessCaches, Table, TableConfig};
use kvtable_engine::{CursorDirection, Key, KeyRange};
use kvtable_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};

fn colors() -> TableConfig {
    TableConfig::new("colors", "uuid")
        .index(IndexConfig::new("title", "title"))
        .mirror(MirrorConfig::new("colors"))
}

async fn colors_table() -> Table {
    let db = open_memory("props", &[colors()]).await;
    Table::new(db, colors(), &ProcessCaches::new())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn uuids(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| v["uuid"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn add_get_update_del() {
    init_logging();
    let table = colors_table().await;

    assert!(table.add("a", json!({"uuid": "a", "title": "red"})).await.unwrap());
    let got = table.get("a").await.unwrap().unwrap();
    assert_eq!(read_ticket(&got), Some(-1));

    let first = table.update("a", |v| v, false).await.unwrap().unwrap();
    let second = table.update("a", |v| v, false).await.unwrap().unwrap();
    assert_eq!(read_ticket(&second), read_ticket(&first).map(|t| t - 1));

    assert!(table.del("a").await.unwrap());
    assert_eq!(table.get("a").await.unwrap(), None);
    assert!(!table.mirror().unwrap().contains("a"));
}

#[tokio::test]
async fn stale_ticket_restarts() {
    let table = colors_table().await;
    table
        .store()
        .put("a", &json!({"uuid": "a", "ticket": 5}), None)
        .await
        .unwrap();
    let updated = table.update("a", |v| v, false).await.unwrap().unwrap();
    assert_eq!(read_ticket(&updated), Some(-1));
}

#[tokio::test]
async fn bounds_are_idempotent_and_exclusive() {
    let table = colors_table().await;
    for uuid in ["a", "b", "c", "d", "e"] {
        table.add(uuid, json!({"uuid": uuid, "title": "red"})).await.unwrap();
    }

    let once = table.get_all_arr_bound("b", "d", false, false).await.unwrap();
    let twice = table.get_all_arr_bound("b", "d", false, false).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(uuids(&once), ["b", "c", "d"]);

    let open = table.get_all_arr_bound("b", "d", true, true).await.unwrap();
    assert_eq!(uuids(&open), ["c"]);

    let lower = table.store().get_all_lb("d", false, None).await.unwrap();
    assert_eq!(uuids(&lower), ["d", "e"]);
    assert!(table.get_all_arr_bound("d", "b", false, false).await.unwrap().is_empty());

    assert_eq!(
        table.get_key_bound("uuid", "b", "d", true, false).await.unwrap(),
        Some(Key::from("c"))
    );
    assert_eq!(table.get_key_ub("uuid", "b", true).await.unwrap(), Some(Key::from("a")));
    assert_eq!(table.get_key_lb("uuid", "e", true).await.unwrap(), None);
}

#[tokio::test]
async fn handler_stops_at_the_third_entry() {
    let table = colors_table().await;
    for n in 0..10 {
        let uuid = format!("k{n}");
        table.add(uuid.as_str(), json!({"uuid": uuid, "title": "red"})).await.unwrap();
    }

    let mut calls = 0;
    table
        .store()
        .iterate_all(None, CursorDirection::Next, None, |_, _, _| {
            calls += 1;
            let go_on = calls < 3;
            async move { Ok::<_, CoreError>(go_on) }
        })
        .await
        .unwrap();
    assert_eq!(calls, 3);
}

#[tokio::test]
async fn no_entries_means_no_calls() {
    let table = colors_table().await;
    let mut calls = 0;
    table
        .iterate_all_keys("title", Some(KeyRange::only("red")), CursorDirection::Next, |_, _, _| {
            calls += 1;
            async { Ok::<_, CoreError>(()) }
        })
        .await
        .unwrap();
    assert_eq!(calls, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn hydrated_mirror_answers_like_the_store(records in records_strategy(16)) {
        let rt = runtime();
        rt.block_on(async {
            let table = colors_table().await;
            let summary = table
                .add_lots(records.clone(), |_| {}, |_| {}, None)
                .await
                .unwrap();
            assert_eq!(summary.succeeded, records.len());

            let cold_all = table.get_all_arr().await.unwrap();
            let cold_red = table.get_all_arr_by_index_name("title", "red").await.unwrap();
            let cold_keys = table.get_all_primary_keys(None).await.unwrap();

            assert!(table.hydrate().await.unwrap());
            assert_eq!(table.get_all_arr().await.unwrap(), cold_all);
            assert_eq!(table.get_all_arr_by_index_name("title", "red").await.unwrap(), cold_red);
            assert_eq!(table.get_all_primary_keys(None).await.unwrap(), cold_keys);
        });
    }

    #[test]
    fn every_added_record_reads_back(records in records_strategy(16)) {
        let rt = runtime();
        rt.block_on(async {
            let table = colors_table().await;
            for record in &records {
                let key = record["uuid"].as_str().unwrap();
                assert!(table.add(key, record.clone()).await.unwrap());
            }
            for record in &records {
                let key = record["uuid"].as_str().unwrap();
                let got = table.get(key).await.unwrap().unwrap();
                assert_eq!(got["size"], record["size"]);
                assert_eq!(read_ticket(&got), Some(-1));
            }
        });
    }
}

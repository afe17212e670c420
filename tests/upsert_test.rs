mod common;

use common::{book, keys, load_library, open, sorted_keys};
use serde_json::json;
use tempfile::TempDir;
use vellum::{ErrorKind, Query, Record, UpsertMode, UpsertStatus};

const DUPLICATE: &str = "The record with same primary key already exists";

#[test]
fn insert_of_an_existing_key_is_refused_and_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());
    load_library(&engine);
    let before = engine.get("101").unwrap().unwrap();
    let version = engine.stats().unwrap().version;

    for _ in 0..3 {
        let log = engine
            .upsert_json(&json!({"id": "101", "title": "Replacement title"}), UpsertMode::Insert)
            .unwrap();
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].status, UpsertStatus::Failed);
        assert_eq!(log.entries[0].reason.as_deref(), Some(DUPLICATE));
    }

    assert_eq!(engine.get("101").unwrap().unwrap(), before);
    assert_eq!(engine.stats().unwrap().version, version);
    assert_eq!(engine.search_str("replacement").unwrap().total_hits, 0);

    let err = engine.insert(book("101", "again", &[], 0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[test]
fn batch_rejects_conflicts_and_applies_the_rest() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());
    load_library(&engine);

    let payload = json!([
        {"id": "102", "title": "Conflicting quasar"},
        {"id": "103", "title": "Conflicting quasar"},
        {"id": "115", "title": "Brand new quasar", "ranking": 4},
        {"id": "116", "title": "Another quasar", "ranking": 8}
    ]);
    let log = engine.upsert_json(&payload, UpsertMode::Insert).unwrap();

    let outcome: Vec<_> = log.entries.iter().map(|e| (e.rid.as_str(), e.status)).collect();
    assert_eq!(
        outcome,
        vec![
            ("102", UpsertStatus::Failed),
            ("103", UpsertStatus::Failed),
            ("115", UpsertStatus::Success),
            ("116", UpsertStatus::Success),
        ]
    );

    let found = engine.search_str("quasar").unwrap();
    assert_eq!(sorted_keys(&found), vec!["115", "116"]);

    let wire = log.to_json();
    assert_eq!(wire[0]["reason"], DUPLICATE);
    assert_eq!(wire[2]["status"], "success");
}

#[test]
fn update_replaces_attributes_and_reindexes() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());
    load_library(&engine);

    engine.update(book("101", "Keep the aspidistra flying", &["George Orwell"], 6)).unwrap();

    assert_eq!(engine.search_str("paris").unwrap().total_hits, 0);
    assert_eq!(keys(&engine.search_str("aspidistra").unwrap()), vec!["101"]);
    assert_eq!(engine.stats().unwrap().records, 5);

    let log = engine
        .update_batch(vec![book("101", "Burmese days", &[], 2), book("200", "New arrival", &[], 1)])
        .unwrap();
    assert_eq!(log.succeeded(), 2);
    assert_eq!(engine.get("101").unwrap().unwrap().values("authors").len(), 0);
    assert!(engine.get("200").unwrap().is_some());
}

#[test]
fn invalid_records_fail_individually() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());

    let log = engine
        .upsert_json(
            &json!([
                {"title": "no key"},
                {"id": "1", "title": ["two", "titles"]},
                {"id": "2", "ranking": "high"},
                {"id": "3", "title": "fine"},
                "not an object"
            ]),
            UpsertMode::Insert,
        )
        .unwrap();

    let statuses: Vec<_> = log.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            UpsertStatus::Failed,
            UpsertStatus::Failed,
            UpsertStatus::Failed,
            UpsertStatus::Success,
            UpsertStatus::Failed,
        ]
    );
    assert_eq!(log.entries[3].rid, "3");

    let unknown = engine.insert(Record::new("4").with("colour", "red")).unwrap_err();
    assert_eq!(unknown.kind, ErrorKind::Schema);
}

#[test]
fn delete_removes_record_and_postings() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());
    load_library(&engine);

    engine.delete("104").unwrap();
    assert!(engine.get("104").unwrap().is_none());
    assert_eq!(keys(&engine.search_str("smith").unwrap()), vec!["102"]);
    assert_eq!(engine.search(&Query::match_all()).unwrap().total_hits, 4);

    assert_eq!(engine.delete("104").unwrap_err().kind, ErrorKind::NotFound);

    // the key is free again for a strict insert
    engine.insert(book("104", "Smith returns", &[], 1)).unwrap();
    assert_eq!(sorted_keys(&engine.search_str("smith").unwrap()), vec!["102", "104"]);
}

#[test]
fn large_batches_are_analyzed_in_parallel_but_logged_in_order() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());

    let records: Vec<Record> = (0..200)
        .map(|i| book(&format!("r{}", i), &format!("volume {} of the series", i), &[], i))
        .collect();
    let log = engine.insert_batch(records).unwrap();

    assert_eq!(log.succeeded(), 200);
    assert_eq!(log.entries[0].rid, "r0");
    assert_eq!(log.entries[199].rid, "r199");
    assert_eq!(engine.search_str("series").unwrap().total_hits, 200);
}

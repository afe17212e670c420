#![allow(dead_code)]

use serde_json::json;
use tempfile::TempDir;
use vellum::{Config, Engine, FieldDefinition, Record, Schema, SearchResults, SyncMode, UpsertMode};

/// Books: searchable title and body, positional multi-valued authors.
pub fn books_schema() -> Schema {
    Schema::new("id")
        .add_field(FieldDefinition::text("title").boost(2.0))
        .add_field(FieldDefinition::text("authors").multi_valued().positional())
        .add_field(FieldDefinition::text("body").positional())
        .add_field(FieldDefinition::integer("ranking"))
}

/// Cars: multi-valued categorical model, numeric price.
pub fn cars_schema() -> Schema {
    Schema::new("id")
        .add_field(FieldDefinition::text("name"))
        .add_field(FieldDefinition::text("model").multi_valued())
        .add_field(FieldDefinition::integer("price"))
}

pub fn config(dir: &TempDir) -> Config {
    Config::default()
        .with_storage_path(dir.path())
        .with_wal(true, SyncMode::Immediate)
}

pub fn open(dir: &TempDir, schema: Schema) -> Engine {
    Engine::open(schema, config(dir)).unwrap()
}

pub fn book(id: &str, title: &str, authors: &[&str], ranking: i64) -> Record {
    Record::new(id)
        .with("title", title)
        .with_values("authors", authors.iter().copied())
        .with("ranking", ranking)
}

/// A small library loaded through the JSON path, the way a transport
/// layer would hand records over.
pub fn load_library(engine: &Engine) {
    let payload = json!([
        {"id": "100", "title": "The garden of forking paths", "authors": ["Jorge Luis Borges"], "ranking": 7},
        {"id": "101", "title": "Down and out in Paris", "authors": ["George Orwell"], "ranking": 5},
        {"id": "102", "title": "A collection of essays", "authors": ["John Smith", "George Orwell"], "ranking": 9},
        {"id": "103", "title": "Gardening for beginners", "authors": ["Ann Gar"], "ranking": 3},
        {"id": "104", "title": "Smith and sons", "authors": ["George Smith"], "ranking": 1}
    ]);
    let log = engine.upsert_json(&payload, UpsertMode::Insert).unwrap();
    assert_eq!(log.failed(), 0, "{:?}", log);
}

pub fn keys(results: &SearchResults) -> Vec<String> {
    results.primary_keys().into_iter().map(String::from).collect()
}

pub fn sorted_keys(results: &SearchResults) -> Vec<String> {
    let mut keys = keys(results);
    keys.sort();
    keys
}

/// Everything a caller can observe about a result list, minus timing.
pub fn fingerprint(results: &SearchResults) -> Vec<(String, f32)> {
    results
        .hits
        .iter()
        .map(|hit| (hit.record.primary_key.clone(), hit.score))
        .collect()
}

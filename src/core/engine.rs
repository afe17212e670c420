use std::sync::Arc;
use serde_json::Value;
use tracing::{error, info, warn};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::lifecycle::{Lifecycle, LifecycleState};
use crate::core::stats::EngineStats;
use crate::core::types::{Record, RecordId};
use crate::index::indexer::Indexer;
use crate::mvcc::controller::MVCCController;
use crate::query::ast::Query;
use crate::query::parser::QueryParser;
use crate::query::validator::QueryValidator;
use crate::schema::schema::Schema;
use crate::scoring::scorer::{scorer_for, Scorer};
use crate::search::executor::SearchExecutor;
use crate::search::fuzzy::FuzzyMatcher;
use crate::search::results::SearchResults;
use crate::storage::persistence::{PersistenceManager, SaveReport};
use crate::writer::upsert::{UpsertLog, UpsertManager, UpsertMode};

/// One engine instance over one data directory.
///
/// All operations go through the lifecycle gate: once `shutdown` has begun,
/// every call fails fast with an `Unavailable` error.
pub struct Engine {
    schema: Arc<Schema>,
    config: Config,
    indexer: Arc<Indexer>,
    mvcc: Arc<MVCCController>,
    persistence: Arc<PersistenceManager>,
    upserts: UpsertManager,
    scorer: Box<dyn Scorer>,
    fuzzy: FuzzyMatcher,
    parser: QueryParser,
    lifecycle: Lifecycle,
}

impl Engine {
    /// Open (or create) the engine stored under `config.storage_path`,
    /// recovering the last snapshot and the log written after it.
    pub fn open(schema: Schema, config: Config) -> Result<Self> {
        config.validate()?;
        schema.validate()?;

        let lifecycle = Lifecycle::new();
        let schema = Arc::new(schema);
        let indexer = Arc::new(Indexer::new(schema.clone()));

        let (persistence, recovered) = PersistenceManager::open(&config, &indexer)?;
        let persistence = Arc::new(persistence);
        let mvcc = Arc::new(MVCCController::new(recovered.state, recovered.version));
        let upserts = UpsertManager::new(mvcc.clone(), indexer.clone(), persistence.clone(), &config);

        let engine = Engine {
            scorer: scorer_for(config.scorer),
            fuzzy: FuzzyMatcher::new(config.max_edit_distance),
            parser: QueryParser::new(),
            schema,
            config,
            indexer,
            mvcc,
            persistence,
            upserts,
            lifecycle,
        };
        engine.lifecycle.ready()?;

        info!(
            path = %engine.config.storage_path.display(),
            version = engine.mvcc.version(),
            scorer = engine.scorer.name(),
            "engine ready"
        );
        Ok(engine)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn search(&self, query: &Query) -> Result<SearchResults> {
        let _op = self.lifecycle.enter()?;
        self.run_search(query)
    }

    /// Parse a query expression and run it.
    pub fn search_str(&self, expression: &str) -> Result<SearchResults> {
        let _op = self.lifecycle.enter()?;
        let query = self.parser.parse(expression)?;
        self.run_search(&query)
    }

    /// Search and render the response body.
    pub fn search_json(&self, query: &Query) -> Result<Value> {
        Ok(self.search(query)?.to_json(&self.schema))
    }

    fn run_search(&self, query: &Query) -> Result<SearchResults> {
        let resolved = QueryValidator::new(&self.schema, self.indexer.analyzer(), &self.config).validate(query)?;

        // one read lock for the whole query: a single consistent version
        let state = self.mvcc.read();
        SearchExecutor::new(&state, &self.schema, &self.config, self.scorer.as_ref(), &self.fuzzy).execute(&resolved)
    }

    /// Strict insert of one record.
    pub fn insert(&self, record: Record) -> Result<RecordId> {
        let _op = self.lifecycle.enter()?;
        self.upserts.insert(record)
    }

    pub fn insert_batch(&self, records: Vec<Record>) -> Result<UpsertLog> {
        let _op = self.lifecycle.enter()?;
        Ok(self.upserts.apply_batch(records, UpsertMode::Insert))
    }

    /// Replace a record, or insert it when its key is new.
    pub fn update(&self, record: Record) -> Result<RecordId> {
        let _op = self.lifecycle.enter()?;
        self.upserts.update(record)
    }

    pub fn update_batch(&self, records: Vec<Record>) -> Result<UpsertLog> {
        let _op = self.lifecycle.enter()?;
        Ok(self.upserts.apply_batch(records, UpsertMode::Update))
    }

    /// Apply a JSON record or array of records.
    pub fn upsert_json(&self, payload: &Value, mode: UpsertMode) -> Result<UpsertLog> {
        let _op = self.lifecycle.enter()?;
        Ok(self.upserts.apply_json(payload, mode))
    }

    pub fn delete(&self, primary_key: &str) -> Result<RecordId> {
        let _op = self.lifecycle.enter()?;
        self.upserts.delete(primary_key)
    }

    pub fn get(&self, primary_key: &str) -> Result<Option<Record>> {
        let _op = self.lifecycle.enter()?;
        let state = self.mvcc.read();
        Ok(state.store.get_by_key(primary_key).map(|r| Record::clone(r)))
    }

    /// Publish a snapshot of the current state. Reads and writes continue
    /// while it is serialized.
    pub fn save(&self) -> Result<SaveReport> {
        let _op = self.lifecycle.enter()?;
        let _saving = self.lifecycle.begin_save();
        self.persistence.save(&self.mvcc)
    }

    /// Stop serving: reject new calls, wait for running ones, make the log
    /// durable, save when configured to, and free the data directory.
    pub fn shutdown(&self) -> Result<()> {
        self.lifecycle.begin_shutdown()?;
        info!("engine shutting down");

        let outcome = self.flush_for_shutdown();
        self.persistence.release();
        self.lifecycle.finish_shutdown();

        match &outcome {
            Ok(()) => info!("engine stopped"),
            Err(e) => error!(error = %e, "engine stopped without a final snapshot"),
        }
        outcome
    }

    fn flush_for_shutdown(&self) -> Result<()> {
        self.persistence.sync()?;
        if self.config.save_on_shutdown {
            self.persistence.save(&self.mvcc)?;
        }
        Ok(())
    }

    pub fn status(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let _op = self.lifecycle.enter()?;
        let (records, terms) = {
            let state = self.mvcc.read();
            (state.store.len(), state.index.term_count())
        };

        Ok(EngineStats {
            state: self.lifecycle.state(),
            records,
            terms,
            version: self.mvcc.version(),
            last_saved_version: self.persistence.last_saved_version(),
            wal_sequence: self.persistence.wal_sequence(),
            last_save_at: self.persistence.last_save_at(),
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.lifecycle.is_serving() {
            if let Err(e) = self.persistence.sync() {
                warn!(error = %e, "log sync failed while dropping a running engine");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::schema::schema::FieldDefinition;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Engine {
        let schema = Schema::new("id").add_field(FieldDefinition::text("title"));
        Engine::open(schema, Config::default().with_storage_path(dir.path())).unwrap()
    }

    #[test]
    fn stats_track_writes_and_saves() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.insert(Record::new("1").with("title", "hello world")).unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.terms, 2);
        assert_eq!(stats.unsaved_changes(), 1);

        engine.save().unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.unsaved_changes(), 0);
        assert!(stats.last_save_at.is_some());
        assert_eq!(stats.state, LifecycleState::Running);
    }

    #[test]
    fn everything_is_unavailable_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.shutdown().unwrap();

        assert_eq!(engine.status(), LifecycleState::Stopped);
        assert!(engine.search_str("hello").unwrap_err().is_unavailable());
        assert!(engine.search_str("\"unclosed").unwrap_err().is_unavailable());
        assert!(engine.insert(Record::new("2")).unwrap_err().is_unavailable());
        assert!(engine.get("1").unwrap_err().is_unavailable());
        assert!(engine.save().unwrap_err().is_unavailable());
        assert!(engine.stats().unwrap_err().is_unavailable());
        assert!(engine.shutdown().unwrap_err().is_unavailable());
    }

    #[test]
    fn invalid_schema_is_rejected_at_open() {
        let dir = TempDir::new().unwrap();
        let schema = Schema::new("id").add_field(FieldDefinition::text("id"));
        let err = Engine::open(schema, Config::default().with_storage_path(dir.path())).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Schema);
    }

    #[test]
    fn malformed_queries_do_not_touch_state() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        engine.insert(Record::new("1").with("title", "hello")).unwrap();
        let version = engine.stats().unwrap().version;

        assert_eq!(engine.search_str("hello AND").unwrap_err().kind, ErrorKind::Parse);
        assert_eq!(engine.stats().unwrap().version, version);
    }
}

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{Record, RecordId};
use crate::index::indexer::{AnalyzedRecord, Indexer};
use crate::mvcc::controller::MVCCController;
use crate::store::record_store::DUPLICATE_KEY_REASON;
use crate::storage::persistence::PersistenceManager;
use crate::storage::wal::Operation;
use crate::writer::key_lock::KeyLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertMode {
    /// Fails when the primary key is already present.
    Insert,
    /// Replaces an existing record, or inserts it when absent.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Success,
    Failed,
}

/// Outcome for one input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertLogEntry {
    pub rid: String,
    pub operation: UpsertMode,
    pub status: UpsertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UpsertLogEntry {
    fn from_outcome(rid: String, operation: UpsertMode, outcome: &Result<RecordId>) -> Self {
        match outcome {
            Ok(_) => UpsertLogEntry {
                rid,
                operation,
                status: UpsertStatus::Success,
                reason: None,
            },
            Err(e) => {
                debug!(rid = %rid, error = %e, "upsert rejected");
                UpsertLogEntry {
                    rid,
                    operation,
                    status: UpsertStatus::Failed,
                    reason: Some(e.context.clone()),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UpsertStatus::Success
    }
}

/// Per-record outcomes of one request, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpsertLog {
    pub entries: Vec<UpsertLogEntry>,
}

impl UpsertLog {
    pub fn entry(&self, rid: &str) -> Option<&UpsertLogEntry> {
        self.entries.iter().find(|e| e.rid == rid)
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!(self.entries)
    }
}

/// Applies inserts, updates and deletes.
///
/// Analysis runs before any lock is taken. The change itself is logged and
/// applied to store and index under the state write lock, so a reader sees a
/// record either fully before or fully after the change. Every record of a
/// batch is applied on its own: a failure only affects its own log entry.
pub struct UpsertManager {
    mvcc: Arc<MVCCController>,
    indexer: Arc<Indexer>,
    persistence: Arc<PersistenceManager>,
    key_locks: KeyLocks,
    parallel_threshold: usize,
}

impl UpsertManager {
    pub fn new(
        mvcc: Arc<MVCCController>,
        indexer: Arc<Indexer>,
        persistence: Arc<PersistenceManager>,
        config: &Config,
    ) -> Self {
        UpsertManager {
            mvcc,
            indexer,
            persistence,
            key_locks: KeyLocks::new(config.key_lock_stripes),
            parallel_threshold: config.parallel_batch_threshold,
        }
    }

    pub fn insert(&self, record: Record) -> Result<RecordId> {
        let analyzed = self.indexer.prepare(&record)?;
        self.apply(record, analyzed, UpsertMode::Insert)
    }

    pub fn update(&self, record: Record) -> Result<RecordId> {
        let analyzed = self.indexer.prepare(&record)?;
        self.apply(record, analyzed, UpsertMode::Update)
    }

    pub fn apply_batch(&self, records: Vec<Record>, mode: UpsertMode) -> UpsertLog {
        let prepared = self.indexer.prepare_batch(&records, self.parallel_threshold);

        let entries = records
            .into_iter()
            .zip(prepared)
            .map(|(record, analyzed)| {
                let rid = record.primary_key.clone();
                let outcome = analyzed.and_then(|analyzed| self.apply(record, analyzed, mode));
                UpsertLogEntry::from_outcome(rid, mode, &outcome)
            })
            .collect();
        UpsertLog { entries }
    }

    /// Apply a JSON object or an array of objects. An element that does not
    /// parse against the schema gets a failed entry of its own.
    pub fn apply_json(&self, payload: &Value, mode: UpsertMode) -> UpsertLog {
        let items: Vec<&Value> = match payload {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let schema = self.indexer.schema();
        let parsed: Vec<Result<Record>> = items.iter().map(|item| Record::from_json(item, schema)).collect();

        let valid: Vec<Record> = parsed.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
        let mut applied = self.apply_batch(valid, mode).entries.into_iter();

        let entries = items
            .iter()
            .zip(parsed)
            .filter_map(|(item, parsed)| match parsed {
                Ok(_) => applied.next(),
                Err(e) => Some(UpsertLogEntry::from_outcome(
                    key_of(item, &schema.primary_key),
                    mode,
                    &Err(e),
                )),
            })
            .collect();
        UpsertLog { entries }
    }

    /// Remove a record and purge its postings.
    pub fn delete(&self, primary_key: &str) -> Result<RecordId> {
        let _key = self.key_locks.lock(primary_key);

        self.mvcc.write(|state| {
            let Some(id) = state.store.id_of(primary_key) else {
                return (Err(Error::not_found(format!("no record with primary key '{}'", primary_key))), false);
            };
            if let Err(e) = self.persistence.append(Operation::Delete {
                key: primary_key.to_string(),
            }) {
                return (Err(e), false);
            }

            state.store.remove(primary_key);
            state.index.remove_record(id);
            (Ok(id), true)
        })
    }

    fn apply(&self, record: Record, analyzed: AnalyzedRecord, mode: UpsertMode) -> Result<RecordId> {
        let _key = self.key_locks.lock(&record.primary_key);

        self.mvcc.write(|state| {
            if mode == UpsertMode::Insert && state.store.contains_key(&record.primary_key) {
                return (Err(Error::conflict(DUPLICATE_KEY_REASON)), false);
            }

            let id = state.store.peek_id(&record.primary_key);
            let logged = match mode {
                UpsertMode::Insert => Operation::Insert { id, record: record.clone() },
                UpsertMode::Update => Operation::Update { id, record: record.clone() },
            };
            if let Err(e) = self.persistence.append(logged) {
                return (Err(e), false);
            }

            let (id, _previous) = state.store.upsert(record);
            state.index.add_record(id, &analyzed);
            (Ok(id), true)
        })
    }
}

fn key_of(item: &Value, primary_key: &str) -> String {
    match item.get(primary_key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

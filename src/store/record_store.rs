use std::collections::HashMap;
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::{Record, RecordId};

/// Reason reported when a strict insert hits an existing primary key.
pub const DUPLICATE_KEY_REASON: &str = "The record with same primary key already exists";

/// Canonical holder of records, keyed both by primary key and by internal id.
///
/// Records are shared behind `Arc` so a point-in-time copy of the store only
/// copies pointers.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: HashMap<RecordId, Arc<Record>>,
    keys: HashMap<String, RecordId>,
    next_id: u32,
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore::default()
    }

    /// Rebuild a store from persisted entries.
    pub fn from_entries(next_id: u32, entries: Vec<(RecordId, Record)>) -> Result<Self> {
        let mut store = RecordStore {
            records: HashMap::with_capacity(entries.len()),
            keys: HashMap::with_capacity(entries.len()),
            next_id,
        };
        for (id, record) in entries {
            if store.keys.contains_key(&record.primary_key) {
                return Err(Error::persistence(format!(
                    "snapshot holds primary key '{}' twice",
                    record.primary_key
                )));
            }
            store.restore(id, record);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn contains_key(&self, primary_key: &str) -> bool {
        self.keys.contains_key(primary_key)
    }

    pub fn id_of(&self, primary_key: &str) -> Option<RecordId> {
        self.keys.get(primary_key).copied()
    }

    pub fn get(&self, id: RecordId) -> Option<&Arc<Record>> {
        self.records.get(&id)
    }

    pub fn get_by_key(&self, primary_key: &str) -> Option<&Arc<Record>> {
        self.id_of(primary_key).and_then(|id| self.records.get(&id))
    }

    /// Id the next insert of `primary_key` would receive, without reserving it.
    pub fn peek_id(&self, primary_key: &str) -> RecordId {
        self.id_of(primary_key).unwrap_or(RecordId(self.next_id))
    }

    /// Strict insert: never touches an existing record.
    pub fn insert(&mut self, record: Record) -> Result<RecordId> {
        if self.keys.contains_key(&record.primary_key) {
            return Err(Error::conflict(DUPLICATE_KEY_REASON));
        }
        let id = RecordId(self.next_id);
        self.restore(id, record);
        Ok(id)
    }

    /// Replace the record under the same key, keeping its id, or insert it.
    /// Returns the id and the previous version.
    pub fn upsert(&mut self, record: Record) -> (RecordId, Option<Arc<Record>>) {
        match self.id_of(&record.primary_key) {
            Some(id) => {
                let previous = self.records.insert(id, Arc::new(record));
                (id, previous)
            }
            None => {
                let id = RecordId(self.next_id);
                self.restore(id, record);
                (id, None)
            }
        }
    }

    /// Put a record under a known id, used when loading snapshots and
    /// replaying the log.
    pub fn restore(&mut self, id: RecordId, record: Record) {
        if let Some(old_id) = self.keys.insert(record.primary_key.clone(), id) {
            if old_id != id {
                self.records.remove(&old_id);
            }
        }
        self.records.insert(id, Arc::new(record));
        self.next_id = self.next_id.max(id.0 + 1);
    }

    pub fn remove(&mut self, primary_key: &str) -> Option<(RecordId, Arc<Record>)> {
        let id = self.keys.remove(primary_key)?;
        self.records.remove(&id).map(|record| (id, record))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Arc<Record>)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    /// Owned copy of every record ordered by id.
    pub fn entries(&self) -> Vec<(RecordId, Record)> {
        let mut entries: Vec<_> = self
            .records
            .iter()
            .map(|(id, record)| (*id, Record::clone(record)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

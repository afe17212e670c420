use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::index::indexer::Indexer;
use crate::index::inverted::InvertedIndex;
use crate::mvcc::controller::{IndexState, MVCCController};
use crate::store::record_store::RecordStore;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::snapshot::{read_snapshot, write_snapshot, SnapshotData};
use crate::storage::wal::{Operation, WAL};

/// State rebuilt on open.
#[derive(Debug)]
pub struct Recovered {
    pub state: IndexState,
    pub version: u64,
    pub replayed: usize,
}

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub version: u64,
    pub records: usize,
    pub terms: usize,
    pub bytes: u64,
    pub wal_sequence: u64,
    pub took_ms: u64,
}

/// Owns the data directory: snapshot publishing, the write-ahead log and
/// recovery on open.
pub struct PersistenceManager {
    layout: StorageLayout,
    wal: Option<Mutex<WAL>>,
    wal_floor: u64,
    fingerprint: u32,
    save_lock: Mutex<()>,
    last_saved_version: AtomicU64,
    last_save_at: Mutex<Option<DateTime<Utc>>>,
    dir_lock: Mutex<Option<FileLock>>,
}

impl PersistenceManager {
    /// Lock the data directory, load the published snapshot and replay the
    /// log written after it.
    pub fn open(config: &Config, indexer: &Indexer) -> Result<(Self, Recovered)> {
        let layout = StorageLayout::new(config.storage_path.clone())?;
        let dir_lock = FileLock::acquire(&layout)?;
        let fingerprint = indexer.schema().fingerprint()?;

        let mut last_save_at = None;
        let (mut state, mut version, boundary) = match read_snapshot(&layout)? {
            Some(data) => {
                last_save_at = Some(data.created_at);
                let store = RecordStore::from_entries(data.next_id, data.records)?;
                let index = if data.schema_fingerprint == fingerprint {
                    InvertedIndex::from_persisted(data.index)?
                } else {
                    warn!("schema changed since the snapshot was taken, rebuilding the index");
                    rebuild_index(&store, indexer)?
                };
                (IndexState { store, index }, data.version, data.wal_sequence)
            }
            None => (IndexState::default(), 0, 0),
        };
        let last_saved_version = version;

        let mut next_sequence = boundary;
        let mut replayed = 0;
        for (_, path) in WAL::find_wal_files(&layout)? {
            let contents = WAL::read_entries(&path)?;
            for entry in contents.entries {
                if entry.sequence < boundary {
                    continue;
                }
                apply(&mut state, indexer, entry.operation)?;
                next_sequence = next_sequence.max(entry.sequence + 1);
                version += 1;
                replayed += 1;
            }
        }

        let wal = if config.wal_enabled {
            Some(Mutex::new(WAL::create(&layout, next_sequence, config.wal_sync)?))
        } else {
            None
        };

        info!(
            path = %layout.base_dir.display(),
            records = state.store.len(),
            terms = state.index.term_count(),
            replayed,
            "storage recovered"
        );

        let manager = PersistenceManager {
            layout,
            wal,
            wal_floor: next_sequence,
            fingerprint,
            save_lock: Mutex::new(()),
            last_saved_version: AtomicU64::new(last_saved_version),
            last_save_at: Mutex::new(last_save_at),
            dir_lock: Mutex::new(Some(dir_lock)),
        };
        Ok((
            manager,
            Recovered {
                state,
                version,
                replayed,
            },
        ))
    }

    /// Record an operation ahead of making it visible. A no-op without a log.
    pub fn append(&self, operation: Operation) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().append(operation)?;
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().sync()?;
        }
        Ok(())
    }

    pub fn wal_sequence(&self) -> u64 {
        match &self.wal {
            Some(wal) => wal.lock().sequence(),
            None => self.wal_floor,
        }
    }

    pub fn last_saved_version(&self) -> u64 {
        self.last_saved_version.load(Ordering::Acquire)
    }

    pub fn last_save_at(&self) -> Option<DateTime<Utc>> {
        *self.last_save_at.lock()
    }

    /// Write a point-in-time snapshot. Only the copy of the state happens
    /// under the read lock; serialization and I/O run outside it.
    pub fn save(&self, mvcc: &MVCCController) -> Result<SaveReport> {
        let _saving = self.save_lock.lock();
        let started = Instant::now();

        let (snapshot, boundary) = mvcc.snapshot_with(|_| self.rotate_wal());
        let boundary = boundary?;

        let state = &snapshot.state;
        let data = SnapshotData {
            created_at: snapshot.timestamp,
            version: snapshot.version,
            wal_sequence: boundary,
            schema_fingerprint: self.fingerprint,
            next_id: state.store.next_id(),
            records: state.store.entries(),
            index: state.index.to_persisted()?,
        };
        let bytes = write_snapshot(&self.layout, &data)?;

        if let Err(e) = WAL::remove_before(&self.layout, boundary) {
            warn!(error = %e, "snapshot published but old log files remain");
        }

        self.last_saved_version.store(snapshot.version, Ordering::Release);
        *self.last_save_at.lock() = Some(snapshot.timestamp);

        let report = SaveReport {
            version: snapshot.version,
            records: state.store.len(),
            terms: state.index.term_count(),
            bytes,
            wal_sequence: boundary,
            took_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            version = report.version,
            records = report.records,
            terms = report.terms,
            bytes = report.bytes,
            took_ms = report.took_ms,
            "snapshot saved"
        );
        Ok(report)
    }

    /// Give up the data directory.
    pub fn release(&self) {
        self.dir_lock.lock().take();
    }

    fn rotate_wal(&self) -> Result<u64> {
        match &self.wal {
            Some(wal) => wal.lock().rotate(&self.layout),
            None => Ok(self.wal_floor),
        }
    }
}

fn rebuild_index(store: &RecordStore, indexer: &Indexer) -> Result<InvertedIndex> {
    let mut index = InvertedIndex::new();
    for (id, record) in store.iter() {
        index.add_record(id, &indexer.prepare(record)?);
    }
    Ok(index)
}

/// Replay one logged operation.
fn apply(state: &mut IndexState, indexer: &Indexer, operation: Operation) -> Result<()> {
    match operation {
        Operation::Insert { id, record } | Operation::Update { id, record } => {
            let analyzed = indexer.prepare(&record)?;
            if let Some(old) = state.store.id_of(&record.primary_key) {
                if old != id {
                    state.index.remove_record(old);
                }
            }
            state.store.restore(id, record);
            state.index.add_record(id, &analyzed);
        }
        Operation::Delete { key } => {
            if let Some((id, _)) = state.store.remove(&key) {
                state.index.remove_record(id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::core::config::SyncMode;
    use crate::core::types::{Record, RecordId};
    use crate::schema::schema::{FieldDefinition, Schema};
    use tempfile::TempDir;

    fn indexer() -> Indexer {
        Indexer::new(Arc::new(Schema::new("id").add_field(FieldDefinition::text("title"))))
    }

    fn config(dir: &TempDir) -> Config {
        Config::default()
            .with_storage_path(dir.path())
            .with_wal(true, SyncMode::Immediate)
    }

    fn insert(manager: &PersistenceManager, mvcc: &MVCCController, indexer: &Indexer, key: &str, title: &str) {
        let record = Record::new(key).with("title", title);
        let analyzed = indexer.prepare(&record).unwrap();
        mvcc.write(|state| {
            let id = state.store.peek_id(key);
            manager
                .append(Operation::Insert { id, record: record.clone() })
                .unwrap();
            state.store.insert(record).unwrap();
            state.index.add_record(id, &analyzed);
            ((), true)
        });
    }

    #[test]
    fn log_replays_writes_after_the_snapshot() {
        let dir = TempDir::new().unwrap();
        let indexer = indexer();

        {
            let (manager, recovered) = PersistenceManager::open(&config(&dir), &indexer).unwrap();
            let mvcc = MVCCController::new(recovered.state, recovered.version);
            insert(&manager, &mvcc, &indexer, "a", "alpha");
            let report = manager.save(&mvcc).unwrap();
            assert_eq!(report.records, 1);
            insert(&manager, &mvcc, &indexer, "b", "beta");
        }

        let (manager, recovered) = PersistenceManager::open(&config(&dir), &indexer).unwrap();
        assert_eq!(recovered.replayed, 1);
        assert_eq!(recovered.version, 2);
        assert_eq!(recovered.state.store.len(), 2);
        assert_eq!(recovered.state.store.id_of("b"), Some(RecordId(1)));
        assert_eq!(recovered.state.index.doc_freq("beta"), 1);
        assert_eq!(manager.last_saved_version(), 1);
    }

    #[test]
    fn second_open_of_a_locked_directory_fails() {
        let dir = TempDir::new().unwrap();
        let indexer = indexer();
        let (manager, _) = PersistenceManager::open(&config(&dir), &indexer).unwrap();
        assert!(PersistenceManager::open(&config(&dir), &indexer).is_err());

        manager.release();
        assert!(PersistenceManager::open(&config(&dir), &indexer).is_ok());
    }

    #[test]
    fn schema_change_rebuilds_the_index() {
        let dir = TempDir::new().unwrap();
        let indexer = indexer();
        {
            let (manager, recovered) = PersistenceManager::open(&config(&dir), &indexer).unwrap();
            let mvcc = MVCCController::new(recovered.state, recovered.version);
            insert(&manager, &mvcc, &indexer, "a", "alpha");
            manager.save(&mvcc).unwrap();
        }

        let wider = Indexer::new(Arc::new(
            Schema::new("id")
                .add_field(FieldDefinition::text("summary"))
                .add_field(FieldDefinition::text("title")),
        ));
        let (_, recovered) = PersistenceManager::open(&config(&dir), &wider).unwrap();
        let list = recovered.state.index.posting_list("alpha").unwrap();
        assert_eq!(list.iter().next().unwrap().hits[0].attribute.0, 1);
    }
}

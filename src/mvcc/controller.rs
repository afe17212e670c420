use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use crate::index::inverted::InvertedIndex;
use crate::store::record_store::RecordStore;

/// Record store and index that must always be observed together.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub store: RecordStore,
    pub index: InvertedIndex,
}

/// Point-in-time copy of the state, taken for persistence.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub state: IndexState,
}

/// Version-stamped visibility control over the shared state.
///
/// Readers share the lock for a whole query, so they see one version from
/// start to finish. A writer applies one record change under the write lock
/// and bumps the version, which makes each change visible in a single step.
pub struct MVCCController {
    state: RwLock<IndexState>,
    current_version: AtomicU64,
}

impl MVCCController {
    pub fn new(state: IndexState, version: u64) -> Self {
        MVCCController {
            state: RwLock::new(state),
            current_version: AtomicU64::new(version),
        }
    }

    pub fn version(&self) -> u64 {
        self.current_version.load(Ordering::Acquire)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read()
    }

    /// Apply a change. The version only moves when the change reports it
    /// modified something.
    pub fn write<T>(&self, apply: impl FnOnce(&mut IndexState) -> (T, bool)) -> T {
        let mut state = self.state.write();
        let (result, changed) = apply(&mut state);
        if changed {
            self.current_version.fetch_add(1, Ordering::AcqRel);
        }
        result
    }

    /// Point-in-time copy of the current state. Copying walks every term and
    /// record map under the read lock (lists and records are shared, not
    /// copied). `at_boundary` runs before the lock is released, so no write
    /// can slip between the copy and it.
    pub fn snapshot_with<T>(&self, at_boundary: impl FnOnce(&IndexState) -> T) -> (Snapshot, T) {
        let state = self.state.read();
        let snapshot = Snapshot {
            version: self.version(),
            timestamp: Utc::now(),
            state: state.clone(),
        };
        let extra = at_boundary(&state);
        (snapshot, extra)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_with(|_| ()).0
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::lifecycle::LifecycleState;

/// Engine statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub state: LifecycleState,

    // Content
    pub records: usize,
    pub terms: usize,

    // Durability
    pub version: u64,
    pub last_saved_version: u64,
    pub wal_sequence: u64,
    pub last_save_at: Option<DateTime<Utc>>,
}

impl EngineStats {
    /// Versions applied since the last published snapshot.
    pub fn unsaved_changes(&self) -> u64 {
        self.version.saturating_sub(self.last_saved_version)
    }
}

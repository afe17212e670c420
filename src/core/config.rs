use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

/// How eagerly the write-ahead log is flushed to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Immediate,  // fsync after every append
    Batch,      // fsync every megabyte and on rotate/shutdown
    None,       // let the OS decide
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScorerKind {
    Bm25,
    TfIdf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,

    // durability
    pub wal_enabled: bool,
    pub wal_sync: SyncMode,
    pub save_on_shutdown: bool,

    // query limits
    pub default_rows: usize,
    pub max_rows: usize,
    pub max_clauses: usize,

    // matching
    pub fuzzy_similarity_threshold: f32,
    pub max_edit_distance: u8,
    pub fuzzy_similarity_boost: f32,
    pub prefix_match_penalty: f32,
    pub max_prefix_expansions: usize,
    pub max_phrase_slop: u32,
    pub scorer: ScorerKind,

    // writes
    pub parallel_batch_threshold: usize,
    pub key_lock_stripes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),

            wal_enabled: true,
            wal_sync: SyncMode::Batch,
            save_on_shutdown: true,

            default_rows: 10,
            max_rows: 10_000,
            max_clauses: 64,

            fuzzy_similarity_threshold: 0.65,
            max_edit_distance: 2,
            fuzzy_similarity_boost: 0.5,
            prefix_match_penalty: 0.95,
            max_prefix_expansions: 1000,
            max_phrase_slop: 10_000,
            scorer: ScorerKind::Bm25,

            parallel_batch_threshold: 64,
            key_lock_stripes: 64,
        }
    }
}

impl Config {
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn with_wal(mut self, enabled: bool, sync: SyncMode) -> Self {
        self.wal_enabled = enabled;
        self.wal_sync = sync;
        self
    }

    pub fn with_scorer(mut self, scorer: ScorerKind) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_save_on_shutdown(mut self, save: bool) -> Self {
        self.save_on_shutdown = save;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_similarity_threshold) {
            return Err(Error::config(format!(
                "fuzzy_similarity_threshold must be within [0, 1], got {}",
                self.fuzzy_similarity_threshold
            )));
        }
        if self.max_edit_distance > 4 {
            return Err(Error::config("max_edit_distance above 4 is not supported"));
        }
        if self.default_rows == 0 || self.default_rows > self.max_rows {
            return Err(Error::config("default_rows must be within 1..=max_rows"));
        }
        if self.key_lock_stripes == 0 {
            return Err(Error::config("key_lock_stripes must be positive"));
        }
        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory, holds the lock file
    pub snapshot_dir: PathBuf,  // Published snapshot
    pub wal_dir: PathBuf,       // Write-ahead log files
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let snapshot_dir = base_dir.join("snapshot");
        let wal_dir = base_dir.join("wal");

        fs::create_dir_all(&snapshot_dir)?;
        fs::create_dir_all(&wal_dir)?;

        Ok(StorageLayout {
            base_dir,
            snapshot_dir,
            wal_dir,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_dir.join("snapshot.bin")
    }

    /// Staging file renamed over `snapshot_path` once fully written.
    pub fn snapshot_tmp_path(&self) -> PathBuf {
        self.snapshot_dir.join("snapshot.bin.tmp")
    }

    pub fn wal_path(&self, sequence: u64) -> PathBuf {
        self.wal_dir.join(format!("wal_{:016}.log", sequence))
    }

    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Starting sequence encoded in a log file name.
    pub fn parse_wal_name(path: &Path) -> Option<u64> {
        if path.extension().and_then(|s| s.to_str()) != Some("log") {
            return None;
        }
        path.file_stem()?
            .to_str()?
            .strip_prefix("wal_")?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_directories_and_names_files() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().join("data")).unwrap();

        assert!(layout.snapshot_dir.is_dir());
        assert!(layout.wal_dir.is_dir());

        let wal = layout.wal_path(42);
        assert_eq!(StorageLayout::parse_wal_name(&wal), Some(42));
        assert_eq!(StorageLayout::parse_wal_name(&layout.snapshot_path()), None);
    }
}

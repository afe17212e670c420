use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::core::config::SyncMode;
use crate::core::error::{Error, Result};
use crate::core::types::{Record, RecordId};
use crate::storage::layout::StorageLayout;

const MAX_ENTRY_LEN: usize = 64 * 1024 * 1024;
const BATCH_SYNC_BYTES: u64 = 1024 * 1024;

/// Write-ahead log for durability
pub struct WAL {
    file: File,
    path: PathBuf,
    sync_mode: SyncMode,
    sequence: u64,
    unsynced: u64,
    valid_len: u64,  // end of the last complete frame
    damaged: bool,   // a partial frame could not be cut off
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WALEntry {
    pub sequence: u64,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Insert { id: RecordId, record: Record },
    Update { id: RecordId, record: Record },
    Delete { key: String },
}

/// Entries read back from one log file.
#[derive(Debug)]
pub struct LogContents {
    pub entries: Vec<WALEntry>,
    pub torn: bool,
}

impl WAL {
    /// Start a fresh log file whose first entry will carry `sequence`. Any
    /// file already under that name holds no readable entries and is reset.
    pub fn create(storage: &StorageLayout, sequence: u64, sync_mode: SyncMode) -> Result<Self> {
        let path = storage.wal_path(sequence);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(WAL {
            file,
            path,
            sync_mode,
            sequence,
            unsynced: 0,
            valid_len: 0,
            damaged: false,
        })
    }

    /// Sequence the next appended entry receives.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame: length (u32 LE), crc32 of the body (u32 LE), bincode body.
    ///
    /// A failed append leaves no trace: whatever part of the frame reached the
    /// file is cut off again, so later entries stay readable.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        if self.damaged {
            return Err(Error::persistence(format!(
                "{} ends in a partial frame and takes no more entries",
                self.path.display()
            )));
        }

        let entry = WALEntry {
            sequence: self.sequence,
            operation,
            timestamp: Utc::now(),
        };

        let data = bincode::serialize(&entry)?;
        let mut frame = Vec::with_capacity(8 + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        frame.extend_from_slice(&data);
        let frame_len = frame.len() as u64;

        let flush = match self.sync_mode {
            SyncMode::Immediate => true,
            SyncMode::Batch => self.unsynced + frame_len >= BATCH_SYNC_BYTES,
            SyncMode::None => false,
        };
        let written = self
            .file
            .write_all(&frame)
            .and_then(|()| if flush { self.file.sync_data() } else { Ok(()) });
        if let Err(e) = written {
            self.rollback();
            return Err(e.into());
        }

        self.sequence += 1;
        self.valid_len += frame_len;
        self.unsynced = if flush { 0 } else { self.unsynced + frame_len };

        Ok(entry.sequence)
    }

    /// Cut the file back to the end of the last complete frame.
    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.valid_len)
            .and_then(|()| self.file.seek(SeekFrom::Start(self.valid_len)))
            .map(|_| ());
        if let Err(e) = restored {
            warn!(path = %self.path.display(), error = %e, "cannot cut a partial frame off the log");
            self.damaged = true;
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Close the current file and continue in a new one. Returns the
    /// boundary: every entry before it lives in an older file.
    pub fn rotate(&mut self, storage: &StorageLayout) -> Result<u64> {
        self.sync()?;
        let boundary = self.sequence;
        if self.damaged || storage.wal_path(boundary) != self.path {
            *self = WAL::create(storage, boundary, self.sync_mode)?;
        }
        Ok(boundary)
    }

    /// Read every intact entry of one file. A frame that is cut short or
    /// fails its checksum ends the file.
    pub fn read_entries(path: &Path) -> Result<LogContents> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();

        let torn = loop {
            let mut header = [0u8; 8];
            match read_full(&mut reader, &mut header)? {
                0 => break false,
                8 => {}
                _ => break true,
            }

            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if len > MAX_ENTRY_LEN {
                break true;
            }

            let mut data = vec![0u8; len];
            if read_full(&mut reader, &mut data)? != len || crc32fast::hash(&data) != crc {
                break true;
            }

            match bincode::deserialize::<WALEntry>(&data) {
                Ok(entry) => entries.push(entry),
                Err(_) => break true,
            }
        };

        if torn {
            warn!(path = %path.display(), recovered = entries.len(), "write-ahead log ends in a damaged frame");
        }
        Ok(LogContents { entries, torn })
    }

    /// Log files in sequence order.
    pub fn find_wal_files(storage: &StorageLayout) -> Result<Vec<(u64, PathBuf)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(storage.wal_dir())? {
            let path = entry?.path();
            if let Some(sequence) = StorageLayout::parse_wal_name(&path) {
                files.push((sequence, path));
            }
        }
        files.sort_by_key(|(sequence, _)| *sequence);
        Ok(files)
    }

    /// Delete log files whose entries all precede `boundary`.
    pub fn remove_before(storage: &StorageLayout, boundary: u64) -> Result<usize> {
        let files = WAL::find_wal_files(storage)?;
        let mut removed = 0;
        for (sequence, path) in files {
            if sequence < boundary {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, boundary, "removed covered log files");
        }
        Ok(removed)
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::from(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> StorageLayout {
        StorageLayout::new(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn entries_read_back_in_order() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut wal = WAL::create(&layout, 0, SyncMode::Immediate).unwrap();

        wal.append(Operation::Insert { id: RecordId(0), record: Record::new("a") }).unwrap();
        wal.append(Operation::Delete { key: "a".into() }).unwrap();
        assert_eq!(wal.sequence(), 2);

        let contents = WAL::read_entries(wal.path()).unwrap();
        assert!(!contents.torn);
        let sequences: Vec<u64> = contents.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(contents.entries[1].operation, Operation::Delete { key: "a".into() });
    }

    #[test]
    fn torn_tail_keeps_the_intact_prefix() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut wal = WAL::create(&layout, 0, SyncMode::Immediate).unwrap();
        wal.append(Operation::Insert { id: RecordId(0), record: Record::new("a") }).unwrap();
        wal.append(Operation::Insert { id: RecordId(1), record: Record::new("b") }).unwrap();

        let bytes = fs::read(wal.path()).unwrap();
        fs::write(wal.path(), &bytes[..bytes.len() - 3]).unwrap();

        let contents = WAL::read_entries(wal.path()).unwrap();
        assert!(contents.torn);
        assert_eq!(contents.entries.len(), 1);
    }

    #[test]
    fn rotation_splits_files_at_the_boundary() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut wal = WAL::create(&layout, 0, SyncMode::None).unwrap();
        wal.append(Operation::Delete { key: "a".into() }).unwrap();

        let boundary = wal.rotate(&layout).unwrap();
        assert_eq!(boundary, 1);
        wal.append(Operation::Delete { key: "b".into() }).unwrap();

        let files = WAL::find_wal_files(&layout).unwrap();
        assert_eq!(files.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![0, 1]);

        assert_eq!(WAL::remove_before(&layout, boundary).unwrap(), 1);
        let remaining = WAL::find_wal_files(&layout).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(WAL::read_entries(&remaining[0].1).unwrap().entries[0].sequence, 1);
    }

    #[test]
    fn rotating_an_empty_file_keeps_it() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut wal = WAL::create(&layout, 5, SyncMode::None).unwrap();
        assert_eq!(wal.rotate(&layout).unwrap(), 5);
        assert_eq!(WAL::find_wal_files(&layout).unwrap().len(), 1);
    }

    #[test]
    fn partial_frame_is_cut_before_the_next_append() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut wal = WAL::create(&layout, 0, SyncMode::Immediate).unwrap();
        wal.append(Operation::Delete { key: "a".into() }).unwrap();

        // the first bytes of a frame whose write failed
        OpenOptions::new()
            .append(true)
            .open(wal.path())
            .unwrap()
            .write_all(&[40, 0, 0, 0, 7])
            .unwrap();
        wal.rollback();

        wal.append(Operation::Delete { key: "b".into() }).unwrap();
        let contents = WAL::read_entries(wal.path()).unwrap();
        assert!(!contents.torn);
        assert_eq!(contents.entries.len(), 2);
        assert_eq!(contents.entries[1].operation, Operation::Delete { key: "b".into() });
    }

    #[test]
    fn failed_append_does_not_consume_a_sequence() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut wal = WAL::create(&layout, 0, SyncMode::None).unwrap();
        wal.append(Operation::Delete { key: "a".into() }).unwrap();

        // a handle that refuses writes
        wal.file = File::open(wal.path()).unwrap();
        assert!(wal.append(Operation::Delete { key: "b".into() }).is_err());
        assert_eq!(wal.sequence(), 1);
        assert_eq!(WAL::read_entries(wal.path()).unwrap().entries.len(), 1);

        // the read-only handle cannot be truncated either, so the log stops taking entries
        let err = wal.append(Operation::Delete { key: "c".into() }).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Persistence);

        let boundary = wal.rotate(&layout).unwrap();
        assert_eq!(boundary, 1);
        wal.append(Operation::Delete { key: "c".into() }).unwrap();
    }
}

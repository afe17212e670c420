use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::{Record, RecordId};
use crate::index::inverted::PersistedIndex;
use crate::storage::layout::StorageLayout;

const MAGIC: &[u8; 4] = b"VLMS";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Everything needed to rebuild the engine state at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub created_at: DateTime<Utc>,
    pub version: u64,
    pub wal_sequence: u64,  // first log entry not covered by this snapshot
    pub schema_fingerprint: u32,
    pub next_id: u32,
    pub records: Vec<(RecordId, Record)>,
    pub index: PersistedIndex,
}

/// Serialize and publish a snapshot. The previous snapshot stays in place
/// until the new one is complete on disk. Returns the file size.
pub fn write_snapshot(storage: &StorageLayout, data: &SnapshotData) -> Result<u64> {
    let body = lz4_flex::compress_prepend_size(&bincode::serialize(data)?);

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&body);

    let tmp = storage.snapshot_tmp_path();
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(failed("write", &tmp, e));
    }

    let published = storage.snapshot_path();
    fs::rename(&tmp, &published).map_err(|e| failed("publish", &published, e))?;
    sync_dir(storage)?;

    Ok(bytes.len() as u64)
}

fn failed(action: &str, path: &Path, err: io::Error) -> Error {
    Error::persistence(format!("cannot {} snapshot {}: {}", action, path.display(), err))
}

/// Load the published snapshot, `None` when there is none yet.
pub fn read_snapshot(storage: &StorageLayout) -> Result<Option<SnapshotData>> {
    let path = storage.snapshot_path();
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(&path).map_err(|e| failed("read", &path, e))?;
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(Error::persistence(format!("{} is not a snapshot file", path.display())));
    }

    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let version = word(4);
    if version != FORMAT_VERSION {
        return Err(Error::persistence(format!("unsupported snapshot format version {}", version)));
    }
    let crc = word(8);
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[12..20]);
    let len = u64::from_le_bytes(len) as usize;

    let body = &bytes[HEADER_LEN..];
    if body.len() != len || crc32fast::hash(body) != crc {
        return Err(Error::persistence(format!("snapshot {} failed its checksum", path.display())));
    }

    let decoded = lz4_flex::decompress_size_prepended(body)?;
    Ok(Some(bincode::deserialize(&decoded)?))
}

#[cfg(unix)]
fn sync_dir(storage: &StorageLayout) -> Result<()> {
    File::open(&storage.snapshot_dir)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| failed("sync the directory of", &storage.snapshot_dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_storage: &StorageLayout) -> Result<()> {
    Ok(())
}

//! Persisted sync watermarks: one record per remote document that has been
//! materialized at least once.
//!
//! The store is a single JSON file keyed by remote id. An absent or empty
//! file means "nothing synced yet" and every upsert rewrites the file
//! atomically, so a crashed pass can never leave a half-written store.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SyncError;

pub const METADATA_FILE: &str = ".sync-metadata.json";

/// Last observed remote state for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub title: String,
    pub version: i64,
    pub synced_at: String,
    pub local_path: PathBuf,
}

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    records: HashMap<String, SyncRecord>,
}

impl MetadataStore {
    /// Opens the store backing file. Missing or empty files yield an empty
    /// store; a present but malformed file is a configuration error rather
    /// than silently discarded state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                SyncError::Configuration(format!(
                    "malformed metadata store {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), records = records.len(), "Opened metadata store");
        Ok(Self { path, records })
    }

    pub fn get(&self, remote_id: &str) -> Option<&SyncRecord> {
        self.records.get(remote_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts or replaces the record for `remote_id` and rewrites the
    /// backing file atomically.
    pub fn upsert(&mut self, remote_id: &str, record: SyncRecord) -> Result<(), SyncError> {
        self.records.insert(remote_id.to_string(), record);
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(std::io::Error::other)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// renamed into place on success, so readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| SyncError::LocalIo(e.error))?;
    Ok(())
}

//! Durable remediation record store.
//!
//! The store is a single JSON document mapping entity name to its
//! [`RemediationRecord`]. It is read once at startup and rewritten in full
//! after every cycle. A missing or unreadable document is treated as an
//! empty store; a failed write is surfaced to the caller as fatal.

use crate::errors::ErrorCode;
use crate::types::RecordMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while persisting the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize record store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write record store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::PersistenceFailed
    }
}

/// Handle on the record store file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record map.
    ///
    /// Never fails: a missing file yields an empty map, and an unreadable or
    /// corrupt file is logged and also yields an empty map. Entries whose key
    /// does not match the record's entity name are dropped.
    pub fn load(&self) -> RecordMap {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No record store at {:?}, starting empty", self.path);
                return RecordMap::new();
            }
            Err(e) => {
                warn!(
                    code = %ErrorCode::PersistenceCorrupt.code_string(),
                    "Cannot read record store {:?}, ignoring it: {}", self.path, e
                );
                return RecordMap::new();
            }
        };

        let mut records: RecordMap = match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    code = %ErrorCode::PersistenceCorrupt.code_string(),
                    "Cannot parse record store {:?}, ignoring it: {}", self.path, e
                );
                return RecordMap::new();
            }
        };

        records.retain(|name, record| {
            let consistent = *name == record.entity.name;
            if !consistent {
                warn!(
                    key = %name,
                    entity = %record.entity.name,
                    "Dropping record whose key does not match its entity"
                );
            }
            consistent
        });

        debug!("Loaded {} records from {:?}", records.len(), self.path);
        records
    }

    /// Replace the store contents with `records`.
    ///
    /// The document is written to a temporary file in the same directory
    /// and renamed over the previous one, so readers see either the old or
    /// the new document.
    pub fn save(&self, records: &RecordMap) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(records)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&payload).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!("Wrote {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

//! JSON record store.
//!
//! The [`RecordStore`] owns the single persisted artifact of a run: the full
//! bookmark record collection as a JSON array. Every stage loads it, mutates
//! its own fields and saves the whole collection back.
//!
//! **Write rules:**
//! - the collection is the unit of persistence, never individual records
//! - saves go to a sibling temp file that is renamed over the artifact, so a
//!   crash mid-write leaves the previous stage's collection intact

use std::path::{Path, PathBuf};

use bookmark_reorg_shared::{BookmarkRecord, ReorgError, Result};
use tracing::{debug, info};

/// Handle to the persisted record collection.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    /// Create a store backed by the JSON file at `path` (not touched yet).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the JSON artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the artifact exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the collection. A missing or malformed file is a store error.
    pub fn load(&self) -> Result<Vec<BookmarkRecord>> {
        if !self.path.exists() {
            return Err(ReorgError::store(&self.path, "record collection not found"));
        }
        self.read()
    }

    /// Load the collection if the file exists; `Ok(None)` otherwise.
    pub fn load_if_exists(&self) -> Result<Option<Vec<BookmarkRecord>>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no record collection on disk");
            return Ok(None);
        }
        self.read().map(Some)
    }

    /// Overwrite the artifact with the full collection.
    pub fn save(&self, records: &[BookmarkRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ReorgError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| ReorgError::store(&self.path, format!("serialize failed: {e}")))?;

        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(|e| ReorgError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ReorgError::io(&self.path, e))?;

        info!(records = records.len(), path = %self.path.display(), "saved record collection");
        Ok(())
    }

    fn read(&self) -> Result<Vec<BookmarkRecord>> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| ReorgError::io(&self.path, e))?;

        let records: Vec<BookmarkRecord> = serde_json::from_str(&content)
            .map_err(|e| ReorgError::store(&self.path, format!("corrupt record collection: {e}")))?;

        debug!(records = records.len(), path = %self.path.display(), "loaded record collection");
        Ok(records)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "records.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemorySnapshot;

/// A snapshot persisted as one pretty-printed JSON file.
///
/// Saving writes to a temporary file in the same directory and renames it
/// over the target, so a reader never observes a half-written snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file loads as an empty snapshot.
    pub fn load(&self) -> StoreResult<InMemorySnapshot> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "snapshot file absent; starting empty");
            return Ok(InMemorySnapshot::new());
        }
        let bytes = fs::read(&self.path)?;
        let root = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::MalformedSnapshot(e.to_string()))?;
        let snapshot = InMemorySnapshot::from_value(root)?;
        debug!(path = %self.path.display(), ?snapshot, "snapshot loaded");
        Ok(snapshot)
    }

    /// Atomically replace the file with `snapshot`.
    pub fn save(&self, snapshot: &InMemorySnapshot) -> StoreResult<()> {
        let encoded = serde_json::to_vec_pretty(snapshot.as_value())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&encoded)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %self.path.display(), bytes = encoded.len(), "snapshot saved");
        Ok(())
    }
}

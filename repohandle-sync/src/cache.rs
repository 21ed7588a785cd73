//! Change cache: the last reconciled content hash of every tracked file.
//!
//! Persists a flat JSON list of [`TrackedFile`] records. A single mutex
//! covers every read and write, so concurrent passes serialize on cache
//! access. Writes use the `.tmp` + rename pattern: a crash mid-write leaves
//! the previous list in place.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use repohandle_core::TrackedFile;

use crate::error::{io_err, SyncError};

/// Shared, explicitly constructed handle to the cache file.
#[derive(Debug)]
pub struct ChangeCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ChangeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the backing file exists, creating an empty list if absent.
    pub fn init(&self) -> Result<(), SyncError> {
        let _guard = self.guard();
        if self.path.exists() {
            return Ok(());
        }
        self.write_locked(&[])
    }

    /// Read and decode the full list.
    ///
    /// A missing file is surfaced as an I/O error (see
    /// [`SyncError::is_not_found`]); callers treat it as "nothing reconciled".
    pub fn load(&self) -> Result<Vec<TrackedFile>, SyncError> {
        let _guard = self.guard();
        self.read_locked()
    }

    /// Overwrite the stored list.
    pub fn save(&self, files: &[TrackedFile]) -> Result<(), SyncError> {
        let _guard = self.guard();
        self.write_locked(files)
    }

    /// Upsert `files` by identity into the stored list, in one critical section.
    ///
    /// Entries not named in `files` are preserved. A missing or unreadable
    /// store is replaced.
    pub fn record(&self, files: &[TrackedFile]) -> Result<(), SyncError> {
        let _guard = self.guard();
        let mut stored = match self.read_locked() {
            Ok(stored) => stored,
            Err(err) => {
                if !err.is_not_found() {
                    tracing::warn!(
                        "change cache {} unreadable, rewriting: {err}",
                        self.path.display()
                    );
                }
                Vec::new()
            }
        };
        for file in files {
            match stored.iter_mut().find(|s| s.same_identity(file)) {
                Some(slot) => *slot = file.clone(),
                None => stored.push(file.clone()),
            }
        }
        self.write_locked(&stored)
    }

    /// Cached hash for the file with `file`'s identity, if any.
    pub fn lookup(&self, file: &TrackedFile) -> Result<Option<String>, SyncError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|cached| cached.same_identity(file))
            .map(|cached| cached.hash))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_locked(&self) -> Result<Vec<TrackedFile>, SyncError> {
        let contents = std::fs::read(&self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn write_locked(&self, files: &[TrackedFile]) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }
        let json = serde_json::to_string_pretty(files)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }
}

/// Copy cached hashes onto the configured tracked files, matched by identity.
///
/// Kind and sig always come from configuration; only the hash is taken
/// from the cache.
pub fn merge_cached_hashes(configured: &[TrackedFile], cached: &[TrackedFile]) -> Vec<TrackedFile> {
    configured
        .iter()
        .map(|file| {
            let mut merged = file.clone();
            if let Some(hit) = cached.iter().find(|c| c.same_identity(file)) {
                merged.hash = hit.hash.clone();
            }
            merged
        })
        .collect()
}

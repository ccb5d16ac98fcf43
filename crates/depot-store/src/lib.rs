//! # depot-store
//!
//! Blob storage layout and in-memory metadata index for Depot.
//!
//! Blobs live as plain files directly under the storage root, addressed by
//! filename. The index maps filename to [`FileMetadata`] and is rebuilt from
//! the directory contents at startup; it is not persisted independently.
//!
//! ## Concurrency
//!
//! One `RwLock` guards the whole map: snapshot and existence checks run
//! concurrently with each other, writers exclude everything. Blob bytes are
//! owned by the filesystem; this crate only maps names to paths.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Descriptive record for one stored blob.
///
/// `id` is identical to `filename`; timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Format a filesystem timestamp the way the wire expects it.
pub fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

/// Current time in wire format.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Blob store rooted at one directory, with the filename -> metadata index.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    index: RwLock<HashMap<String, FileMetadata>>,
}

impl Store {
    /// Open a store at the given root directory, creating it if missing,
    /// then rebuild the index from whatever blobs are already present.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let store = Self {
            root,
            index: RwLock::new(HashMap::new()),
        };
        store.rebuild()?;
        Ok(store)
    }

    /// Rebuild the index from the non-directory entries directly under the
    /// root. Entries whose metadata cannot be read are skipped; the rebuild
    /// is best-effort, not fatal.
    pub fn rebuild(&self) -> Result<()> {
        let mut fresh = HashMap::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            // Full stat of the entry path: anything that cannot be resolved
            // (e.g. a dangling symlink) is skipped rather than indexed as a
            // blob that could never be served.
            let meta = match fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let stamp = meta
                .modified()
                .map(rfc3339)
                .unwrap_or_else(|_| now_rfc3339());
            fresh.insert(
                name.clone(),
                FileMetadata {
                    id: name.clone(),
                    filename: name,
                    created_at: stamp.clone(),
                    updated_at: stamp,
                },
            );
        }

        debug!(blobs = fresh.len(), "index rebuilt from storage root");
        *self.index.write().unwrap() = fresh;
        Ok(())
    }

    /// Insert or overwrite the entry for `filename`. A re-upload replaces
    /// both timestamps; the original creation time is not preserved.
    pub fn upsert(&self, filename: &str, timestamp: &str) {
        let meta = FileMetadata {
            id: filename.to_string(),
            filename: filename.to_string(),
            created_at: timestamp.to_string(),
            updated_at: timestamp.to_string(),
        };
        self.index.write().unwrap().insert(filename.to_string(), meta);
    }

    /// Existence check under the read lock, without touching the filesystem.
    pub fn contains(&self, filename: &str) -> bool {
        self.index.read().unwrap().contains_key(filename)
    }

    /// Copy of all current entries. Iteration order is unspecified.
    pub fn snapshot(&self) -> Vec<FileMetadata> {
        self.index.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().unwrap().is_empty()
    }

    /// Where the blob for `filename` lives on disk.
    pub fn blob_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("storage");
        assert!(!root.exists());

        let store = Store::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(store.is_empty());
    }

    #[test]
    fn rebuild_indexes_existing_blobs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::write(dir.path().join("b.bin"), b"beta").unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains("a.txt"));
        assert!(store.contains("b.bin"));

        let snap = store.snapshot();
        let a = snap.iter().find(|m| m.filename == "a.txt").unwrap();
        assert_eq!(a.id, "a.txt");
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn rebuild_skips_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();
        fs::write(dir.path().join("file"), b"x").unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.contains("subdir"));
    }

    #[test]
    #[cfg(unix)]
    fn rebuild_skips_entries_whose_stat_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.bin"), b"x").unwrap();
        // A dangling symlink cannot be stat'ed; the rebuild stays
        // best-effort and indexes the rest.
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("good.bin"));
        assert!(!store.contains("dangling"));
    }

    #[test]
    fn upsert_overwrites_existing_entry() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.upsert("report.pdf", "2024-01-01T00:00:00+00:00");
        store.upsert("report.pdf", "2024-06-01T12:00:00+00:00");

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].updated_at, "2024-06-01T12:00:00+00:00");
        assert_eq!(snap[0].created_at, snap[0].updated_at);
    }

    #[test]
    fn snapshot_of_empty_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn blob_path_joins_under_root() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.blob_path("x.dat"), dir.path().join("x.dat"));
    }
}

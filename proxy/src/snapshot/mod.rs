//! Snapshot storage
//! This module provides file-based storage for state machine snapshots
//! installed on the proxy, with temp-file commit and cleanup of superseded
//! snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

mod reader;
mod writer;

pub use reader::SnapshotReader;
pub use writer::SnapshotWriter;

const SNAPSHOT_PREFIX: &str = "snapshot_";
const TEMP_EXTENSION: &str = "tmp";

/// Directory of snapshots, one file per state machine index.
///
/// A snapshot only becomes visible once its writer commits; an uncommitted
/// writer leaves nothing behind.
pub struct SnapshotStore {
    base_path: PathBuf,
    snapshots: BTreeMap<u64, PathBuf>, // index -> committed snapshot file
}

impl SnapshotStore {
    /// Opens the store, creating `base_path` if needed and indexing any
    /// committed snapshots already on disk.
    pub fn open<P: AsRef<Path>>(base_path: P) -> io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let mut snapshots = BTreeMap::new();
        for entry in fs::read_dir(&base_path)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().map(|e| e == TEMP_EXTENSION).unwrap_or(false) {
                // Leftover from an interrupted write.
                let _ = fs::remove_file(&path);
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let Some(index) = name.strip_prefix(SNAPSHOT_PREFIX) else {
                continue;
            };
            match index.parse::<u64>() {
                Ok(index) => {
                    snapshots.insert(index, path);
                }
                Err(_) => log::warn!("ignoring unrecognized snapshot file {}", name),
            }
        }

        Ok(SnapshotStore {
            base_path,
            snapshots,
        })
    }

    fn snapshot_path(&self, index: u64) -> PathBuf {
        self.base_path.join(format!("{}{}", SNAPSHOT_PREFIX, index))
    }

    /// Starts a new snapshot at `index`. The data goes to a temp file until
    /// the writer is committed with [`SnapshotStore::commit`].
    pub fn create(&self, index: u64) -> io::Result<SnapshotWriter> {
        let final_path = self.snapshot_path(index);
        let temp_path = final_path.with_extension(TEMP_EXTENSION);
        SnapshotWriter::create(index, temp_path, final_path)
    }

    /// Commits a written snapshot, making it visible to readers.
    pub fn commit(&mut self, writer: SnapshotWriter) -> io::Result<()> {
        let index = writer.index();
        let path = writer.finish()?;
        log::info!("installed snapshot at index {}", index);
        self.snapshots.insert(index, path);
        Ok(())
    }

    /// Index of the most recent committed snapshot.
    pub fn latest(&self) -> Option<u64> {
        self.snapshots.keys().next_back().copied()
    }

    /// Opens the snapshot at `index` for reading.
    pub fn reader(&self, index: u64) -> io::Result<SnapshotReader> {
        let path = self.snapshots.get(&index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no snapshot at index {}", index),
            )
        })?;
        SnapshotReader::open(index, path)
    }

    /// Opens the most recent committed snapshot for reading.
    pub fn latest_reader(&self) -> io::Result<Option<SnapshotReader>> {
        match self.latest() {
            Some(index) => Ok(Some(self.reader(index)?)),
            None => Ok(None),
        }
    }

    /// Removes every snapshot at or below `index`.
    pub fn purge(&mut self, index: u64) -> io::Result<()> {
        let stale: Vec<u64> = self
            .snapshots
            .range(..=index)
            .map(|(index, _)| *index)
            .collect();
        for index in stale {
            if let Some(path) = self.snapshots.remove(&index) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ListenerState {
        subscriptions: Vec<String>,
        last_applied: u64,
    }

    #[test]
    fn test_write_commit_read() {
        let dir = tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.latest(), None);

        let state = ListenerState {
            subscriptions: vec!["updates".to_string()],
            last_applied: 40,
        };

        let mut writer = store.create(40).unwrap();
        writer.write_u64(40).unwrap();
        writer.write_bytes(b"header").unwrap();
        writer.write_object(&state).unwrap();
        store.commit(writer).unwrap();

        assert_eq!(store.latest(), Some(40));
        let mut reader = store.reader(40).unwrap();
        assert!(reader.has_remaining());
        assert_eq!(reader.read_u64().unwrap(), 40);
        assert_eq!(reader.read_bytes().unwrap(), b"header");
        assert_eq!(reader.read_object::<ListenerState>().unwrap(), state);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_uncommitted_writer_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let mut writer = store.create(7).unwrap();
        writer.write_u64(7).unwrap();
        drop(writer);

        let store = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.latest(), None);
        assert!(store.reader(7).is_err());
    }

    #[test]
    fn test_reopen_finds_committed_snapshots() {
        let dir = tempdir().unwrap();
        {
            let mut store = SnapshotStore::open(dir.path()).unwrap();
            for index in [10u64, 20, 30] {
                let mut writer = store.create(index).unwrap();
                writer.write_u64(index).unwrap();
                store.commit(writer).unwrap();
            }
        }

        let store = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.latest(), Some(30));
        let mut reader = store.reader(20).unwrap();
        assert_eq!(reader.read_u64().unwrap(), 20);
    }

    #[test]
    fn test_purge_removes_superseded() {
        let dir = tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        for index in [10u64, 20, 30] {
            let mut writer = store.create(index).unwrap();
            writer.write_u64(index).unwrap();
            store.commit(writer).unwrap();
        }

        store.purge(20).unwrap();
        assert_eq!(store.latest(), Some(30));
        assert!(store.reader(10).is_err());
        assert!(store.reader(20).is_err());
        assert!(store.reader(30).is_ok());

        let store = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.latest(), Some(30));
    }

    #[test]
    fn test_skip_and_position() {
        let dir = tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();

        let mut writer = store.create(1).unwrap();
        writer.write_u64(99).unwrap();
        writer.write_u64(100).unwrap();
        store.commit(writer).unwrap();

        let mut reader = store.reader(1).unwrap();
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.remaining(), 16);
        reader.skip(8).unwrap();
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.read_u64().unwrap(), 100);
        assert!(reader.skip(1).is_err());
    }
}

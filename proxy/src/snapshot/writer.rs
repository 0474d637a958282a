use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Writes one snapshot to a temp file; nothing is visible until the store
/// commits the writer, which renames the temp file into place.
pub struct SnapshotWriter {
    index: u64,
    file: BufWriter<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl SnapshotWriter {
    pub(crate) fn create(index: u64, temp_path: PathBuf, final_path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(SnapshotWriter {
            index,
            file: BufWriter::new(file),
            temp_path,
            final_path,
            committed: false,
        })
    }

    /// State machine index this snapshot covers.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.file.write_all(&value.to_le_bytes())
    }

    /// Writes a length-prefixed byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.file.write_all(bytes)
    }

    /// Serializes `value` and writes it as a length-prefixed record.
    pub fn write_object<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let bytes =
            bincode::serialize(value).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.write_bytes(&bytes)
    }

    /// Flushes, syncs and renames the temp file into place.
    pub(crate) fn finish(mut self) -> io::Result<PathBuf> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

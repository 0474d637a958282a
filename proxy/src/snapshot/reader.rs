use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::Path;

/// Reads a committed snapshot. The file is loaded once and consumed as a
/// cursor over length-prefixed records.
pub struct SnapshotReader {
    index: u64,
    buffer: Vec<u8>,
    position: usize,
}

impl SnapshotReader {
    pub(crate) fn open(index: u64, path: &Path) -> io::Result<Self> {
        let buffer = fs::read(path)?;
        Ok(SnapshotReader {
            index,
            buffer,
            position: 0,
        })
    }

    /// State machine index this snapshot covers.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn skip(&mut self, bytes: usize) -> io::Result<()> {
        self.take(bytes)?;
        Ok(())
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Reads a length-prefixed byte slice.
    pub fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let header = self.take(4)?;
        let len = u32::from_le_bytes(header.try_into().unwrap()) as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a length-prefixed record and deserializes it.
    pub fn read_object<T: DeserializeOwned>(&mut self) -> io::Result<T> {
        let bytes = self.read_bytes()?;
        bincode::deserialize(&bytes).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn take(&mut self, bytes: usize) -> io::Result<&[u8]> {
        if bytes > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "snapshot truncated",
            ));
        }
        let slice = &self.buffer[self.position..self.position + bytes];
        self.position += bytes;
        Ok(slice)
    }
}

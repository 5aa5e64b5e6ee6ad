//! Segment writer implementation

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use tracing::debug;

use cellar_core::error::Result;
use cellar_core::types::Entry;

use super::reader::SegmentReader;
use super::types::{SEGMENT_MAGIC, SEGMENT_VERSION, TOMBSTONE_LEN};

/// Streaming writer for a single segment.
///
/// Mutations arrive in arbitrary order and may repeat keys; the buffer keeps
/// the last write per key, and `seal` streams the surviving entries to disk
/// in key order. Nothing touches the filesystem until `seal`.
pub struct SegmentWriter {
    path: PathBuf,
    seq: u64,
    entries: BTreeMap<Bytes, Entry>,
}

impl SegmentWriter {
    pub fn new(path: impl AsRef<Path>, seq: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seq,
            entries: BTreeMap::new(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a live value for `key`, replacing any earlier write of the
    /// same key in this segment.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.entries.insert(
            Bytes::copy_from_slice(key),
            Entry::Value(Bytes::copy_from_slice(value)),
        );
    }

    /// Record a tombstone for `key`. Deleting a key this segment never saw
    /// is fine; the tombstone still masks older segments.
    pub fn delete(&mut self, key: &[u8]) {
        self.entries
            .insert(Bytes::copy_from_slice(key), Entry::Tombstone);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Write, checksum, and fsync the segment, then open it for reading.
    ///
    /// When this returns the file contents are on stable storage (the file
    /// and its directory are both synced). A crash before the final sync
    /// leaves a file that fails footer validation and is ignored on reopen.
    pub fn seal(self) -> Result<SegmentReader> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut hasher = crc32fast::Hasher::new();
        let mut offset = 0u64;
        let mut index: Vec<(&Bytes, u64)> = Vec::with_capacity(self.entries.len());

        // Data region, in key order
        for (key, entry) in &self.entries {
            index.push((key, offset));

            let val_len = match entry {
                Entry::Value(v) => v.len() as u32,
                Entry::Tombstone => TOMBSTONE_LEN,
            };
            let key_len_bytes = (key.len() as u32).to_le_bytes();
            let val_len_bytes = val_len.to_le_bytes();

            writer.write_all(&key_len_bytes)?;
            writer.write_all(&val_len_bytes)?;
            writer.write_all(key)?;
            hasher.update(&key_len_bytes);
            hasher.update(&val_len_bytes);
            hasher.update(key);
            offset += 8 + key.len() as u64;

            if let Entry::Value(v) = entry {
                writer.write_all(v)?;
                hasher.update(v);
                offset += v.len() as u64;
            }
        }

        // Index region
        let index_offset = offset;
        for (key, entry_offset) in &index {
            let key_len_bytes = (key.len() as u32).to_le_bytes();
            let offset_bytes = entry_offset.to_le_bytes();
            writer.write_all(&key_len_bytes)?;
            writer.write_all(&offset_bytes)?;
            writer.write_all(key)?;
            hasher.update(&key_len_bytes);
            hasher.update(&offset_bytes);
            hasher.update(key);
        }

        // Footer
        writer.write_u64::<LittleEndian>(index_offset)?;
        writer.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        writer.write_u32::<LittleEndian>(hasher.finalize())?;
        writer.write_u32::<LittleEndian>(SEGMENT_VERSION)?;
        writer.write_all(SEGMENT_MAGIC)?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        sync_parent_dir(&self.path)?;

        debug!(
            "sealed segment {} with {} entries",
            self.seq,
            self.entries.len()
        );

        SegmentReader::open(&self.path)
    }

    /// Abort this segment, removing anything already on disk.
    pub fn discard(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fsync the directory containing `path` so the file's name is durable.
pub(crate) fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_last_write_wins_within_segment() {
        let dir = TempDir::new().unwrap();
        let mut writer = SegmentWriter::new(dir.path().join("cellar-0000000000000001"), 1);
        writer.put(b"a", b"first");
        writer.put(b"a", b"second");
        writer.delete(b"b");
        writer.put(b"b", b"revived");
        assert_eq!(writer.len(), 2);

        let reader = writer.seal().unwrap();
        assert_eq!(reader.get(b"a"), Some(Entry::Value(Bytes::from("second"))));
        assert_eq!(reader.get(b"b"), Some(Entry::Value(Bytes::from("revived"))));
    }

    #[test]
    fn test_seal_empty_segment() {
        let dir = TempDir::new().unwrap();
        let writer = SegmentWriter::new(dir.path().join("cellar-0000000000000001"), 1);
        let reader = writer.seal().unwrap();
        assert_eq!(reader.entry_count(), 0);
        assert_eq!(reader.get(b"anything"), None);
    }

    #[test]
    fn test_discard_is_idempotent_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let writer = SegmentWriter::new(dir.path().join("cellar-0000000000000001"), 1);
        writer.discard().unwrap();
    }
}

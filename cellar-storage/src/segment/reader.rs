//! Segment reader implementation

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};

use cellar_core::error::{Error, Result};
use cellar_core::types::Entry;

use super::iterator::SegmentIter;
use super::types::{FOOTER_SIZE, SEGMENT_MAGIC, SEGMENT_VERSION, TOMBSTONE_LEN};

/// Read handle over a sealed, memory-mapped segment file.
///
/// The key index is loaded into memory at open; entry payloads are decoded
/// from the mapping on demand.
pub struct SegmentReader {
    path: PathBuf,
    mmap: Mmap,
    index: Vec<IndexEntry>,
}

struct IndexEntry {
    key: Bytes,
    offset: u64,
}

impl SegmentReader {
    /// Open and validate a sealed segment.
    ///
    /// Fails with `Corruption` when the footer magic, version, or checksum
    /// do not check out, the signature of a seal that never completed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len() as usize;
        if file_size < FOOTER_SIZE {
            return Err(corruption(&path, "file shorter than footer"));
        }

        let mmap = unsafe {
            MmapOptions::new().map(&file).map_err(|e| Error::Io {
                message: format!("failed to mmap segment {}", path.display()),
                source: e,
            })?
        };

        // Footer sits at the very end of the file
        let footer_offset = file_size - FOOTER_SIZE;
        let mut cursor = Cursor::new(&mmap[footer_offset..]);
        let index_offset = cursor.read_u64::<LittleEndian>()? as usize;
        let entry_count = cursor.read_u64::<LittleEndian>()? as usize;
        let checksum = cursor.read_u32::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;

        if &magic != SEGMENT_MAGIC {
            return Err(corruption(&path, "bad magic"));
        }
        if version != SEGMENT_VERSION {
            return Err(corruption(&path, "unsupported version"));
        }
        if crc32fast::hash(&mmap[..footer_offset]) != checksum {
            return Err(corruption(&path, "checksum mismatch"));
        }
        if index_offset > footer_offset {
            return Err(corruption(&path, "index offset out of range"));
        }

        let index = load_index(&mmap[index_offset..footer_offset], entry_count, &path)?;

        Ok(Self { path, mmap, index })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Point lookup. `None` means the key is absent from this segment; a
    /// tombstone is a present entry.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let idx = self
            .index
            .binary_search_by(|e| e.key.as_ref().cmp(key))
            .ok()?;
        Some(self.entry_at(idx).1)
    }

    /// Iterate entries with key ≥ `from`, in key order.
    pub fn iter_from(&self, from: &[u8]) -> SegmentIter<'_> {
        SegmentIter::new(self, self.seek_index(from))
    }

    /// Index position of the first entry with key ≥ `key`.
    pub(crate) fn seek_index(&self, key: &[u8]) -> usize {
        self.index.partition_point(|e| e.key.as_ref() < key)
    }

    pub(crate) fn key_at(&self, idx: usize) -> &[u8] {
        self.index[idx].key.as_ref()
    }

    /// Decode the entry at index position `idx`.
    pub(crate) fn entry_at(&self, idx: usize) -> (Bytes, Entry) {
        let ie = &self.index[idx];
        let data = &self.mmap[ie.offset as usize..];
        let key_len = LittleEndian::read_u32(&data[0..4]) as usize;
        let val_len = LittleEndian::read_u32(&data[4..8]);
        let entry = if val_len == TOMBSTONE_LEN {
            Entry::Tombstone
        } else {
            let start = 8 + key_len;
            Entry::Value(Bytes::copy_from_slice(&data[start..start + val_len as usize]))
        };
        (ie.key.clone(), entry)
    }
}

fn load_index(data: &[u8], entry_count: usize, path: &Path) -> Result<Vec<IndexEntry>> {
    let mut cursor = Cursor::new(data);
    let mut index = Vec::with_capacity(entry_count);
    let mut prev: Option<Bytes> = None;

    for _ in 0..entry_count {
        let key_len = cursor.read_u32::<LittleEndian>()? as usize;
        let offset = cursor.read_u64::<LittleEndian>()?;
        let mut key = vec![0u8; key_len];
        cursor.read_exact(&mut key)?;
        let key = Bytes::from(key);

        // The index must be strictly ascending; anything else means the
        // file was not produced by a completed seal.
        if let Some(prev) = &prev {
            if prev >= &key {
                return Err(corruption(path, "index keys out of order"));
            }
        }
        prev = Some(key.clone());
        index.push(IndexEntry { key, offset });
    }

    Ok(index)
}

fn corruption(path: &Path, reason: &str) -> Error {
    Error::Corruption {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentWriter;
    use std::io::Write;
    use tempfile::TempDir;

    fn build_segment(dir: &Path, pairs: &[(&[u8], Option<&[u8]>)]) -> SegmentReader {
        let mut writer = SegmentWriter::new(dir.join("cellar-0000000000000001"), 1);
        for (key, value) in pairs {
            match value {
                Some(v) => writer.put(key, v),
                None => writer.delete(key),
            }
        }
        writer.seal().unwrap()
    }

    #[test]
    fn test_point_lookups_and_tombstones() {
        let dir = TempDir::new().unwrap();
        let reader = build_segment(
            dir.path(),
            &[
                (b"alpha", Some(b"1")),
                (b"beta", None),
                (b"gamma", Some(b"")),
            ],
        );

        assert_eq!(reader.get(b"alpha"), Some(Entry::Value(Bytes::from("1"))));
        assert_eq!(reader.get(b"beta"), Some(Entry::Tombstone));
        // empty value is present, not absent
        assert_eq!(reader.get(b"gamma"), Some(Entry::Value(Bytes::new())));
        assert_eq!(reader.get(b"delta"), None);
    }

    #[test]
    fn test_empty_key_is_valid_and_sorts_first() {
        let dir = TempDir::new().unwrap();
        let reader = build_segment(dir.path(), &[(b"", Some(b"root")), (b"a", Some(b"1"))]);

        assert_eq!(reader.get(b""), Some(Entry::Value(Bytes::from("root"))));
        assert_eq!(reader.key_at(0), b"");
    }

    #[test]
    fn test_iter_from_positions_at_or_after_key() {
        let dir = TempDir::new().unwrap();
        let reader = build_segment(
            dir.path(),
            &[(b"b", Some(b"1")), (b"d", Some(b"2")), (b"f", Some(b"3"))],
        );

        let keys: Vec<Bytes> = reader.iter_from(b"c").map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Bytes::from("d"), Bytes::from("f")]);

        assert_eq!(reader.iter_from(b"g").next(), None);
        assert_eq!(reader.iter_from(b"").count(), 3);
    }

    #[test]
    fn test_truncated_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cellar-0000000000000001");
        {
            let mut writer = SegmentWriter::new(&path, 1);
            writer.put(b"key", b"value");
            writer.seal().unwrap();
        }

        // Chop the tail off, simulating a seal that never finished
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 6]).unwrap();

        assert!(matches!(
            SegmentReader::open(&path),
            Err(Error::Corruption { .. })
        ));
    }

    #[test]
    fn test_garbage_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cellar-0000000000000002");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&[0xab; 64]).unwrap();
        drop(f);

        assert!(matches!(
            SegmentReader::open(&path),
            Err(Error::Corruption { .. })
        ));
    }
}

//! Live in-memory segment descriptor.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, warn};

use super::reader::SegmentReader;

/// An immutable on-disk segment plus its in-memory lifecycle state.
///
/// Every holder of an `Arc<Segment>` (the root list, a transaction
/// snapshot, an in-flight merge) keeps the mapping and file descriptor
/// alive. `mark_delete` arms removal of the backing file; the unlink runs
/// when the final holder lets go, so visibility changes never race a
/// reader still using the mapping.
pub struct Segment {
    seq: u64,
    path: PathBuf,
    reader: SegmentReader,
    /// Once set, no new pin may be acquired; the file is unlinked when the
    /// last existing pin drops.
    deleted: AtomicBool,
    /// Seq of the merge output currently consuming this segment, 0 when none.
    merge_seq: AtomicU64,
}

impl Segment {
    pub fn new(seq: u64, reader: SegmentReader) -> Self {
        Self {
            seq,
            path: reader.path().to_path_buf(),
            reader,
            deleted: AtomicBool::new(false),
            merge_seq: AtomicU64::new(0),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reader(&self) -> &SegmentReader {
        &self.reader
    }

    pub fn entry_count(&self) -> usize {
        self.reader.entry_count()
    }

    /// No future root or transaction shall pin this segment; remove the
    /// backing file once the last existing pin drops.
    pub fn mark_delete(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn merge_seq(&self) -> u64 {
        self.merge_seq.load(Ordering::Acquire)
    }

    /// Claim this segment for the merge producing `output_seq`. Returns
    /// false when another merge already holds the claim.
    pub fn claim_for_merge(&self, output_seq: u64) -> bool {
        self.merge_seq
            .compare_exchange(0, output_seq, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn clear_merge(&self) {
        self.merge_seq.store(0, Ordering::Release);
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if self.deleted.load(Ordering::Acquire) {
            // The mapping goes away with the reader; then the file.
            match fs::remove_file(&self.path) {
                Ok(()) => debug!("unlinked retired segment {}", self.path.display()),
                Err(e) => warn!(
                    "failed to unlink retired segment {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sealed_segment(dir: &Path, seq: u64) -> Arc<Segment> {
        let path = dir.join(crate::segment::segment_file_name(seq));
        let mut writer = SegmentWriter::new(&path, seq);
        writer.put(b"k", b"v");
        Arc::new(Segment::new(seq, writer.seal().unwrap()))
    }

    #[test]
    fn test_unlink_waits_for_last_pin() {
        let dir = TempDir::new().unwrap();
        let segment = sealed_segment(dir.path(), 1);
        let path = segment.path().to_path_buf();
        let pin = Arc::clone(&segment);

        segment.mark_delete();
        drop(segment);
        // still pinned, file must survive
        assert!(path.exists());

        drop(pin);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_without_mark_delete_keeps_file() {
        let dir = TempDir::new().unwrap();
        let segment = sealed_segment(dir.path(), 2);
        let path = segment.path().to_path_buf();
        drop(segment);
        assert!(path.exists());
    }

    #[test]
    fn test_merge_claim_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let segment = sealed_segment(dir.path(), 3);
        assert!(segment.claim_for_merge(7));
        assert!(!segment.claim_for_merge(8));
        assert_eq!(segment.merge_seq(), 7);
        segment.clear_merge();
        assert!(segment.claim_for_merge(8));
    }
}

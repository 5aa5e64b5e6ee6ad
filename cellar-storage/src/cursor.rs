//! N-way merged iteration over a pinned root.
//!
//! One resolution path serves both user cursors and the merge engine:
//! walk every segment's iterator in parallel, emit the smallest pending
//! key, and let the segment nearest the front of the root win ties. The
//! merged stream still carries tombstones; the cursor drops them, the
//! merge engine decides per its policy.

use bytes::Bytes;

use cellar_core::types::Entry;

use crate::segment::{SegmentIter, SegmentList};

/// Key-ordered union of a segment list, newest wins on collisions.
pub(crate) struct MergedIter<'a> {
    iters: Vec<SegmentIter<'a>>,
}

impl<'a> MergedIter<'a> {
    /// Sub-iterators positioned at the first key ≥ `from`, in root order.
    pub(crate) fn new(root: &'a SegmentList, from: &[u8]) -> Self {
        Self {
            iters: root
                .iter()
                .map(|segment| segment.reader().iter_from(from))
                .collect(),
        }
    }

    /// Resolve and consume the smallest pending key.
    pub(crate) fn next_entry(&mut self) -> Option<(Bytes, Entry)> {
        // Strict < keeps the first (newest) segment as winner on key ties.
        let mut min_key: Option<&[u8]> = None;
        let mut winner = 0usize;
        for (idx, iter) in self.iters.iter().enumerate() {
            let Some(key) = iter.peek_key() else { continue };
            if min_key.map_or(true, |m| key < m) {
                min_key = Some(key);
                winner = idx;
            }
        }
        min_key?;

        let (key, entry) = self.iters[winner].current()?;
        // Every segment sitting on this key moves past it; the losers'
        // entries are older versions and must not surface later.
        for iter in &mut self.iters {
            if iter.peek_key() == Some(key.as_ref()) {
                iter.advance();
            }
        }
        Some((key, entry))
    }
}

/// Ordered iterator over the live keys of a transaction's snapshot.
///
/// A cursor starts unpositioned: `next` before the first `seek` returns
/// `None` rather than silently rewinding to the start.
pub struct Cursor<'a> {
    root: &'a SegmentList,
    merged: Option<MergedIter<'a>>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(root: &'a SegmentList) -> Self {
        Self { root, merged: None }
    }

    /// Position at the first live key ≥ `key` and return it with its value.
    pub fn seek(&mut self, key: &[u8]) -> Option<(Bytes, Bytes)> {
        self.merged = Some(MergedIter::new(self.root, key));
        self.next()
    }

    /// The next live key after the current position.
    pub fn next(&mut self) -> Option<(Bytes, Bytes)> {
        let merged = self.merged.as_mut()?;
        while let Some((key, entry)) = merged.next_entry() {
            if let Entry::Value(value) = entry {
                return Some((key, value));
            }
            // tombstone: the key is dead at this snapshot, keep scanning
        }
        None
    }
}

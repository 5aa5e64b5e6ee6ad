//! The root: an ordered, copy-on-write list of live segments.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use cellar_core::error::{Error, Result};

use super::handle::Segment;

/// Newest-first sequence of live segments.
///
/// Lists are never mutated in place: every root change builds a new list
/// and publishes it whole. Cloning a list clones each member's pin, so a
/// clone is a snapshot that keeps its segments alive on its own.
///
/// "Newest first" is the list order itself. A merged segment takes the
/// position of its newest source, which can leave its seq numerically
/// larger than a left neighbor; read resolution therefore always follows
/// position, never raw seq comparison.
#[derive(Clone, Default)]
pub struct SegmentList {
    segments: Vec<Arc<Segment>>,
}

impl SegmentList {
    pub fn new(segments: Vec<Arc<Segment>>) -> Self {
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Segment>> {
        self.segments.iter()
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.segments.iter().any(|s| s.seq() == seq)
    }

    /// New list with `segment` prepended; a freshly committed segment is
    /// the newest member.
    pub fn push_front(&self, segment: Arc<Segment>) -> SegmentList {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(segment);
        segments.extend(self.segments.iter().cloned());
        SegmentList { segments }
    }

    /// New list with every seq in `remove` gone and `insert` placed where
    /// the newest removed member sat, keeping the rest of the order intact.
    pub fn replace(&self, remove: &[u64], insert: Arc<Segment>) -> SegmentList {
        let mut segments = Vec::with_capacity(self.segments.len() + 1 - remove.len().min(self.segments.len()));
        let mut inserted = false;
        for segment in &self.segments {
            if remove.contains(&segment.seq()) {
                if !inserted {
                    segments.push(Arc::clone(&insert));
                    inserted = true;
                }
            } else {
                segments.push(Arc::clone(segment));
            }
        }
        if !inserted {
            segments.insert(0, insert);
        }
        SegmentList { segments }
    }

    /// Encode as concatenated 8-byte big-endian seqs, in list order.
    pub fn encode(&self) -> Vec<u8> {
        encode_seqs(self.segments.iter().map(|s| s.seq()))
    }
}

/// Encode a seq sequence as concatenated 8-byte big-endian integers.
pub(crate) fn encode_seqs(seqs: impl Iterator<Item = u64>) -> Vec<u8> {
    let mut buf = Vec::new();
    for seq in seqs {
        // Vec<u8> writes cannot fail
        let _ = buf.write_u64::<BigEndian>(seq);
    }
    buf
}

/// Decode a seq list from its binary form.
pub(crate) fn decode_seqs(data: &[u8]) -> Result<Vec<u64>> {
    if data.len() % 8 != 0 {
        return Err(Error::Corruption {
            path: "manifest".to_string(),
            reason: format!("length {} is not a multiple of 8", data.len()),
        });
    }
    Ok(data.chunks_exact(8).map(BigEndian::read_u64).collect())
}

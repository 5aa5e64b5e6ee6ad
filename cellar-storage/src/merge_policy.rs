//! Deciding which segments to merge.

use std::sync::Arc;

use crate::segment::{Segment, SegmentList};

/// A unit of compaction work: replace `sources` with one merged segment.
///
/// `sources` are held in root order (newest first) and stay pinned for the
/// duration of the merge by this very list.
pub struct Merge {
    pub sources: Vec<Arc<Segment>>,
    /// Elide tombstones from the output. Only legal when no segment older
    /// than the sources could still hold a version of a masked key.
    pub drop_deletes: bool,
}

/// Chooses merges for a root. The engine re-validates each proposal under
/// the writer lock before acting on it.
pub trait MergePolicy: Send {
    fn merges(&self, root: &SegmentList) -> Vec<Merge>;
}

/// Groups runs of `merge_factor` consecutive segments, oldest run first.
///
/// A segment already claimed by an in-flight merge is a barrier: runs never
/// span it. Tombstones are dropped only for the run that includes the
/// oldest live segment, since nothing older remains to resurrect a deleted
/// key.
pub struct SimpleMergePolicy {
    merge_factor: usize,
}

impl SimpleMergePolicy {
    pub fn new(merge_factor: usize) -> Self {
        Self {
            merge_factor: merge_factor.max(2),
        }
    }
}

impl Default for SimpleMergePolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MergePolicy for SimpleMergePolicy {
    fn merges(&self, root: &SegmentList) -> Vec<Merge> {
        let mut merges = Vec::new();
        let mut run: Vec<Arc<Segment>> = Vec::new();
        let mut run_touches_oldest = false;

        // The root is stored newest first; scan it oldest to newest.
        for (pos, segment) in root.segments().iter().rev().enumerate() {
            if segment.merge_seq() != 0 {
                run.clear();
                run_touches_oldest = false;
                continue;
            }
            if pos == 0 {
                run_touches_oldest = true;
            }
            run.push(Arc::clone(segment));
            if run.len() == self.merge_factor {
                let mut sources = std::mem::take(&mut run);
                sources.reverse(); // back to newest-first
                merges.push(Merge {
                    sources,
                    drop_deletes: run_touches_oldest,
                });
                run_touches_oldest = false;
            }
        }

        merges
    }
}

//! The background merge engine.
//!
//! A dedicated worker consumes wake signals (from commits and
//! `Store::force_merge`) plus an optional periodic tick, asks the policy
//! for work, and installs each result by atomic root substitution. A merge
//! is invisible to readers: the observable key space before and after an
//! install is identical. Nothing here ever surfaces an error to a user
//! transaction; failures are logged, counted, and abandoned.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{never, tick, Receiver};
use crossbeam::select;
use tracing::{debug, error, info};

use cellar_core::error::Result;
use cellar_core::types::Entry;

use crate::cursor::MergedIter;
use crate::merge_policy::{Merge, MergePolicy};
use crate::segment::{Segment, SegmentList, SegmentWriter};
use crate::store::StoreInner;

pub(crate) struct MergeEngine<P> {
    store: Arc<StoreInner>,
    policy: P,
}

impl<P: MergePolicy> MergeEngine<P> {
    pub(crate) fn new(store: Arc<StoreInner>, policy: P) -> Self {
        Self { store, policy }
    }

    /// Worker loop. Exits when the store closes.
    pub(crate) fn run(self, wake: Receiver<()>) {
        let ticker: Receiver<Instant> = if self.store.opts.automatic_merge {
            tick(self.store.opts.merge_check_interval)
        } else {
            never()
        };

        loop {
            select! {
                recv(wake) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                }
                recv(ticker) -> _ => {}
            }
            if self.store.is_closed() {
                break;
            }
            self.run_cycle();
        }
        debug!("merge worker stopped");
    }

    /// One policy consultation plus execution of everything it proposed.
    /// A wake arriving while this runs stays queued and triggers the next
    /// cycle, so requests made mid-merge are never lost.
    fn run_cycle(&self) {
        let root = self.store.root_snapshot();
        let merges = self.policy.merges(&root);
        drop(root);

        for merge in merges {
            match self.execute(merge) {
                Ok(true) => {
                    self.store.merges_completed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(false) => {} // root moved on, proposal abandoned
                Err(e) => {
                    self.store.merge_errors.fetch_add(1, Ordering::SeqCst);
                    error!("merge failed: {}", e);
                }
            }
        }
    }

    /// Returns Ok(true) when the merge installed, Ok(false) when it was
    /// abandoned because its sources left the root or were claimed by
    /// another merge in the meantime.
    fn execute(&self, merge: Merge) -> Result<bool> {
        let output_seq;
        {
            // Claim phase: sources must still be live and unclaimed.
            let _guard = self.store.writer_mutex.lock();
            let root = self.store.root_snapshot();
            if !merge.sources.iter().all(|s| root.contains(s.seq())) {
                return Ok(false);
            }
            if merge.sources.iter().any(|s| s.merge_seq() != 0) {
                return Ok(false);
            }
            output_seq = self.store.reserve_seq();
            for segment in &merge.sources {
                let claimed = segment.claim_for_merge(output_seq);
                debug_assert!(claimed);
            }
        }

        match self.produce_and_install(&merge, output_seq) {
            Ok(()) => Ok(true),
            Err(e) => {
                for segment in &merge.sources {
                    segment.clear_merge();
                }
                Err(e)
            }
        }
    }

    fn produce_and_install(&self, merge: &Merge, output_seq: u64) -> Result<()> {
        let path = self.store.segment_path(output_seq);
        let mut writer = SegmentWriter::new(&path, output_seq);

        // Newest-wins union of the sources; the same resolution the cursor
        // applies, except tombstones reach us and are handled per policy.
        let sources = SegmentList::new(merge.sources.clone());
        let mut entries = MergedIter::new(&sources, b"");
        while let Some((key, entry)) = entries.next_entry() {
            match entry {
                Entry::Value(value) => writer.put(&key, &value),
                Entry::Tombstone if merge.drop_deletes => {}
                Entry::Tombstone => writer.delete(&key),
            }
        }

        info!(
            "merging {} segments into {} ({} entries, drop_deletes={})",
            merge.sources.len(),
            output_seq,
            writer.len(),
            merge.drop_deletes
        );

        // A merge whose every entry was a dropped tombstone still seals a
        // valid empty segment.
        let reader = match writer.seal() {
            Ok(reader) => reader,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        };
        let output = Arc::new(Segment::new(output_seq, reader));

        let remove: Vec<u64> = merge.sources.iter().map(|s| s.seq()).collect();
        {
            let _guard = self.store.writer_mutex.lock();
            let new_root = self
                .store
                .root_snapshot()
                .replace(&remove, Arc::clone(&output));
            if let Err(e) = self.store.publish_root(new_root) {
                // Root unchanged; the sealed output is garbage.
                output.mark_delete();
                return Err(e);
            }
        }

        // Retire the sources. Readers still pinning them keep the files
        // alive until their snapshots close.
        for segment in &merge.sources {
            segment.clear_merge();
            segment.mark_delete();
        }

        debug!("installed merged segment {}", output_seq);
        Ok(())
    }
}

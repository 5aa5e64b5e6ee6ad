//! Transactions.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::MutexGuard;
use tracing::debug;

use cellar_core::error::{Error, Result};
use cellar_core::types::Entry;

use crate::cursor::Cursor;
use crate::segment::{Segment, SegmentList, SegmentWriter};
use crate::store::StoreInner;

/// A point-in-time view of the store, optionally with pending writes.
///
/// Read-only transactions pin the root as of `begin` and never block on
/// writers or merges. A writable transaction holds the single writer slot
/// for its whole lifetime; its mutations accumulate in a pending segment
/// that becomes visible atomically at commit. Pending writes are not
/// readable from within the same transaction.
pub struct Tx<'a> {
    store: &'a StoreInner,
    root: SegmentList,
    pending: Option<SegmentWriter>,
    guard: Option<MutexGuard<'a, ()>>,
    managed: bool,
    closed: bool,
}

impl<'a> Tx<'a> {
    pub(crate) fn new(
        store: &'a StoreInner,
        root: SegmentList,
        pending: Option<SegmentWriter>,
        guard: Option<MutexGuard<'a, ()>>,
        managed: bool,
    ) -> Self {
        Self {
            store,
            root,
            pending,
            guard,
            managed,
            closed: false,
        }
    }

    pub fn writable(&self) -> bool {
        self.pending.is_some()
    }

    /// Look up `key` in the snapshot. `None` means absent or deleted.
    ///
    /// Segments are consulted front to back; the first one that knows the
    /// key answers, whether with a value or a tombstone.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        for segment in self.root.iter() {
            if let Some(entry) = segment.reader().get(key) {
                return match entry {
                    Entry::Value(value) => Some(value),
                    Entry::Tombstone => None,
                };
            }
        }
        None
    }

    /// Record `key = value` in the pending segment.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending_mut()?.put(key, value);
        Ok(())
    }

    /// Record a tombstone for `key`. Deleting a key that was never present
    /// is allowed and idempotent.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.pending_mut()?.delete(key);
        Ok(())
    }

    fn pending_mut(&mut self) -> Result<&mut SegmentWriter> {
        if self.closed {
            return Err(Error::TxClosed);
        }
        self.pending.as_mut().ok_or(Error::TxNotWritable)
    }

    /// Cursor over the snapshot. Call `seek` before `next`.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.root)
    }

    /// Seal the pending segment and publish it as the newest root member.
    pub fn commit(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::TxClosed);
        }
        if self.managed {
            return Err(Error::TxIsManaged);
        }
        if self.pending.is_none() {
            return Err(Error::TxNotWritable);
        }
        self.commit_internal()
    }

    /// Discard pending writes and release the snapshot. Valid on read-only
    /// transactions, where it simply closes them.
    pub fn rollback(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::TxClosed);
        }
        if self.managed {
            return Err(Error::TxIsManaged);
        }
        self.rollback_internal()
    }

    pub(crate) fn commit_internal(&mut self) -> Result<()> {
        let writer = match self.pending.take() {
            Some(writer) => writer,
            None => {
                self.close_tx();
                return Err(Error::TxNotWritable);
            }
        };

        if writer.is_empty() {
            // Nothing recorded: no segment, no root change. The seq
            // reserved at begin stays consumed.
            self.close_tx();
            return Ok(());
        }

        let seq = writer.seq();
        let path = writer.path().to_path_buf();
        let reader = match writer.seal() {
            Ok(reader) => reader,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                self.close_tx();
                return Err(e);
            }
        };
        let segment = Arc::new(Segment::new(seq, reader));

        // We hold the writer slot, so nothing changed the root since begin;
        // publish manifest-first, then the pointer.
        let new_root = self.store.root_snapshot().push_front(Arc::clone(&segment));
        if let Err(e) = self.store.publish_root(new_root) {
            // Root unchanged; the sealed file must not survive.
            segment.mark_delete();
            self.close_tx();
            return Err(e);
        }

        self.store.commits.fetch_add(1, Ordering::Relaxed);
        debug!(
            "committed segment {} with {} entries",
            seq,
            segment.entry_count()
        );

        let automatic = self.store.opts.automatic_merge;
        self.close_tx();
        if automatic {
            self.store.wake_merger();
        }
        Ok(())
    }

    pub(crate) fn rollback_internal(&mut self) -> Result<()> {
        let result = match self.pending.take() {
            Some(writer) => writer.discard(),
            None => Ok(()),
        };
        self.close_tx();
        result
    }

    /// Release the snapshot pins and the writer slot; all later calls see
    /// a closed transaction.
    fn close_tx(&mut self) {
        self.root = SegmentList::default();
        self.guard = None;
        self.closed = true;
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.rollback_internal();
        }
    }
}

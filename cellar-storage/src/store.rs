//! The store: directory lifecycle, the root, writers, and the merge worker.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                             │
//! │                                                             │
//! │  update/begin(true) ──> pending segment ──> seal + fsync    │
//! │                                │                            │
//! │                                ▼                            │
//! │                    manifest, then root swap                 │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Read Path                              │
//! │                                                             │
//! │  view/begin(false) ──> pin root ──> walk segments front     │
//! │                                     to back, newest wins    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writers serialize on a single mutex; readers only clone the current
//! root, so they never wait on a writer or a merge. A background worker
//! compacts segments and substitutes its results into the root without
//! changing anything observable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use cellar_core::config::Options;
use cellar_core::error::{Error, Result};

use crate::manifest;
use crate::merge::MergeEngine;
use crate::merge_policy::SimpleMergePolicy;
use crate::segment::{parse_segment_file_name, segment_file_name, Segment, SegmentList, SegmentReader, SegmentWriter};
use crate::tx::Tx;

/// Counter snapshot returned by [`Store::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub commits: u64,
    pub merges_completed: u64,
    pub merge_errors: u64,
    pub num_segments: usize,
}

/// Shared store state; the merge worker holds its own handle to this.
pub(crate) struct StoreInner {
    pub(crate) dir: PathBuf,
    pub(crate) opts: Options,
    /// Serializes writable transactions and root publication.
    pub(crate) writer_mutex: Mutex<()>,
    /// Current root; swapped under `writer_mutex`, read by anyone.
    root: RwLock<SegmentList>,
    next_seq: AtomicU64,
    closed: AtomicBool,
    merge_wake: Sender<()>,
    pub(crate) commits: AtomicU64,
    pub(crate) merges_completed: AtomicU64,
    pub(crate) merge_errors: AtomicU64,
}

impl StoreInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    /// Pinned snapshot of the current root.
    pub(crate) fn root_snapshot(&self) -> SegmentList {
        self.root.read().clone()
    }

    pub(crate) fn reserve_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn segment_path(&self, seq: u64) -> PathBuf {
        self.dir.join(segment_file_name(seq))
    }

    /// Persist `new_root` to the manifest, then swap it in. The caller must
    /// hold `writer_mutex`; readers that snapshotted earlier keep the old
    /// list alive through their own pins.
    pub(crate) fn publish_root(&self, new_root: SegmentList) -> Result<()> {
        manifest::save(&self.dir, &new_root)?;
        *self.root.write() = new_root;
        Ok(())
    }

    /// Nudge the merge worker. Never blocks; a wake already pending is
    /// enough, so extra requests coalesce.
    pub(crate) fn wake_merger(&self) {
        let _ = self.merge_wake.try_send(());
    }
}

/// An open cellar directory.
pub struct Store {
    inner: Arc<StoreInner>,
    worker: Option<JoinHandle<()>>,
}

impl Store {
    /// Open (or create) the store rooted at `dir`.
    ///
    /// Recovery reconstructs the root from the manifest. Segment files that
    /// never finished sealing fail validation and are skipped; any
    /// parseable segment file name still advances the seq counter, so a
    /// leftover partial can never collide with a future writer. A manifest
    /// entry without a valid file is a hard error.
    pub fn open(dir: impl AsRef<Path>, opts: Options) -> Result<Store> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut max_seq = 0u64;
        for dirent in fs::read_dir(&dir)? {
            let dirent = dirent?;
            if let Some(name) = dirent.file_name().to_str() {
                if let Some(seq) = parse_segment_file_name(name) {
                    max_seq = max_seq.max(seq);
                }
            }
        }

        let root = match manifest::load(&dir)? {
            Some(seqs) => {
                let mut segments = Vec::with_capacity(seqs.len());
                for seq in seqs {
                    let path = dir.join(segment_file_name(seq));
                    let reader = SegmentReader::open(&path).map_err(|e| {
                        warn!("manifest segment {} unusable: {}", seq, e);
                        Error::ManifestMismatch { seq }
                    })?;
                    segments.push(Arc::new(Segment::new(seq, reader)));
                    max_seq = max_seq.max(seq);
                }
                SegmentList::new(segments)
            }
            None => SegmentList::default(),
        };

        info!(
            "opened store at {} with {} segments, next seq {}",
            dir.display(),
            root.len(),
            max_seq + 1
        );

        let (wake_tx, wake_rx) = bounded::<()>(1);
        let inner = Arc::new(StoreInner {
            dir,
            opts: opts.clone(),
            writer_mutex: Mutex::new(()),
            root: RwLock::new(root),
            next_seq: AtomicU64::new(max_seq + 1),
            closed: AtomicBool::new(false),
            merge_wake: wake_tx,
            commits: AtomicU64::new(0),
            merges_completed: AtomicU64::new(0),
            merge_errors: AtomicU64::new(0),
        });

        // The worker always runs so that explicit merge requests work even
        // with automatic merging off; the flag only governs wake sources.
        let engine = MergeEngine::new(
            Arc::clone(&inner),
            SimpleMergePolicy::new(opts.merge_factor),
        );
        let worker = thread::Builder::new()
            .name("cellar-merge".to_string())
            .spawn(move || engine.run(wake_rx))?;

        Ok(Store {
            inner,
            worker: Some(worker),
        })
    }

    /// Start a transaction. A writable transaction takes the single writer
    /// slot and keeps it until commit or rollback; a read-only transaction
    /// just pins the current root.
    pub fn begin(&self, writable: bool) -> Result<Tx<'_>> {
        self.begin_tx(writable, false)
    }

    fn begin_tx(&self, writable: bool, managed: bool) -> Result<Tx<'_>> {
        self.inner.check_open()?;
        if writable {
            let guard = self.inner.writer_mutex.lock();
            self.inner.check_open()?;
            let seq = self.inner.reserve_seq();
            let writer = SegmentWriter::new(self.inner.segment_path(seq), seq);
            let root = self.inner.root_snapshot();
            Ok(Tx::new(
                &self.inner,
                root,
                Some(writer),
                Some(guard),
                managed,
            ))
        } else {
            let root = self.inner.root_snapshot();
            Ok(Tx::new(&self.inner, root, None, None, managed))
        }
    }

    /// Run `f` in a managed read-only transaction.
    pub fn view<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<()>,
    {
        let mut tx = self.begin_tx(false, true)?;
        let result = f(&mut tx);
        let _ = tx.rollback_internal();
        result
    }

    /// Run `f` in a managed writable transaction: commit on `Ok`, roll back
    /// and hand the error through on `Err`.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<()>,
    {
        let mut tx = self.begin_tx(true, true)?;
        match f(&mut tx) {
            Ok(()) => tx.commit_internal(),
            Err(e) => {
                let _ = tx.rollback_internal();
                Err(e)
            }
        }
    }

    /// Ask the merge worker to run a cycle now. Fire and forget: requests
    /// made while a cycle runs coalesce into one follow-up cycle.
    pub fn force_merge(&self) {
        self.inner.wake_merger();
    }

    pub fn stats(&self) -> Stats {
        Stats {
            commits: self.inner.commits.load(Ordering::Relaxed),
            merges_completed: self.inner.merges_completed.load(Ordering::SeqCst),
            merge_errors: self.inner.merge_errors.load(Ordering::SeqCst),
            num_segments: self.inner.root_snapshot().len(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.dir
    }

    /// Stop the merge worker and release every pin this store owns.
    /// Segment files stay on disk for the next open.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.wake_merger();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("merge worker panicked during close");
            }
        }
        // Wait out any writable transaction, then drop the root pins.
        {
            let _guard = self.inner.writer_mutex.lock();
            *self.inner.root.write() = SegmentList::default();
        }
        info!("closed store at {}", self.inner.dir.display());
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store");
        let store = Store::open(&path, Options::default()).unwrap();
        assert!(path.is_dir());
        assert_eq!(store.stats().num_segments, 0);
        store.close().unwrap();
    }

    #[test]
    fn test_manifest_referencing_missing_segment_fails_open() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = Store::open(dir.path(), Options::no_automatic_merge()).unwrap();
            store
                .update(|tx| {
                    tx.put(b"k", b"v")?;
                    Ok(())
                })
                .unwrap();
            store.close().unwrap();
        }

        fs::remove_file(dir.path().join(segment_file_name(1))).unwrap();

        assert!(matches!(
            Store::open(dir.path(), Options::no_automatic_merge()),
            Err(Error::ManifestMismatch { seq: 1 })
        ));
    }

    #[test]
    fn test_unsealed_segment_is_skipped_but_advances_seq() {
        let dir = tempfile::TempDir::new().unwrap();
        // a partial from a crashed seal, never referenced by a manifest
        fs::write(dir.path().join(segment_file_name(9)), b"torn write").unwrap();

        let store = Store::open(dir.path(), Options::no_automatic_merge()).unwrap();
        assert_eq!(store.stats().num_segments, 0);
        store
            .update(|tx| {
                tx.put(b"k", b"v")?;
                Ok(())
            })
            .unwrap();
        // the new segment must land past the partial, not on top of it
        assert!(dir.path().join(segment_file_name(10)).exists());
        store.close().unwrap();
    }
}

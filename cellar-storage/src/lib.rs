//! # Cellar Storage
//!
//! Embedded, disk-backed ordered key-value store built from immutable,
//! seq-numbered segments.
//!
//! Writes accumulate in a pending segment owned by the single writable
//! transaction and become durable and visible atomically at commit. Reads
//! pin a snapshot of the root segment list and merge across it newest
//! first, with tombstones masking older versions. A background worker
//! compacts runs of segments into merged replacements without changing
//! anything a reader can observe.
//!
//! ```no_run
//! use cellar_storage::{Options, Store};
//!
//! # fn main() -> cellar_storage::Result<()> {
//! let store = Store::open("./data", Options::default())?;
//! store.update(|tx| {
//!     tx.put(b"hello", b"world")?;
//!     Ok(())
//! })?;
//! store.view(|tx| {
//!     assert_eq!(tx.get(b"hello").as_deref(), Some(&b"world"[..]));
//!     Ok(())
//! })?;
//! store.close()
//! # }
//! ```

pub mod cursor;
pub mod manifest;
mod merge;
pub mod merge_policy;
pub mod segment;
pub mod store;
pub mod tx;

pub use cursor::Cursor;
pub use merge_policy::{Merge, MergePolicy, SimpleMergePolicy};
pub use segment::{Segment, SegmentList, SegmentReader, SegmentWriter};
pub use store::{Stats, Store};
pub use tx::Tx;

// Re-export the core surface so embedders need a single dependency.
pub use cellar_core::{Entry, Error, Options, Result};

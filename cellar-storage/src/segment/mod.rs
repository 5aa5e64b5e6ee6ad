//! Immutable on-disk segments and their in-memory lifecycle.
//!
//! A segment is the unit of durability: every commit and every merge
//! produces exactly one, and its contents never change after seal.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Segment File Structure                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Data:  [key_len u32][val_len u32][key][value]  per entry   │
//! │         (val_len == 0xffffffff marks a tombstone, no value) │
//! │  Index: [key_len u32][entry_offset u64][key]    per entry   │
//! │  Footer: [index_offset u64][entry_count u64]                │
//! │          [checksum u32][version u32][magic 8B]              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are sorted by key within both the data and index regions. The
//! checksum covers everything before the footer, so a seal that never
//! finished is detected on open and the file is ignored.

mod handle;
mod iterator;
mod list;
mod reader;
mod types;
mod writer;

pub(crate) use list::decode_seqs;

pub use handle::Segment;
pub use iterator::SegmentIter;
pub use list::SegmentList;
pub use reader::SegmentReader;
pub use types::{
    parse_segment_file_name, segment_file_name, FOOTER_SIZE, SEGMENT_MAGIC, SEGMENT_VERSION,
    TOMBSTONE_LEN,
};
pub use writer::SegmentWriter;

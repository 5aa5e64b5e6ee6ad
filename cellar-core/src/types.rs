//! Core value types.
//!
//! Keys and values are arbitrary byte strings. Keys order by unsigned
//! lexicographic byte comparison; the empty key is valid and sorts first.
//! An empty value is distinct from an absent key.

use bytes::Bytes;

/// Monotonically increasing identifier assigned to each segment at creation.
pub type Seq = u64;

/// A single record within a segment: either a live value or a deletion
/// marker that masks every older version of its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Value(Bytes),
    Tombstone,
}

impl Entry {
    /// The live value, if any.
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone)
    }
}

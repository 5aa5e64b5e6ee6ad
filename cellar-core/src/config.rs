//! # Configuration Management
//!
//! Tuning options recognized by the store.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Wake the merge worker after every commit and on a periodic tick.
    /// When false, merges run only on explicit request.
    pub automatic_merge: bool,

    /// Number of consecutive segments combined per merge.
    pub merge_factor: usize,

    /// Periodic merge check, in addition to event-driven wakes.
    pub merge_check_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            automatic_merge: true,
            merge_factor: 2,
            merge_check_interval: Duration::from_secs(1),
        }
    }
}

impl Options {
    /// Options with background merging disabled; merges still run when
    /// explicitly requested.
    pub fn no_automatic_merge() -> Self {
        Self {
            automatic_merge: false,
            ..Self::default()
        }
    }
}

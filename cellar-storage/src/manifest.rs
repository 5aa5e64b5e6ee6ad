//! Persistence of the root segment list.
//!
//! The manifest is the current root's seq list, newest first, as 8-byte
//! big-endian integers: `8 * len(root)` bytes, zero bytes for an empty
//! root. It is rewritten after every root change via write-to-temp and
//! rename with the containing directory fsynced, so a reopen always sees
//! either the old root or the new one, never a torn mix.

use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::Path;

use tracing::debug;

use cellar_core::error::Result;

use crate::segment::{decode_seqs, SegmentList};

pub const MANIFEST_NAME: &str = "manifest";
const MANIFEST_TMP_NAME: &str = "manifest.tmp";

/// Atomically replace the manifest with the encoding of `root`.
pub fn save(dir: &Path, root: &SegmentList) -> Result<()> {
    let tmp_path = dir.join(MANIFEST_TMP_NAME);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        std::io::Write::write_all(&mut file, &root.encode())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, dir.join(MANIFEST_NAME))?;
    File::open(dir)?.sync_all()?;

    debug!("manifest now lists {} segments", root.len());
    Ok(())
}

/// Read the manifest's seq list in stored order, or `None` when no manifest
/// exists yet (a fresh directory).
pub fn load(dir: &Path) -> Result<Option<Vec<u64>>> {
    let mut data = Vec::new();
    match File::open(dir.join(MANIFEST_NAME)) {
        Ok(mut file) => {
            file.read_to_end(&mut data)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    decode_seqs(&data).map(Some)
}

//! Helpers shared by the end-to-end tests.
#![allow(dead_code)]

use std::time::{Duration, Instant};

use bytes::Bytes;

use cellar_storage::{Options, Result, Store, Tx};

pub fn no_auto_merge() -> Options {
    Options::no_automatic_merge()
}

/// Write `(k<hex16(i)>, v<hex16(i)>)` pairs for `i` in `start..end`.
pub fn put_kv_pairs(tx: &mut Tx<'_>, start: usize, end: usize) -> Result<()> {
    for i in start..end {
        tx.put(
            format!("k{:016x}", i).as_bytes(),
            format!("v{:016x}", i).as_bytes(),
        )?;
    }
    Ok(())
}

pub fn check_key(tx: &Tx<'_>, key: &str, expected: &str) {
    match tx.get(key.as_bytes()) {
        Some(v) => assert_eq!(
            v.as_ref(),
            expected.as_bytes(),
            "unexpected value for key '{}'",
            key
        ),
        None => panic!("expected key '{}' to have value '{}', got none", key, expected),
    }
}

pub fn check_no_key(tx: &Tx<'_>, key: &str) {
    if let Some(v) = tx.get(key.as_bytes()) {
        panic!(
            "expected key '{}' to be absent, got '{}'",
            key,
            String::from_utf8_lossy(&v)
        );
    }
}

/// Full traversal from the empty key: verify the first pair, the last pair,
/// and the total count.
pub fn check_cursor(
    tx: &Tx<'_>,
    first_key: &str,
    first_value: &str,
    last_key: &str,
    last_value: &str,
    expected_count: usize,
) {
    let mut cursor = tx.cursor();
    let mut first: Option<(Bytes, Bytes)> = None;
    let mut last: Option<(Bytes, Bytes)> = None;
    let mut count = 0;

    let mut item = cursor.seek(b"");
    while let Some((k, v)) = item {
        if first.is_none() {
            first = Some((k.clone(), v.clone()));
        }
        last = Some((k, v));
        count += 1;
        item = cursor.next();
    }

    let (fk, fv) = first.expect("cursor yielded nothing");
    let (lk, lv) = last.expect("cursor yielded nothing");
    assert_eq!(fk.as_ref(), first_key.as_bytes(), "first key");
    assert_eq!(fv.as_ref(), first_value.as_bytes(), "first value");
    assert_eq!(lk.as_ref(), last_key.as_bytes(), "last key");
    assert_eq!(lv.as_ref(), last_value.as_bytes(), "last value");
    assert_eq!(count, expected_count, "pair count");
}

/// Verify both the point-lookup view and the cursor view against the same
/// expected live mapping, in key order.
pub fn check_contents(tx: &Tx<'_>, pairs: &[(&str, &str)]) {
    for (key, value) in pairs {
        check_key(tx, key, value);
    }

    let mut cursor = tx.cursor();
    let mut item = cursor.seek(b"");
    let mut i = 0;
    while let Some((k, v)) = item {
        assert!(i < pairs.len(), "cursor yielded more than {} pairs", pairs.len());
        assert_eq!(k.as_ref(), pairs[i].0.as_bytes(), "key at position {}", i);
        assert_eq!(v.as_ref(), pairs[i].1.as_bytes(), "value at position {}", i);
        i += 1;
        item = cursor.next();
    }
    assert_eq!(i, pairs.len(), "cursor pair count");
}

/// Spin until the store reports at least `target` completed merges.
pub fn wait_for_merges(store: &Store, target: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while store.stats().merges_completed < target {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} merges, at {}",
            target,
            store.stats().merges_completed
        );
        std::thread::yield_now();
    }
}

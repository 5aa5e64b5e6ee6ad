//! Unit tests for core types, errors, and configuration.

use std::time::Duration;

use bytes::Bytes;
use cellar_core::{Entry, Error, Options};

#[test]
fn test_default_options() {
    let opts = Options::default();
    assert!(opts.automatic_merge);
    assert_eq!(opts.merge_factor, 2);
    assert_eq!(opts.merge_check_interval, Duration::from_secs(1));

    let opts = Options::no_automatic_merge();
    assert!(!opts.automatic_merge);
    assert_eq!(opts.merge_factor, 2);
}

#[test]
fn test_entry_accessors() {
    let value = Entry::Value(Bytes::from("v"));
    assert!(!value.is_tombstone());
    assert_eq!(value.into_value(), Some(Bytes::from("v")));

    let tombstone = Entry::Tombstone;
    assert!(tombstone.is_tombstone());
    assert_eq!(tombstone.into_value(), None);
}

#[test]
fn test_error_messages_name_the_state() {
    assert_eq!(
        Error::TxNotWritable.to_string(),
        "transaction is not writable"
    );
    assert!(Error::TxIsManaged.to_string().contains("managed"));
    assert!(Error::TxClosed.to_string().contains("closed"));
    assert_eq!(
        Error::ManifestMismatch { seq: 7 }.to_string(),
        "manifest references segment 7 which is missing or invalid"
    );
}

#[test]
fn test_io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io { .. }));
    assert!(err.to_string().contains("nope"));
}

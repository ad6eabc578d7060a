//! Binlog Descriptors and Blobs
//!
//! A `Blob` is the codec output: a keyed chunk of bytes ready for the object
//! store. A `Binlog` describes one persisted blob: where it landed, how big
//! it is, and which rows it covers. Binlogs are what get reported to the
//! metadata coordinator after a flush.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::position::Timestamp;

/// Output unit of the codecs. The key is the field ID rendered base-10 for
/// field blobs, or a synthetic key for non-field blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub key: String,
    pub value: Bytes,
}

impl Blob {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Descriptor of one persisted binary log object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binlog {
    pub entries_num: i64,
    pub timestamp_from: Timestamp,
    pub timestamp_to: Timestamp,
    pub log_path: String,
    pub log_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_and_bytes() {
        let blob = Blob::new("101", vec![1u8, 2, 3]);
        assert_eq!(blob.key, "101");
        assert_eq!(blob.value.len(), 3);
    }
}

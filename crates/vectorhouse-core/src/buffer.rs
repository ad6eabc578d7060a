//! Write Buffers
//!
//! The two buffer shapes handed to the flush engine: `BufferData` for
//! inserted rows and `DeleteBuffer` for primary-key deletions. Ownership of
//! a buffer transfers to the flush engine per call; it is consumed during
//! serialization and never retained afterwards.

use std::collections::HashMap;

use crate::field_data::{FieldData, PrimaryKey};
use crate::position::{FieldId, Timestamp};

/// Buffered insert rows for one segment between two sync points.
#[derive(Debug, Clone, Default)]
pub struct BufferData {
    /// Columnar data keyed by field ID.
    pub fields: HashMap<FieldId, FieldData>,

    /// Number of buffered rows.
    pub size: i64,

    /// Timestamp range covered by the buffered rows.
    pub ts_from: Timestamp,
    pub ts_to: Timestamp,
}

impl BufferData {
    pub fn new(fields: HashMap<FieldId, FieldData>, size: i64, ts_from: Timestamp, ts_to: Timestamp) -> Self {
        Self {
            fields,
            size,
            ts_from,
            ts_to,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0 || self.fields.is_empty()
    }

    /// Per-field memory sizes, used for binlog size accounting.
    pub fn field_memory_sizes(&self) -> HashMap<FieldId, usize> {
        self.fields
            .iter()
            .map(|(field_id, data)| (*field_id, data.memory_size()))
            .collect()
    }
}

/// Buffered deletions for one segment between two sync points.
///
/// `log_path` and `log_size` are populated by the flush engine once the
/// delta blob has been serialized and its object path allocated.
#[derive(Debug, Clone, Default)]
pub struct DeleteBuffer {
    pub primary_keys: Vec<PrimaryKey>,
    pub timestamps: Vec<Timestamp>,

    pub ts_from: Timestamp,
    pub ts_to: Timestamp,

    pub log_path: Option<String>,
    pub log_size: i64,
}

impl DeleteBuffer {
    pub fn new(primary_keys: Vec<PrimaryKey>, timestamps: Vec<Timestamp>) -> Self {
        let ts_from = timestamps.iter().copied().min().unwrap_or(0);
        let ts_to = timestamps.iter().copied().max().unwrap_or(0);
        Self {
            primary_keys,
            timestamps,
            ts_from,
            ts_to,
            log_path: None,
            log_size: 0,
        }
    }

    pub fn entries_num(&self) -> i64 {
        self.primary_keys.len() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.primary_keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_buffer_ts_range() {
        let buf = DeleteBuffer::new(
            vec![PrimaryKey::Int64(1), PrimaryKey::Int64(2)],
            vec![30, 10],
        );
        assert_eq!(buf.ts_from, 10);
        assert_eq!(buf.ts_to, 30);
        assert_eq!(buf.entries_num(), 2);
    }

    #[test]
    fn test_empty_delete_buffer() {
        let buf = DeleteBuffer::new(vec![], vec![]);
        assert!(buf.is_empty());
        assert_eq!(buf.ts_from, 0);
        assert_eq!(buf.ts_to, 0);
    }
}

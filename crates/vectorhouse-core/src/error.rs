//! Error Types for VectorHouse Core
//!
//! ## Error Categories
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: Binlog blob doesn't start with expected magic bytes
//! - `CrcMismatch`: Payload corruption detected via checksum
//! - `Truncated`: Blob ends before the declared payload does
//!
//! ### Schema Errors
//! - `MissingPrimaryKey`: Collection schema has no primary-key field
//! - `RowCountMismatch`: Field columns of one buffer disagree on row count
//!
//! ## Usage
//! All fallible functions in this crate return `Result<T>`, aliased to
//! `Result<T, Error>`, so callers can propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported binlog version: {0}")]
    UnsupportedVersion(u8),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("Truncated blob: {0}")]
    Truncated(String),

    #[error("Invalid data type tag: {0}")]
    InvalidDataType(u8),

    #[error("No primary key field in schema")]
    MissingPrimaryKey,

    #[error("Row count mismatch: field {field_id} has {actual} rows, expected {expected}")]
    RowCountMismatch {
        field_id: i64,
        actual: usize,
        expected: usize,
    },

    #[error("Stats encoding error: {0}")]
    StatsEncoding(#[from] serde_json::Error),

    #[error("Encode error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

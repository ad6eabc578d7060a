//! VectorHouse Core Data Model
//!
//! This crate defines the data model shared by the VectorHouse data node:
//! message positions, collection schemas, columnar write buffers,
//! primary-key statistics, and the codecs that turn buffers into binlog
//! blobs.
//!
//! ## Where this sits
//!
//! ```text
//! ┌──────────────────┐
//! │  Write buffers   │  BufferData / DeleteBuffer (this crate)
//! └────────┬─────────┘
//!          │ serialize
//!          ▼
//! ┌──────────────────┐
//! │  Binlog codecs   │  InsertCodec / DeleteCodec (this crate)
//! └────────┬─────────┘
//!          │ blobs
//!          ▼
//! ┌──────────────────┐
//! │  Flush engine    │  vectorhouse-flush
//! └────────┬─────────┘
//!          │ put
//!          ▼
//! ┌──────────────────┐
//! │  Object storage  │
//! └──────────────────┘
//! ```
//!
//! The crate is deliberately synchronous and I/O-free: everything here is
//! pure data transformation, so the async flush engine can call into it
//! from any task without ceremony.

pub mod binlog;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod field_data;
pub mod position;
pub mod schema;
pub mod stats;
pub mod varint;

pub use binlog::{Binlog, Blob};
pub use buffer::{BufferData, DeleteBuffer};
pub use codec::{CompoundStats, DeleteCodec, InsertCodec, DELTA_BLOB_KEY};
pub use error::{Error, Result};
pub use field_data::{FieldData, PrimaryKey};
pub use position::{CollectionId, FieldId, PartitionId, Position, SegmentId, Timestamp};
pub use schema::{CollectionSchema, DataType, FieldSchema};
pub use stats::PrimaryKeyStats;

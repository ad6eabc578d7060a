//! Flush Engine Error Types
//!
//! ## Error Categories
//!
//! ### Object-store errors
//! - `KeyNotFound`: the object does not exist; swallowed on stale-flush
//!   read paths, propagated on fresh flushes
//! - `UnexpectedEof`: an object ended before the requested range did
//! - `ObjectStore`: any other backend failure, already past its retries
//!
//! ### Meta errors
//! - `Meta`: typed coordinator error; the notify callbacks branch on its
//!   variants to decide between warn-and-succeed and fatal
//! - `SegmentNotFound`: the segment vanished from the channel before
//!   serialization started
//!
//! ### Encoding errors
//! - `Codec`: buffer serialization failed
//! - `NoPrimaryKey` / `InvalidBlobKey`: schema or codec output did not have
//!   the shape the flush path requires
//!
//! A non-`None` error inside a flush pack is fatal by contract: the notify
//! callback reports it to the supervisor instead of persisting meta.

use thiserror::Error;

use vectorhouse_core::SegmentId;
use vectorhouse_metadata::MetaError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("key not found: {path}")]
    KeyNotFound { path: String },

    #[error("unexpected end of object: {path}")]
    UnexpectedEof { path: String },

    #[error("meta error: {0}")]
    Meta(#[from] MetaError),

    #[error("codec error: {0}")]
    Codec(#[from] vectorhouse_core::Error),

    #[error("segment not found during flush: {0}")]
    SegmentNotFound(SegmentId),

    #[error("no primary key in collection meta")]
    NoPrimaryKey,

    #[error("blob key is not a field ID: {0}")]
    InvalidBlobKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;

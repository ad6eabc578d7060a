//! Message Positions
//!
//! A `Position` pins a point in a virtual channel's message stream: the
//! channel name, the opaque broker-assigned message ID, and a hybrid
//! logical clock timestamp. Positions are how the flush engine names sync
//! points and how checkpoints are reported upstream.
//!
//! Within one segment, submitted positions are strictly increasing in
//! `timestamp`; the flush engine relies on this when ordering sync tasks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier types shared across the workspace.
pub type CollectionId = i64;
pub type PartitionId = i64;
pub type SegmentId = i64;
pub type FieldId = i64;

/// Hybrid logical clock value.
pub type Timestamp = u64;

/// A position in a virtual channel's message stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Virtual channel this position belongs to.
    pub channel_name: String,

    /// Opaque message ID assigned by the message queue.
    pub msg_id: Bytes,

    /// Hybrid logical clock timestamp of the message.
    pub timestamp: Timestamp,
}

impl Position {
    pub fn new(channel_name: impl Into<String>, msg_id: impl Into<Bytes>, timestamp: Timestamp) -> Self {
        Self {
            channel_name: channel_name.into(),
            msg_id: msg_id.into(),
            timestamp,
        }
    }

    /// A position is addressable only if it names a channel and a message.
    pub fn is_valid(&self) -> bool {
        !self.channel_name.is_empty() && !self.msg_id.is_empty()
    }
}

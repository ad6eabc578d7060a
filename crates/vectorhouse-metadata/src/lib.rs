//! VectorHouse Metadata Interfaces
//!
//! This crate defines the interfaces the data node consumes from the
//! metadata coordinator, plus the wire types those interfaces exchange.
//! It can be implemented by different transports (gRPC to a coordinator,
//! embedded for tests) while keeping a consistent API for the flush
//! engine.
//!
//! ## Traits
//!
//! - [`Broker`]: the coordinator RPC surface. Persist binlog paths,
//!   drop a virtual channel, advance channel checkpoints.
//! - [`Channel`]: the data node's view of one virtual channel's segments.
//! - [`Allocator`]: monotonic ID ranges for binlog object names.
//!
//! ## Error handling
//!
//! All operations return `Result<T, MetaError>`. The error classification
//! (`SegmentNotFound`, `ChannelNotFound`, `MetaFailed`, `Transport`) is
//! load-bearing: the flush engine's retry policies decide between
//! retrying, downgrading to a warning, and declaring a fatal outcome based
//! on these variants.

pub mod allocator;
pub mod channel;
pub mod error;
pub mod types;

use async_trait::async_trait;

use vectorhouse_core::Position;

pub use allocator::Allocator;
pub use channel::{Channel, SegmentHandle};
pub use error::{MetaError, Result};
pub use types::{
    CheckPoint, DropVirtualChannelRequest, DropVirtualChannelSegment, FieldBinlog,
    SaveBinlogPathsRequest, SegmentStartPosition, SegmentStatisticsUpdate,
};

/// Metadata coordinator RPC surface consumed by the flush engine.
///
/// Implementations must be `Send + Sync` and shareable as
/// `Arc<dyn Broker>`; the flush engine issues calls from many tasks
/// concurrently.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Persist the binlog paths of one completed sync.
    ///
    /// # Errors
    ///
    /// - `SegmentNotFound`: the segment was compacted or reassigned
    /// - `ChannelNotFound`: the channel no longer belongs to this node
    /// - `Transport`: transient failure, retryable
    async fn save_binlog_paths(&self, req: SaveBinlogPathsRequest) -> Result<()>;

    /// Flush the final state of every segment on a channel and release the
    /// channel in one call.
    ///
    /// # Errors
    ///
    /// - `MetaFailed` / `ChannelNotFound`: the channel already moved;
    ///   callers treat this as success
    /// - `Transport`: transient failure, retryable
    async fn drop_virtual_channel(&self, req: DropVirtualChannelRequest) -> Result<()>;

    /// Advance the consumer checkpoints of the given channels.
    async fn update_channel_checkpoint(&self, positions: Vec<Position>) -> Result<()>;
}

//! Channel State Interface
//!
//! `Channel` is the data node's view of one virtual channel: which segments
//! it owns, their schemas and statistics, and the buffer bookkeeping the
//! flush engine must update after a successful sync. The flush engine
//! consumes it as `Arc<dyn Channel>`; the concrete implementation lives
//! with the ingestion pipeline.
//!
//! ## Thread safety
//!
//! Implementations must be `Send + Sync`; the flush engine calls in from
//! multiple tasks concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vectorhouse_core::{
    CollectionId, CollectionSchema, PartitionId, Position, PrimaryKeyStats, SegmentId, Timestamp,
};

use crate::error::Result;
use crate::types::{SegmentStartPosition, SegmentStatisticsUpdate};

/// Shared handle to one segment's channel-local state.
///
/// The handle is shared between the ingestion pipeline and the flush
/// engine, so its mutable pieces use interior mutability.
#[derive(Debug)]
pub struct SegmentHandle {
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,

    /// Stats of every previous sync of this segment, consumed when a flush
    /// writes the compound stats blob.
    history_stats: Mutex<Vec<PrimaryKeyStats>>,
    history_rows: Mutex<i64>,

    syncing: AtomicBool,
}

impl SegmentHandle {
    pub fn new(segment_id: SegmentId, collection_id: CollectionId, partition_id: PartitionId) -> Self {
        Self {
            segment_id,
            collection_id,
            partition_id,
            history_stats: Mutex::new(Vec::new()),
            history_rows: Mutex::new(0),
            syncing: AtomicBool::new(false),
        }
    }

    /// Historical stats plus the row count they cover.
    pub fn historical_stats(&self) -> (Vec<PrimaryKeyStats>, i64) {
        let stats = self.history_stats.lock().unwrap().clone();
        let rows = *self.history_rows.lock().unwrap();
        (stats, rows)
    }

    pub fn record_stats(&self, stats: PrimaryKeyStats, rows: i64) {
        self.history_stats.lock().unwrap().push(stats);
        *self.history_rows.lock().unwrap() += rows;
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::Release);
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }
}

/// The flush engine's window into one virtual channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Collection this channel carries writes for.
    fn collection_id(&self) -> CollectionId;

    /// Whether the channel tracks `segment_id`; with `count_buffered` set,
    /// segments that only exist as unflushed buffers count too.
    fn has_segment(&self, segment_id: SegmentId, count_buffered: bool) -> bool;

    fn collection_and_partition_id(
        &self,
        segment_id: SegmentId,
    ) -> Result<(CollectionId, PartitionId)>;

    /// Schema of the collection as of `ts`.
    async fn collection_schema(
        &self,
        collection_id: CollectionId,
        ts: Timestamp,
    ) -> Result<CollectionSchema>;

    fn get_segment(&self, segment_id: SegmentId) -> Option<Arc<SegmentHandle>>;

    /// Start positions of segments opened since the last report.
    fn list_new_segments_start_positions(&self) -> Vec<SegmentStartPosition>;

    /// Move the named segments out of the "new" set once the coordinator
    /// has acknowledged their start positions.
    fn transfer_new_segments(&self, segment_ids: Vec<SegmentId>);

    fn segment_flushed(&self, segment_id: SegmentId);

    fn remove_segments(&self, segment_ids: &[SegmentId]);

    fn evict_history_insert_buffer(&self, segment_id: SegmentId, position: &Position);

    fn evict_history_delete_buffer(&self, segment_id: SegmentId, position: &Position);

    fn get_segment_statistics_updates(&self, segment_id: SegmentId)
        -> Option<SegmentStatisticsUpdate>;

    /// Timestamp up to which a flush has been requested for the channel.
    fn get_flush_ts(&self) -> Timestamp;

    fn update_single_segment_memory_size(&self, segment_id: SegmentId);
}

//! Wire Types for Coordinator RPCs
//!
//! Request and payload shapes exchanged with the metadata coordinator.
//! These mirror what the coordinator persists: binlog paths per field,
//! channel checkpoints, and the one-shot drop-channel aggregation.

use vectorhouse_core::{Binlog, CollectionId, FieldId, Position, SegmentId};

/// All binlogs of one field accumulated for a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBinlog {
    pub field_id: FieldId,
    pub binlogs: Vec<Binlog>,
}

/// Durability checkpoint of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckPoint {
    pub segment_id: SegmentId,
    pub num_rows: i64,
    pub position: Position,
}

/// First position of a segment newly opened on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStartPosition {
    pub segment_id: SegmentId,
    pub start_position: Position,
}

/// Persist binlog paths for one completed sync of one segment.
#[derive(Debug, Clone, Default)]
pub struct SaveBinlogPathsRequest {
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub channel: String,

    pub field_binlogs: Vec<FieldBinlog>,
    pub field_stats_logs: Vec<FieldBinlog>,
    pub delta_logs: Vec<FieldBinlog>,

    pub checkpoints: Vec<CheckPoint>,
    pub start_positions: Vec<SegmentStartPosition>,

    pub flushed: bool,
    pub dropped: bool,
}

/// Final state of one segment reported when a virtual channel is dropped.
#[derive(Debug, Clone, Default)]
pub struct DropVirtualChannelSegment {
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub field_binlogs: Vec<FieldBinlog>,
    pub field_stats_logs: Vec<FieldBinlog>,
    pub delta_logs: Vec<FieldBinlog>,
    pub start_position: Option<Position>,
    pub checkpoint: Option<Position>,
    pub num_rows: i64,
}

/// Flush-everything-and-release request for one virtual channel.
#[derive(Debug, Clone, Default)]
pub struct DropVirtualChannelRequest {
    pub channel_name: String,
    pub segments: Vec<DropVirtualChannelSegment>,
}

/// Row statistics for one segment as tracked by the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStatisticsUpdate {
    pub segment_id: SegmentId,
    pub num_rows: i64,
}

impl FieldBinlog {
    pub fn new(field_id: FieldId, binlogs: Vec<Binlog>) -> Self {
        Self { field_id, binlogs }
    }

    /// Find the entry for `field_id` in a list, if present.
    pub fn find(list: &mut [FieldBinlog], field_id: FieldId) -> Option<&mut FieldBinlog> {
        list.iter_mut().find(|fb| fb.field_id == field_id)
    }
}

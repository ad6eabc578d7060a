//! Binlog Path Layout
//!
//! Object keys for persisted binlogs. The layout is part of the on-bucket
//! contract and read back by the coordinator and compaction, so it is
//! bit-exact:
//!
//! ```text
//! <root>/insert_log/<coll>/<part>/<seg>/<field>/<log_idx>
//! <root>/stats_log/<coll>/<part>/<seg>/<field>/<log_idx>
//! <root>/stats_log/<coll>/<part>/<seg>/<field>/<COMPOUND>
//! <root>/delta_log/<coll>/<part>/<seg>/<log_idx>
//! ```
//!
//! IDs render base-10; the separator is `/` regardless of platform. The
//! compound sentinel is `i64::MAX` rendered base-10 and marks a stats
//! object that aggregates the segment's whole history rather than one sync.

use vectorhouse_core::{CollectionId, FieldId, PartitionId, SegmentId};

pub const SEGMENT_INSERT_LOG_PATH: &str = "insert_log";
pub const SEGMENT_STATS_LOG_PATH: &str = "stats_log";
pub const SEGMENT_DELTA_LOG_PATH: &str = "delta_log";

/// Log index sentinel of a compound stats object.
pub const COMPOUND_STATS_LOG_IDX: &str = "9223372036854775807";

pub fn insert_log_path(
    root: &str,
    collection_id: CollectionId,
    partition_id: PartitionId,
    segment_id: SegmentId,
    field_id: FieldId,
    log_idx: i64,
) -> String {
    format!(
        "{root}/{SEGMENT_INSERT_LOG_PATH}/{collection_id}/{partition_id}/{segment_id}/{field_id}/{log_idx}"
    )
}

pub fn stats_log_path(
    root: &str,
    collection_id: CollectionId,
    partition_id: PartitionId,
    segment_id: SegmentId,
    field_id: FieldId,
    log_idx: i64,
) -> String {
    format!(
        "{root}/{SEGMENT_STATS_LOG_PATH}/{collection_id}/{partition_id}/{segment_id}/{field_id}/{log_idx}"
    )
}

pub fn compound_stats_log_path(
    root: &str,
    collection_id: CollectionId,
    partition_id: PartitionId,
    segment_id: SegmentId,
    field_id: FieldId,
) -> String {
    format!(
        "{root}/{SEGMENT_STATS_LOG_PATH}/{collection_id}/{partition_id}/{segment_id}/{field_id}/{COMPOUND_STATS_LOG_IDX}"
    )
}

pub fn delta_log_path(
    root: &str,
    collection_id: CollectionId,
    partition_id: PartitionId,
    segment_id: SegmentId,
    log_idx: i64,
) -> String {
    format!("{root}/{SEGMENT_DELTA_LOG_PATH}/{collection_id}/{partition_id}/{segment_id}/{log_idx}")
}

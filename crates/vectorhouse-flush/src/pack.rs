//! Segment Flush Packs
//!
//! A `SegmentFlushPack` is the bundle emitted when one sync task of one
//! segment completes: every binlog path written, the sync position, the
//! flushed/dropped flags, and an error slot. Packs are what the notify
//! callbacks translate into coordinator RPCs.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use vectorhouse_core::{Binlog, FieldId, Position, SegmentId};

use crate::error::Error;

/// Result bundle of one completed sync task.
#[derive(Debug, Clone)]
pub struct SegmentFlushPack {
    pub segment_id: SegmentId,

    pub insert_logs: HashMap<FieldId, Binlog>,
    pub stats_logs: HashMap<FieldId, Binlog>,
    pub delta_logs: Vec<Binlog>,

    pub pos: Position,
    pub flushed: bool,
    pub dropped: bool,

    /// Task execution error. Non-`None` is fatal: the notify callback must
    /// escalate to the supervisor instead of persisting meta.
    pub err: Option<Arc<Error>>,
}

impl SegmentFlushPack {
    pub fn new(segment_id: SegmentId, pos: Position) -> Self {
        Self {
            segment_id,
            insert_logs: HashMap::new(),
            stats_logs: HashMap::new(),
            delta_logs: Vec::new(),
            pos,
            flushed: false,
            dropped: false,
            err: None,
        }
    }
}

/// Callback persisting one pack's meta; invoked exactly once per sync task.
pub type NotifyMetaFn =
    Arc<dyn Fn(SegmentFlushPack) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback delivering every accumulated pack of a dropping channel in one
/// drop-channel RPC; invoked exactly once per manager lifetime.
pub type FlushAndDropFn =
    Arc<dyn Fn(Vec<SegmentFlushPack>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Rewrites a pack after an injection completed, e.g. retargeting binlogs
/// to a compacted segment.
pub type PostInjectionFn = Arc<dyn Fn(&mut SegmentFlushPack) + Send + Sync>;

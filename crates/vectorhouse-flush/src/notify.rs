//! Meta Notification Callbacks
//!
//! The two callbacks wired into the flush manager at construction:
//!
//! - [`flush_notify_fn`]: persists one pack's binlog paths through
//!   `Broker::save_binlog_paths` with retry, then settles the channel
//!   bookkeeping (segment state transitions, buffer eviction, cache
//!   removal).
//! - [`drop_virtual_channel_fn`]: aggregates every accumulated drop pack
//!   into a single `DropVirtualChannel` request.
//!
//! ## Failure policy
//!
//! A pack arriving with an error, or any unclassified error surviving the
//! retries, is fatal for the data node: the callback hands it to the
//! injected [`Supervisor`], whose production implementation aborts the
//! process so the cluster supervisor restarts it. Two classes are
//! downgraded instead of escalated:
//!
//! - `SegmentNotFound` on a non-flushed pack: the segment was compacted
//!   while its stale flush was in the queue; warn and succeed.
//! - `SegmentNotFound` / `ChannelNotFound` (notify) and `ChannelNotFound` /
//!   `MetaFailed` (drop): the coordinator no longer considers this node
//!   the owner; warn and succeed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use vectorhouse_core::{CollectionId, SegmentId};
use vectorhouse_metadata::{
    Broker, Channel, CheckPoint, DropVirtualChannelRequest, DropVirtualChannelSegment,
    FieldBinlog, MetaError, SaveBinlogPathsRequest,
};

use crate::error::Error;
use crate::pack::{FlushAndDropFn, NotifyMetaFn, SegmentFlushPack};
use crate::retry::{retry, RetryConfig};

/// Receives fatal outcomes from the notify callbacks.
///
/// Production uses [`AbortSupervisor`]; tests inject a recording stub so
/// fatal paths are observable instead of terminal.
pub trait Supervisor: Send + Sync {
    fn on_fatal(&self, context: &str, error: &Error);
}

/// Aborts the process so the node supervisor restarts it.
pub struct AbortSupervisor;

impl Supervisor for AbortSupervisor {
    fn on_fatal(&self, context: &str, error: &Error) {
        tracing::error!(context, error = %error, "fatal flush error, data node quits now");
        std::process::abort();
    }
}

/// Segments with a flush currently in flight, shared with the ingestion
/// pipeline so it does not double-trigger flushes.
#[derive(Default)]
pub struct FlushingSegmentCache {
    segments: Mutex<HashSet<SegmentId>>,
}

impl FlushingSegmentCache {
    pub fn insert(&self, segment_id: SegmentId) {
        self.segments.lock().unwrap().insert(segment_id);
    }

    pub fn remove(&self, segment_id: SegmentId) {
        self.segments.lock().unwrap().remove(&segment_id);
    }

    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.segments.lock().unwrap().contains(&segment_id)
    }
}

/// Everything the notify callbacks need about their channel.
pub struct SyncContext {
    pub broker: Arc<dyn Broker>,
    pub channel: Arc<dyn Channel>,
    pub vchannel_name: String,
    pub collection_id: CollectionId,
    pub flushing_cache: Arc<FlushingSegmentCache>,
    pub supervisor: Arc<dyn Supervisor>,
    pub retry: RetryConfig,

    /// Observers (tests, metrics shims) receive each pack after its meta
    /// was persisted.
    pub flush_listener: Option<mpsc::UnboundedSender<SegmentFlushPack>>,
}

/// Build the per-pack notify callback for one channel.
pub fn flush_notify_fn(ctx: Arc<SyncContext>) -> NotifyMetaFn {
    Arc::new(move |pack: SegmentFlushPack| {
        let ctx = ctx.clone();
        Box::pin(async move {
            notify_meta(ctx, pack).await;
        })
    })
}

async fn notify_meta(ctx: Arc<SyncContext>, pack: SegmentFlushPack) {
    let segment_id = pack.segment_id;

    if let Some(err) = &pack.err {
        tracing::error!(
            segment_id,
            vchannel = %ctx.vchannel_name,
            error = %err,
            "flush pack with error, data node quits now"
        );
        ctx.supervisor.on_fatal("flush pack carried an error", err);
        return;
    }

    let field_binlogs: Vec<FieldBinlog> = pack
        .insert_logs
        .iter()
        .map(|(field_id, binlog)| FieldBinlog::new(*field_id, vec![binlog.clone()]))
        .collect();
    let field_stats_logs: Vec<FieldBinlog> = pack
        .stats_logs
        .iter()
        .map(|(field_id, binlog)| FieldBinlog::new(*field_id, vec![binlog.clone()]))
        .collect();
    let delta_logs = vec![FieldBinlog::new(0, pack.delta_logs.clone())];

    let num_rows = ctx
        .channel
        .get_segment_statistics_updates(segment_id)
        .map(|u| u.num_rows)
        .unwrap_or(0);
    let checkpoints = vec![CheckPoint {
        segment_id,
        num_rows,
        position: pack.pos.clone(),
    }];

    let start_positions = ctx.channel.list_new_segments_start_positions();
    let new_segment_ids: Vec<SegmentId> =
        start_positions.iter().map(|p| p.segment_id).collect();

    tracing::info!(
        segment_id,
        collection_id = ctx.collection_id,
        vchannel = %ctx.vchannel_name,
        binlogs = field_binlogs.len(),
        stats_logs = field_stats_logs.len(),
        delta_logs = pack.delta_logs.len(),
        flushed = pack.flushed,
        dropped = pack.dropped,
        "saving binlog paths"
    );

    let req = SaveBinlogPathsRequest {
        segment_id,
        collection_id: ctx.collection_id,
        channel: ctx.vchannel_name.clone(),
        field_binlogs,
        field_stats_logs,
        delta_logs,
        checkpoints,
        start_positions,
        flushed: pack.flushed,
        dropped: pack.dropped,
    };

    let flushed = pack.flushed;
    let result = retry(ctx.retry, || {
        let ctx = ctx.clone();
        let req = req.clone();
        let new_segment_ids = new_segment_ids.clone();
        async move {
            match ctx.broker.save_binlog_paths(req).await {
                Ok(()) => {
                    ctx.channel.transfer_new_segments(new_segment_ids);
                    Ok(())
                }
                // Segment not found during a stale segment flush: it may
                // have been compacted away. Stop retrying and proceed.
                Err(MetaError::SegmentNotFound(id)) if !flushed => {
                    tracing::warn!(segment_id = id, "stale segment not found, could be compacted");
                    Ok(())
                }
                // Meta no longer owns this; skip sync, the channel will drop.
                Err(e @ MetaError::SegmentNotFound(_)) | Err(e @ MetaError::ChannelNotFound(_)) => {
                    tracing::warn!(error = %e, "meta error found, skip sync");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    })
    .await;

    if let Err(e) = result {
        tracing::warn!(segment_id, error = %e, "failed to save binlog paths");
        ctx.supervisor
            .on_fatal("save binlog paths", &Error::Meta(e));
        return;
    }

    if pack.dropped {
        ctx.channel.remove_segments(&[segment_id]);
    } else if pack.flushed {
        ctx.channel.segment_flushed(segment_id);
    }

    ctx.flushing_cache.remove(segment_id);
    ctx.channel.evict_history_insert_buffer(segment_id, &pack.pos);
    ctx.channel.evict_history_delete_buffer(segment_id, &pack.pos);
    if let Some(segment) = ctx.channel.get_segment(segment_id) {
        segment.set_syncing(false);
    }
    ctx.channel.update_single_segment_memory_size(segment_id);

    if let Some(listener) = &ctx.flush_listener {
        let _ = listener.send(pack);
    }

    tracing::info!(segment_id, "successfully saved binlog paths");
}

/// Build the flush-and-drop callback for one channel.
pub fn drop_virtual_channel_fn(ctx: Arc<SyncContext>) -> FlushAndDropFn {
    Arc::new(move |packs: Vec<SegmentFlushPack>| {
        let ctx = ctx.clone();
        Box::pin(async move {
            flush_and_drop(ctx, packs).await;
        })
    })
}

async fn flush_and_drop(ctx: Arc<SyncContext>, packs: Vec<SegmentFlushPack>) {
    let mut segments: HashMap<SegmentId, DropVirtualChannelSegment> = HashMap::new();

    for pack in &packs {
        let segment = segments
            .entry(pack.segment_id)
            .or_insert_with(|| DropVirtualChannelSegment {
                segment_id: pack.segment_id,
                collection_id: ctx.collection_id,
                ..Default::default()
            });

        for (field_id, binlog) in &pack.insert_logs {
            merge_field_binlog(&mut segment.field_binlogs, *field_id, binlog.clone());
        }
        for (field_id, binlog) in &pack.stats_logs {
            merge_field_binlog(&mut segment.field_stats_logs, *field_id, binlog.clone());
        }
        segment
            .delta_logs
            .push(FieldBinlog::new(0, pack.delta_logs.clone()));

        segment.num_rows = ctx
            .channel
            .get_segment_statistics_updates(pack.segment_id)
            .map(|u| u.num_rows)
            .unwrap_or(0);

        let advance = match &segment.checkpoint {
            None => true,
            Some(cp) => pack.pos.timestamp > cp.timestamp,
        };
        if advance {
            segment.checkpoint = Some(pack.pos.clone());
        }
    }

    // Start positions for every new segment, including ones with no pack.
    let start_positions = ctx.channel.list_new_segments_start_positions();
    let new_segment_ids: Vec<SegmentId> =
        start_positions.iter().map(|p| p.segment_id).collect();
    for sp in start_positions {
        let segment = segments
            .entry(sp.segment_id)
            .or_insert_with(|| DropVirtualChannelSegment {
                segment_id: sp.segment_id,
                collection_id: ctx.collection_id,
                ..Default::default()
            });
        segment.start_position = Some(sp.start_position);
    }

    let segment_ids: Vec<SegmentId> = segments.keys().copied().collect();
    let req = DropVirtualChannelRequest {
        channel_name: ctx.vchannel_name.clone(),
        segments: segments.into_values().collect(),
    };

    tracing::info!(
        vchannel = %ctx.vchannel_name,
        segments = req.segments.len(),
        "dropping virtual channel"
    );

    let result = retry(ctx.retry, || {
        let ctx = ctx.clone();
        let req = req.clone();
        let new_segment_ids = new_segment_ids.clone();
        async move {
            match ctx.broker.drop_virtual_channel(req).await {
                Ok(()) => {
                    ctx.channel.transfer_new_segments(new_segment_ids);
                    Ok(())
                }
                // Meta error: this node no longer handles the channel.
                Err(e @ MetaError::ChannelNotFound(_)) | Err(e @ MetaError::MetaFailed(_)) => {
                    tracing::warn!(error = %e, "meta error found, skip sync and start to drop virtual channel");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    })
    .await;

    if let Err(e) = result {
        tracing::warn!(vchannel = %ctx.vchannel_name, error = %e, "failed to drop virtual channel");
        ctx.supervisor
            .on_fatal("drop virtual channel", &Error::Meta(e));
        return;
    }

    for segment_id in segment_ids {
        ctx.channel.segment_flushed(segment_id);
        ctx.flushing_cache.remove(segment_id);
    }

    tracing::info!(vchannel = %ctx.vchannel_name, "virtual channel dropped");
}

fn merge_field_binlog(
    list: &mut Vec<FieldBinlog>,
    field_id: i64,
    binlog: vectorhouse_core::Binlog,
) {
    match FieldBinlog::find(list, field_id) {
        Some(existing) => existing.binlogs.push(binlog),
        None => list.push(FieldBinlog::new(field_id, vec![binlog])),
    }
}

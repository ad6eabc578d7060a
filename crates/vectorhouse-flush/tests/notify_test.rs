//! Notify Callback Tests
//!
//! Behavior of the meta notify and flush-and-drop callbacks: retry
//! classification, warn-and-succeed downgrades, fatal escalation, and the
//! post-success channel bookkeeping.

mod common;

use std::sync::Arc;

use tokio::sync::mpsc;

use common::*;
use vectorhouse_core::Binlog;
use vectorhouse_metadata::MetaError;
use vectorhouse_flush::{
    drop_virtual_channel_fn, flush_notify_fn, FlushingSegmentCache, RetryConfig, SegmentFlushPack,
    SyncContext,
};

struct NotifyHarness {
    ctx: Arc<SyncContext>,
    broker: Arc<MockBroker>,
    channel: Arc<MockChannel>,
    supervisor: Arc<RecordingSupervisor>,
    cache: Arc<FlushingSegmentCache>,
    listener: mpsc::UnboundedReceiver<SegmentFlushPack>,
}

fn build_notify_harness() -> NotifyHarness {
    let broker = MockBroker::new();
    let channel = MockChannel::new(1);
    let supervisor = RecordingSupervisor::new();
    let cache = Arc::new(FlushingSegmentCache::default());
    let (listener_tx, listener) = mpsc::unbounded_channel();

    let ctx = Arc::new(SyncContext {
        broker: broker.clone(),
        channel: channel.clone(),
        vchannel_name: "vchan-1".to_string(),
        collection_id: 1,
        flushing_cache: cache.clone(),
        supervisor: supervisor.clone(),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        flush_listener: Some(listener_tx),
    });

    NotifyHarness {
        ctx,
        broker,
        channel,
        supervisor,
        cache,
        listener,
    }
}

fn binlog(path: &str) -> Binlog {
    Binlog {
        entries_num: 3,
        timestamp_from: 1,
        timestamp_to: 3,
        log_path: path.to_string(),
        log_size: 64,
    }
}

fn flushed_pack(segment_id: i64, ts: u64) -> SegmentFlushPack {
    let mut pack = SegmentFlushPack::new(segment_id, pos("vchan-1", 0x01, ts));
    pack.insert_logs
        .insert(PK_FIELD, binlog("files/insert_log/1/2/1/100/9000"));
    pack.flushed = true;
    pack
}

#[tokio::test]
async fn test_notify_success_settles_channel_state() {
    let mut h = build_notify_harness();
    h.channel.add_segment(1, 2);
    h.channel.set_num_rows(1, 3);
    h.channel.add_new_segment_position(5, pos("vchan-1", 0x09, 42));
    h.cache.insert(1);

    let notify = flush_notify_fn(h.ctx.clone());
    notify(flushed_pack(1, 100)).await;

    let saved = h.broker.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    let req = &saved[0];
    assert_eq!(req.segment_id, 1);
    assert_eq!(req.channel, "vchan-1");
    assert_eq!(req.checkpoints.len(), 1);
    assert_eq!(req.checkpoints[0].num_rows, 3);
    assert_eq!(req.checkpoints[0].position.timestamp, 100);
    assert_eq!(req.start_positions.len(), 1);
    drop(saved);

    assert_eq!(*h.channel.transferred.lock().unwrap(), vec![5]);
    assert_eq!(*h.channel.flushed_segments.lock().unwrap(), vec![1]);
    assert_eq!(*h.channel.evicted_insert.lock().unwrap(), vec![(1, 100)]);
    assert_eq!(*h.channel.evicted_delete.lock().unwrap(), vec![(1, 100)]);
    assert!(!h.cache.contains(1));
    assert_eq!(h.supervisor.fatal_count(), 0);

    let observed = h.listener.recv().await.unwrap();
    assert_eq!(observed.segment_id, 1);
}

#[tokio::test]
async fn test_notify_dropped_pack_removes_segment() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);

    let mut pack = flushed_pack(1, 100);
    pack.flushed = false;
    pack.dropped = true;

    flush_notify_fn(h.ctx.clone())(pack).await;

    assert_eq!(*h.channel.removed_segments.lock().unwrap(), vec![1]);
    assert!(h.channel.flushed_segments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_segment_not_found_downgrades() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    h.broker.push_save_error(MetaError::SegmentNotFound(1));

    let mut pack = flushed_pack(1, 100);
    pack.flushed = false;

    flush_notify_fn(h.ctx.clone())(pack).await;

    // One attempt, downgraded to success; no retry, no fatal.
    assert_eq!(h.broker.saved_count(), 0);
    assert_eq!(h.supervisor.fatal_count(), 0);
}

#[tokio::test]
async fn test_channel_not_found_downgrades_for_flushed_pack() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    h.broker
        .push_save_error(MetaError::ChannelNotFound("vchan-1".to_string()));

    flush_notify_fn(h.ctx.clone())(flushed_pack(1, 100)).await;

    assert_eq!(h.broker.saved_count(), 0);
    assert_eq!(h.supervisor.fatal_count(), 0);
}

#[tokio::test]
async fn test_transport_errors_retry_then_succeed() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    h.broker.push_save_error(MetaError::Transport("reset".into()));
    h.broker.push_save_error(MetaError::Transport("reset".into()));

    flush_notify_fn(h.ctx.clone())(flushed_pack(1, 100)).await;

    assert_eq!(h.broker.saved_count(), 1);
    assert_eq!(h.supervisor.fatal_count(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_escalate_to_supervisor() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    for _ in 0..3 {
        h.broker.push_save_error(MetaError::Transport("down".into()));
    }

    flush_notify_fn(h.ctx.clone())(flushed_pack(1, 100)).await;

    assert_eq!(h.broker.saved_count(), 0);
    assert_eq!(h.supervisor.fatal_count(), 1);
}

#[tokio::test]
async fn test_pack_error_is_fatal_without_rpc() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);

    let mut pack = flushed_pack(1, 100);
    pack.err = Some(Arc::new(vectorhouse_flush::Error::NoPrimaryKey));

    flush_notify_fn(h.ctx.clone())(pack).await;

    assert_eq!(h.broker.saved_count(), 0);
    assert_eq!(h.supervisor.fatal_count(), 1);
}

// ---------------------------------------------------------------
// flush-and-drop aggregation
// ---------------------------------------------------------------

#[tokio::test]
async fn test_drop_aggregates_packs_per_segment() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    h.channel.set_num_rows(1, 40);

    let mut first = SegmentFlushPack::new(1, pos("vchan-1", 0x01, 100));
    first
        .insert_logs
        .insert(PK_FIELD, binlog("files/insert_log/1/2/1/100/9000"));
    let mut second = SegmentFlushPack::new(1, pos("vchan-1", 0x02, 300));
    second
        .insert_logs
        .insert(PK_FIELD, binlog("files/insert_log/1/2/1/100/9005"));

    drop_virtual_channel_fn(h.ctx.clone())(vec![first, second]).await;

    let requests = h.broker.drop_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let segment = &requests[0].segments[0];
    assert_eq!(segment.segment_id, 1);
    assert_eq!(segment.num_rows, 40);
    // Field binlogs of both packs concatenate under one field entry.
    assert_eq!(segment.field_binlogs.len(), 1);
    assert_eq!(segment.field_binlogs[0].binlogs.len(), 2);
    // Checkpoint is the max-timestamp position.
    assert_eq!(segment.checkpoint.as_ref().unwrap().timestamp, 300);
    drop(requests);

    assert_eq!(*h.channel.flushed_segments.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_drop_meta_failed_treated_as_success() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    h.broker
        .drop_errors
        .lock()
        .unwrap()
        .push_back(MetaError::MetaFailed("channel moved".into()));

    drop_virtual_channel_fn(h.ctx.clone())(vec![SegmentFlushPack::new(
        1,
        pos("vchan-1", 0x01, 100),
    )])
    .await;

    assert!(h.broker.drop_requests.lock().unwrap().is_empty());
    assert_eq!(h.supervisor.fatal_count(), 0);
    // The channel bookkeeping still ran.
    assert_eq!(*h.channel.flushed_segments.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_drop_unclassified_error_is_fatal() {
    let h = build_notify_harness();
    h.channel.add_segment(1, 2);
    for _ in 0..3 {
        h.broker
            .drop_errors
            .lock()
            .unwrap()
            .push_back(MetaError::Transport("down".into()));
    }

    drop_virtual_channel_fn(h.ctx.clone())(vec![SegmentFlushPack::new(
        1,
        pos("vchan-1", 0x01, 100),
    )])
    .await;

    assert_eq!(h.supervisor.fatal_count(), 1);
}

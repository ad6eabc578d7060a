//! Rendezvous Flush Manager
//!
//! Top-level coordinator of the flush engine. It owns one ordered flush
//! queue per segment and makes sure the insert and delete halves of every
//! sync point rendezvous before their meta notification fires.
//!
//! ## Write flow
//!
//! ```text
//! flush_buffer_data(buffer, seg, pos)
//!     ↓
//! serialize fields + pk stats     ← InsertCodec
//!     ↓
//! allocate log indices            ← Allocator
//!     ↓
//! enqueue insert half             ← per-segment OrderFlushQueue
//!
//! flush_del_data(delta, seg, pos)
//!     ↓
//! serialize deletions             ← DeleteCodec
//!     ↓
//! enqueue delete half             ← same queue, same position
//!
//! both halves present → runner writes blobs → notify meta (in order)
//! ```
//!
//! ## Dropping mode
//!
//! `start_dropping` flips the manager into its terminal mode: subsequent
//! sync halves execute independently and accumulate their packs instead of
//! notifying. Once the caller signals `notify_all_flushed`, a background
//! coordinator waits for every normal-mode queue to drain, applies recorded
//! post-injection rewrites, and delivers all accumulated packs through the
//! flush-and-drop callback exactly once.
//!
//! ## Cleanup
//!
//! A periodic reaper removes queues with no running tasks. Admission paths
//! hold a shared clean lock, the reaper holds it exclusively; that fence is
//! what lets removal proceed without racing admissions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use vectorhouse_core::{
    Binlog, Blob, BufferData, CollectionId, CollectionSchema, DeleteBuffer, DeleteCodec, FieldId,
    InsertCodec, PartitionId, Position, PrimaryKeyStats, SegmentId,
};
use vectorhouse_metadata::{Allocator, Channel};
use vectorhouse_observability::FlushMetrics;

use crate::chunk_manager::ChunkManager;
use crate::config::FlushConfig;
use crate::error::{Error, Result};
use crate::injection::TaskInjection;
use crate::pack::{FlushAndDropFn, NotifyMetaFn, SegmentFlushPack};
use crate::paths;
use crate::queue::OrderFlushQueue;
use crate::signal::WaitGroup;
use crate::task::{delta_binlogs, FlushDeleteTask, FlushInsertTask, WriteDeleteTask, WriteInsertTask};

struct DropHandler {
    flush_and_drop: FlushAndDropFn,
    packs: Mutex<Vec<SegmentFlushPack>>,
    all_flushed: watch::Sender<bool>,
    drop_wg: WaitGroup,
}

pub struct RendezvousFlushManager {
    allocator: Arc<dyn Allocator>,
    chunk_manager: Arc<ChunkManager>,
    channel: Arc<dyn Channel>,
    notify_fn: NotifyMetaFn,
    config: FlushConfig,
    metrics: FlushMetrics,

    /// segment ID → ordered flush queue
    dispatcher: RwLock<HashMap<SegmentId, Arc<OrderFlushQueue>>>,

    dropping: AtomicBool,
    drop_handler: DropHandler,

    /// Admission paths and the drop finalizer hold this shared; the
    /// reaper holds it exclusive.
    clean_lock: tokio::sync::RwLock<()>,

    shutdown: watch::Sender<bool>,
    clean_task: Mutex<Option<JoinHandle<()>>>,
}

impl RendezvousFlushManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        allocator: Arc<dyn Allocator>,
        chunk_manager: Arc<ChunkManager>,
        channel: Arc<dyn Channel>,
        notify_fn: NotifyMetaFn,
        flush_and_drop: FlushAndDropFn,
        config: FlushConfig,
        metrics: FlushMetrics,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let (all_flushed, _) = watch::channel(false);
        Arc::new(Self {
            allocator,
            chunk_manager,
            channel,
            notify_fn,
            config,
            metrics,
            dispatcher: RwLock::new(HashMap::new()),
            dropping: AtomicBool::new(false),
            drop_handler: DropHandler {
                flush_and_drop,
                packs: Mutex::new(Vec::new()),
                all_flushed,
                drop_wg: WaitGroup::new(),
            },
            clean_lock: tokio::sync::RwLock::new(()),
            shutdown,
            clean_task: Mutex::new(None),
        })
    }

    /// Start the idle-queue reaper.
    pub fn start(self: &Arc<Self>) {
        let manager = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.clean_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow_and_update() {
                            tracing::info!("flush manager quit clean loop");
                            return;
                        }
                    }
                    _ = ticker.tick() => manager.try_remove_flush_queues().await,
                }
            }
        });
        *self.clean_task.lock().unwrap() = Some(handle);
    }

    /// Serialize and admit the insert half of a sync point.
    ///
    /// Returns the primary-key stats generated from the buffer, which the
    /// caller records into the segment's history.
    pub async fn flush_buffer_data(
        &self,
        data: Option<BufferData>,
        segment_id: SegmentId,
        flushed: bool,
        dropped: bool,
        pos: Position,
    ) -> Result<Option<PrimaryKeyStats>> {
        let encode_started = Instant::now();

        let (collection_id, partition_id, schema) = self.segment_meta(segment_id, &pos).await?;
        let codec = InsertCodec::new(collection_id, schema);

        let (binlog_blobs, field_memory_sizes) =
            serialize_binlog(partition_id, segment_id, data.as_ref(), &codec)?;
        let (stats_blob, stats) =
            self.serialize_pk_stats_log(segment_id, flushed, data.as_ref(), &codec)?;

        // One allocation covers every field blob, plus the stats blob when
        // it is indexed (non-flushed). The compound stats object has a
        // fixed sentinel index and consumes no ID.
        let alloc_count = binlog_blobs.len() + usize::from(!flushed && stats_blob.is_some());
        let mut log_idx = if alloc_count > 0 {
            self.allocator.alloc(alloc_count as u32).await?
        } else {
            0
        };

        let (entries_num, ts_from, ts_to) = data
            .as_ref()
            .map(|d| (d.size, d.ts_from, d.ts_to))
            .unwrap_or((0, 0, 0));

        let root = self.chunk_manager.root_path();
        let mut kvs: HashMap<String, Bytes> = HashMap::new();
        let mut insert_logs: HashMap<FieldId, Binlog> = HashMap::new();
        let mut stats_logs: HashMap<FieldId, Binlog> = HashMap::new();

        for blob in binlog_blobs {
            let field_id = parse_field_id(&blob)?;
            let key = paths::insert_log_path(
                root,
                collection_id,
                partition_id,
                segment_id,
                field_id,
                log_idx,
            );
            insert_logs.insert(
                field_id,
                Binlog {
                    entries_num,
                    timestamp_from: ts_from,
                    timestamp_to: ts_to,
                    log_path: key.clone(),
                    log_size: field_memory_sizes.get(&field_id).copied().unwrap_or(0) as i64,
                },
            );
            kvs.insert(key, blob.value);
            log_idx += 1;
        }

        if let Some(blob) = stats_blob {
            let field_id = parse_field_id(&blob)?;
            let key = if flushed {
                paths::compound_stats_log_path(
                    root,
                    collection_id,
                    partition_id,
                    segment_id,
                    field_id,
                )
            } else {
                paths::stats_log_path(
                    root,
                    collection_id,
                    partition_id,
                    segment_id,
                    field_id,
                    log_idx,
                )
            };
            stats_logs.insert(
                field_id,
                Binlog {
                    entries_num: 0,
                    timestamp_from: 0,
                    timestamp_to: 0,
                    log_path: key.clone(),
                    log_size: blob.value.len() as i64,
                },
            );
            kvs.insert(key, blob.value);
        }

        let task = Arc::new(WriteInsertTask::new(
            self.chunk_manager.clone(),
            kvs,
            self.metrics.clone(),
        ));
        self.handle_insert_task(segment_id, task, insert_logs, stats_logs, flushed, dropped, pos)
            .await;

        self.metrics
            .encode_latency_seconds
            .observe(encode_started.elapsed().as_secs_f64());
        Ok(stats)
    }

    /// Serialize and admit the delete half of a sync point. A `None` or
    /// empty buffer is the synthetic delete signal that completes the
    /// rendezvous without writing anything.
    pub async fn flush_del_data(
        &self,
        data: Option<DeleteBuffer>,
        segment_id: SegmentId,
        pos: Position,
    ) -> Result<()> {
        let Some(mut data) = data.filter(|d| !d.is_empty()) else {
            let task = Arc::new(WriteDeleteTask::noop(
                self.chunk_manager.clone(),
                self.metrics.clone(),
            ));
            self.handle_delete_task(segment_id, task, None, pos).await;
            return Ok(());
        };

        let (collection_id, partition_id) = self.channel.collection_and_partition_id(segment_id)?;
        let blob = DeleteCodec::new().serialize(collection_id, partition_id, segment_id, &data)?;

        let log_id = self.allocator.alloc_one().await?;
        let blob_path = paths::delta_log_path(
            self.chunk_manager.root_path(),
            collection_id,
            partition_id,
            segment_id,
            log_id,
        );
        data.log_size = blob.value.len() as i64;
        data.log_path = Some(blob_path.clone());
        tracing::info!(segment_id, path = %blob_path, "delete blob path");

        let kvs = HashMap::from([(blob_path, blob.value)]);
        let task = Arc::new(WriteDeleteTask::new(
            self.chunk_manager.clone(),
            kvs,
            self.metrics.clone(),
        ));
        self.handle_delete_task(segment_id, task, Some(data), pos)
            .await;
        Ok(())
    }

    /// Queue an injection barrier onto each named segment's queue.
    pub async fn inject_flush(&self, injection: Arc<TaskInjection>, segments: &[SegmentId]) {
        let waiter = injection.clone();
        tokio::spawn(async move {
            waiter.resolved().await;
            tracing::debug!("task injection resolved");
        });

        let _clean = self.clean_lock.read().await;
        for segment_id in segments {
            self.get_flush_queue(*segment_id).inject(injection.clone()).await;
        }
    }

    /// True once the aggregate number of admitted sync tasks reaches the
    /// configured cap; callers throttle on this.
    pub fn is_full(&self) -> bool {
        let queues = self.dispatcher.read().unwrap();
        let num: usize = queues.values().map(|q| q.working_len()).sum();
        num >= self.config.max_parallel_sync_task_num
    }

    /// Number of segments with a live flush queue.
    pub fn segment_num(&self) -> usize {
        self.dispatcher.read().unwrap().len()
    }

    /// Switch to dropping mode and arm the finalizer (see module docs).
    pub fn start_dropping(self: &Arc<Self>) {
        self.dropping.store(true, Ordering::Release);
        let manager = self.clone();
        tokio::spawn(async move {
            // All wanted flush tasks are in the manager once this fires.
            let mut all_flushed = manager.drop_handler.all_flushed.subscribe();
            let _ = all_flushed.wait_for(|flushed| *flushed).await;

            // Wait out every normal-mode queue, then every drop-mode task.
            manager.wait_for_all_flush_queues().await;
            manager.drop_handler.drop_wg.wait().await;

            {
                let _clean = manager.clean_lock.read().await;
                let mut packs = manager.drop_handler.packs.lock().unwrap();
                for pack in packs.iter_mut() {
                    let queue = manager.get_flush_queue(pack.segment_id);
                    queue.apply_post_injection(pack);
                }
            }

            let packs = std::mem::take(&mut *manager.drop_handler.packs.lock().unwrap());
            tracing::info!(packs = packs.len(), "delivering drop packs");
            (manager.drop_handler.flush_and_drop)(packs).await;
        });
    }

    /// Signal that no further flush task will arrive for drop mode.
    pub fn notify_all_flushed(&self) {
        self.drop_handler.all_flushed.send_replace(true);
    }

    /// Drain all queues and stop the reaper.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        {
            let queues: Vec<_> = self.dispatcher.read().unwrap().values().cloned().collect();
            for queue in queues {
                queue.force_drain();
            }
        }
        self.wait_for_all_flush_queues().await;

        let handle = self.clean_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!(
            collection_id = self.channel.collection_id(),
            "flush manager closed"
        );
    }

    /// Get or create the flush queue for a segment.
    fn get_flush_queue(&self, segment_id: SegmentId) -> Arc<OrderFlushQueue> {
        {
            let queues = self.dispatcher.read().unwrap();
            if let Some(queue) = queues.get(&segment_id) {
                return queue.clone();
            }
        }

        let mut queues = self.dispatcher.write().unwrap();
        if let Some(queue) = queues.get(&segment_id) {
            return queue.clone();
        }
        let queue = OrderFlushQueue::new(segment_id, self.notify_fn.clone());
        queues.insert(segment_id, queue.clone());
        queue
    }

    async fn handle_insert_task(
        &self,
        segment_id: SegmentId,
        task: Arc<dyn FlushInsertTask>,
        insert_logs: HashMap<FieldId, Binlog>,
        stats_logs: HashMap<FieldId, Binlog>,
        flushed: bool,
        dropped: bool,
        pos: Position,
    ) {
        tracing::info!(
            segment_id,
            flushed,
            dropped,
            timestamp = pos.timestamp,
            "handling insert task"
        );

        if self.dropping.load(Ordering::Acquire) {
            // Insert and delete halves are not bound in drop mode; execute
            // now and accumulate the pack.
            let _wg = self.drop_handler.drop_wg.enter();
            let err = task.flush_insert_data().await.err().map(Arc::new);
            let mut pack = SegmentFlushPack::new(segment_id, pos);
            pack.insert_logs = insert_logs;
            pack.stats_logs = stats_logs;
            pack.flushed = flushed;
            pack.dropped = dropped;
            pack.err = err;
            self.drop_handler.packs.lock().unwrap().push(pack);
            return;
        }

        let _clean = self.clean_lock.read().await;
        self.get_flush_queue(segment_id)
            .enqueue_insert(task, insert_logs, stats_logs, flushed, dropped, pos);
    }

    async fn handle_delete_task(
        &self,
        segment_id: SegmentId,
        task: Arc<dyn FlushDeleteTask>,
        delta: Option<DeleteBuffer>,
        pos: Position,
    ) {
        tracing::info!(segment_id, "handling delete task");

        if self.dropping.load(Ordering::Acquire) {
            let clean = self.clean_lock.read().await;
            let queue = self.get_flush_queue(segment_id);
            if queue.contains_task(&pos) {
                // The paired insert was admitted before the mode flip, so
                // this delete joins it in normal mode. Enqueue under the
                // same clean guard so the reaper cannot interleave.
                queue.enqueue_delete(task, delta, pos);
                return;
            }
            drop(clean);

            let _wg = self.drop_handler.drop_wg.enter();
            let err = task.flush_delete_data().await.err().map(Arc::new);
            let mut pack = SegmentFlushPack::new(segment_id, pos);
            pack.delta_logs = delta_binlogs(delta.as_ref());
            pack.err = err;
            self.drop_handler.packs.lock().unwrap().push(pack);
            return;
        }

        let _clean = self.clean_lock.read().await;
        self.get_flush_queue(segment_id).enqueue_delete(task, delta, pos);
    }

    /// Fetch identity and schema for a segment about to flush.
    async fn segment_meta(
        &self,
        segment_id: SegmentId,
        pos: &Position,
    ) -> Result<(CollectionId, PartitionId, CollectionSchema)> {
        if !self.channel.has_segment(segment_id, true) {
            return Err(Error::SegmentNotFound(segment_id));
        }
        let (collection_id, partition_id) =
            self.channel.collection_and_partition_id(segment_id)?;
        let schema = self
            .channel
            .collection_schema(collection_id, pos.timestamp)
            .await?;
        Ok((collection_id, partition_id, schema))
    }

    /// Build the stats blob for this sync.
    ///
    /// Flushed syncs produce the compound form: the segment's historical
    /// stats plus the new ones, under the sentinel log index. Unflushed
    /// syncs serialize only the new stats, and only when the buffer
    /// produced at least one row.
    fn serialize_pk_stats_log(
        &self,
        segment_id: SegmentId,
        flushed: bool,
        data: Option<&BufferData>,
        codec: &InsertCodec,
    ) -> Result<(Option<Blob>, Option<PrimaryKeyStats>)> {
        let pk_field = codec
            .schema()
            .primary_key_field()
            .ok_or(Error::NoPrimaryKey)?
            .clone();

        let mut stats = None;
        let mut row_num = 0i64;
        if let Some(data) = data {
            if let Some(column) = data.fields.get(&pk_field.field_id) {
                row_num = column.row_count() as i64;
                if row_num > 0 {
                    let mut new_stats =
                        PrimaryKeyStats::new(pk_field.field_id, pk_field.data_type, row_num);
                    new_stats.update_by_column(column);
                    stats = Some(new_stats);
                }
            }
        }

        if flushed {
            let segment = self
                .channel
                .get_segment(segment_id)
                .ok_or(Error::SegmentNotFound(segment_id))?;
            let (mut stats_list, old_rows) = segment.historical_stats();
            if let Some(new_stats) = &stats {
                stats_list.push(new_stats.clone());
            }
            let blob = codec.serialize_pk_stats_list(&stats_list, old_rows + row_num)?;
            return Ok((Some(blob), stats));
        }

        let Some(new_stats) = stats else {
            return Ok((None, None));
        };
        let blob = codec.serialize_pk_stats(&new_stats)?;
        Ok((Some(blob), Some(new_stats)))
    }

    /// Remove queues with no running tasks.
    async fn try_remove_flush_queues(&self) {
        let _clean = self.clean_lock.write().await;
        let mut queues = self.dispatcher.write().unwrap();
        queues.retain(|_, queue| !queue.check_empty());
    }

    /// Wait until every queue's current tail has completed.
    async fn wait_for_all_flush_queues(&self) {
        let tails: Vec<_> = self
            .dispatcher
            .read()
            .unwrap()
            .values()
            .map(|queue| queue.tail())
            .collect();
        futures::future::join_all(tails.iter().map(|tail| tail.wait())).await;
    }
}

fn serialize_binlog(
    partition_id: PartitionId,
    segment_id: SegmentId,
    data: Option<&BufferData>,
    codec: &InsertCodec,
) -> Result<(Vec<Blob>, HashMap<FieldId, usize>)> {
    let Some(data) = data else {
        return Ok((Vec::new(), HashMap::new()));
    };
    if data.fields.is_empty() {
        return Ok((Vec::new(), HashMap::new()));
    }

    let field_memory_sizes = data.field_memory_sizes();
    let blobs = codec.serialize(partition_id, segment_id, data)?;
    Ok((blobs, field_memory_sizes))
}

fn parse_field_id(blob: &Blob) -> Result<FieldId> {
    blob.key
        .parse::<FieldId>()
        .map_err(|_| Error::InvalidBlobKey(blob.key.clone()))
}

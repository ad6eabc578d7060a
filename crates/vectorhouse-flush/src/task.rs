//! Flush Tasks and the Sync Task Runner
//!
//! ## Write tasks
//!
//! `FlushInsertTask` / `FlushDeleteTask` are the storage halves of one sync
//! step: given already-serialized blobs keyed by object path, persist them.
//! The standard implementations write through the [`ChunkManager`], insert
//! blobs with every key dispatched concurrently.
//!
//! ## FlushTaskRunner
//!
//! One runner exists per `(segment, position)` sync point and walks
//! `Pending → InsertReady → Running → Done`:
//!
//! - Two separate callers supply the insert and delete halves; a countdown
//!   latch of two holds the runner in Pending/InsertReady until both have
//!   arrived.
//! - Running begins only after the predecessor task's completion handle
//!   fires, which is what serializes meta notifications per segment.
//! - The runner writes both halves sequentially, folds any failure into
//!   the pack's error slot, consumes at most one pending injection at the
//!   task boundary, then notifies meta exactly once and completes its own
//!   handle, on every path including failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;

use vectorhouse_core::{Binlog, DeleteBuffer, FieldId, Position, SegmentId};
use vectorhouse_observability::{labels, FlushMetrics};

use crate::chunk_manager::ChunkManager;
use crate::error::{Error, Result};
use crate::pack::SegmentFlushPack;
use crate::queue::OrderFlushQueue;
use crate::signal::{CompletionHandle, CompletionSignal, CountdownLatch};

/// Storage half of a sync step that persists insert and stats blobs.
#[async_trait]
pub trait FlushInsertTask: Send + Sync {
    async fn flush_insert_data(&self) -> Result<()>;
}

/// Storage half of a sync step that persists delta blobs.
#[async_trait]
pub trait FlushDeleteTask: Send + Sync {
    async fn flush_delete_data(&self) -> Result<()>;
}

/// Writes insert and stats blobs, all keys concurrently.
pub struct WriteInsertTask {
    chunk_manager: Arc<ChunkManager>,
    data: HashMap<String, Bytes>,
    metrics: FlushMetrics,
}

impl WriteInsertTask {
    pub fn new(
        chunk_manager: Arc<ChunkManager>,
        data: HashMap<String, Bytes>,
        metrics: FlushMetrics,
    ) -> Self {
        Self {
            chunk_manager,
            data,
            metrics,
        }
    }
}

#[async_trait]
impl FlushInsertTask for WriteInsertTask {
    async fn flush_insert_data(&self) -> Result<()> {
        if self.data.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let total_bytes: usize = self.data.values().map(|v| v.len()).sum();
        self.chunk_manager.multi_write(self.data.clone()).await?;

        self.metrics
            .save_latency_seconds
            .with_label_values(&[labels::KIND_INSERT])
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .flushed_bytes_total
            .with_label_values(&[labels::KIND_INSERT])
            .inc_by(total_bytes as u64);
        Ok(())
    }
}

/// Writes delta blobs. With no data this is the empty delete signal.
pub struct WriteDeleteTask {
    chunk_manager: Arc<ChunkManager>,
    data: HashMap<String, Bytes>,
    metrics: FlushMetrics,
}

impl WriteDeleteTask {
    pub fn new(
        chunk_manager: Arc<ChunkManager>,
        data: HashMap<String, Bytes>,
        metrics: FlushMetrics,
    ) -> Self {
        Self {
            chunk_manager,
            data,
            metrics,
        }
    }

    pub fn noop(chunk_manager: Arc<ChunkManager>, metrics: FlushMetrics) -> Self {
        Self::new(chunk_manager, HashMap::new(), metrics)
    }
}

#[async_trait]
impl FlushDeleteTask for WriteDeleteTask {
    async fn flush_delete_data(&self) -> Result<()> {
        if self.data.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let total_bytes: usize = self.data.values().map(|v| v.len()).sum();
        self.chunk_manager.multi_write(self.data.clone()).await?;

        self.metrics
            .save_latency_seconds
            .with_label_values(&[labels::KIND_DELETE])
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .flushed_bytes_total
            .with_label_values(&[labels::KIND_DELETE])
            .inc_by(total_bytes as u64);
        Ok(())
    }
}

/// Delta binlog descriptors for a serialized delete buffer, empty when the
/// buffer never produced a blob.
pub(crate) fn delta_binlogs(delta: Option<&DeleteBuffer>) -> Vec<Binlog> {
    if let Some(buf) = delta {
        if let Some(log_path) = &buf.log_path {
            if buf.entries_num() > 0 {
                return vec![Binlog {
                    entries_num: buf.entries_num(),
                    timestamp_from: buf.ts_from,
                    timestamp_to: buf.ts_to,
                    log_path: log_path.clone(),
                    log_size: buf.log_size,
                }];
            }
        }
    }
    Vec::new()
}

/// Rendezvous point of the insert and delete halves of one sync step.
pub(crate) struct FlushTaskRunner {
    segment_id: SegmentId,
    pos: Position,
    latch: CountdownLatch,
    parts: Mutex<RunnerParts>,
}

#[derive(Default)]
struct RunnerParts {
    insert_task: Option<Arc<dyn FlushInsertTask>>,
    delete_task: Option<Arc<dyn FlushDeleteTask>>,
    insert_logs: HashMap<FieldId, Binlog>,
    stats_logs: HashMap<FieldId, Binlog>,
    delta: Option<DeleteBuffer>,
    flushed: bool,
    dropped: bool,
    insert_supplied: bool,
    delete_supplied: bool,
}

impl FlushTaskRunner {
    pub(crate) fn new(segment_id: SegmentId, pos: Position) -> Self {
        Self {
            segment_id,
            pos,
            latch: CountdownLatch::new(2),
            parts: Mutex::new(RunnerParts::default()),
        }
    }

    /// Supply the insert half. Repeated calls are ignored.
    pub(crate) fn run_flush_insert(
        &self,
        task: Arc<dyn FlushInsertTask>,
        insert_logs: HashMap<FieldId, Binlog>,
        stats_logs: HashMap<FieldId, Binlog>,
        flushed: bool,
        dropped: bool,
    ) {
        {
            let mut parts = self.parts.lock().unwrap();
            if parts.insert_supplied {
                return;
            }
            parts.insert_supplied = true;
            parts.insert_task = Some(task);
            parts.insert_logs = insert_logs;
            parts.stats_logs = stats_logs;
            parts.flushed = flushed;
            parts.dropped = dropped;
        }
        self.latch.count_down();
    }

    /// Supply the delete half. Repeated calls are ignored.
    pub(crate) fn run_flush_del(
        &self,
        task: Arc<dyn FlushDeleteTask>,
        delta: Option<DeleteBuffer>,
    ) {
        {
            let mut parts = self.parts.lock().unwrap();
            if parts.delete_supplied {
                return;
            }
            parts.delete_supplied = true;
            parts.delete_task = Some(task);
            parts.delta = delta;
        }
        self.latch.count_down();
    }

    fn build_pack(&self, err: Option<Error>) -> SegmentFlushPack {
        let parts = self.parts.lock().unwrap();
        let mut pack = SegmentFlushPack::new(self.segment_id, self.pos.clone());
        pack.insert_logs = parts.insert_logs.clone();
        pack.stats_logs = parts.stats_logs.clone();
        pack.delta_logs = delta_binlogs(parts.delta.as_ref());
        pack.flushed = parts.flushed;
        pack.dropped = parts.dropped;
        pack.err = err.map(Arc::new);
        pack
    }

    /// Drive the runner to completion. Spawned once when the runner is
    /// admitted to its queue.
    pub(crate) async fn run(
        self: Arc<Self>,
        queue: Arc<OrderFlushQueue>,
        start: CompletionHandle,
        finish: CompletionSignal,
    ) {
        // Rendezvous: both halves must have arrived.
        self.latch.wait().await;
        // Order: the predecessor task must have completed.
        start.wait().await;

        let (insert_task, delete_task) = {
            let mut parts = self.parts.lock().unwrap();
            (parts.insert_task.take(), parts.delete_task.take())
        };

        let mut err: Option<Error> = None;
        if let Some(task) = insert_task {
            if let Err(e) = task.flush_insert_data().await {
                tracing::warn!(segment_id = self.segment_id, error = %e, "failed to flush insert data");
                err = Some(e);
            }
        }
        if let Some(task) = delete_task {
            if let Err(e) = task.flush_delete_data().await {
                tracing::warn!(segment_id = self.segment_id, error = %e, "failed to flush delete data");
                if err.is_none() {
                    err = Some(e);
                }
            }
        }

        let mut pack = self.build_pack(err);

        let mut post_injection = None;
        if let Some(injection) = queue.try_take_injection() {
            injection.inject_one();
            if injection.inject_over().await {
                post_injection = injection.post_injection();
            }
        }

        queue.post_task(Some(&mut pack), post_injection, true);
        queue.notify(pack).await;
        finish.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorhouse_core::PrimaryKey;

    #[test]
    fn test_delta_binlogs_require_written_path() {
        assert!(delta_binlogs(None).is_empty());

        let unwritten = DeleteBuffer::new(vec![PrimaryKey::Int64(1)], vec![5]);
        assert!(delta_binlogs(Some(&unwritten)).is_empty());

        let mut written = DeleteBuffer::new(vec![PrimaryKey::Int64(1)], vec![5]);
        written.log_path = Some("files/delta_log/1/2/3/9".to_string());
        written.log_size = 42;
        let binlogs = delta_binlogs(Some(&written));
        assert_eq!(binlogs.len(), 1);
        assert_eq!(binlogs[0].entries_num, 1);
        assert_eq!(binlogs[0].log_size, 42);
        assert_eq!(binlogs[0].timestamp_from, 5);
        assert_eq!(binlogs[0].timestamp_to, 5);
    }

    #[test]
    fn test_runner_halves_are_idempotent() {
        let runner = FlushTaskRunner::new(1, Position::new("ch", vec![1], 10));
        let cm = Arc::new(ChunkManager::new(
            Arc::new(object_store::memory::InMemory::new()),
            &crate::config::FlushConfig::default(),
            FlushMetrics::new(),
        ));

        runner.run_flush_insert(
            Arc::new(WriteInsertTask::new(cm.clone(), HashMap::new(), FlushMetrics::new())),
            HashMap::new(),
            HashMap::new(),
            true,
            false,
        );
        // The duplicate must not clobber the first half's flags.
        runner.run_flush_insert(
            Arc::new(WriteInsertTask::new(cm, HashMap::new(), FlushMetrics::new())),
            HashMap::new(),
            HashMap::new(),
            false,
            true,
        );

        let pack = runner.build_pack(None);
        assert!(pack.flushed);
        assert!(!pack.dropped);
    }
}

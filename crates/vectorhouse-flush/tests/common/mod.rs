//! Shared fakes for flush engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartId, ObjectMeta, ObjectStore, PutResult,
};
use tokio::io::AsyncWrite;

use vectorhouse_core::{
    CollectionId, CollectionSchema, DataType, FieldSchema, PartitionId, Position, SegmentId,
    Timestamp,
};
use vectorhouse_metadata::{
    Allocator, Broker, Channel, DropVirtualChannelRequest, MetaError, SaveBinlogPathsRequest,
    SegmentHandle, SegmentStartPosition, SegmentStatisticsUpdate,
};
use vectorhouse_flush::{Error, Supervisor};

pub const PK_FIELD: i64 = 100;
pub const VECTOR_FIELD: i64 = 101;

pub fn test_schema() -> CollectionSchema {
    CollectionSchema::new(
        "docs",
        vec![
            FieldSchema::primary_key(PK_FIELD, "id", DataType::Int64),
            FieldSchema::vector(VECTOR_FIELD, "embedding", 2),
        ],
    )
}

pub fn pos(channel: &str, msg_id: u8, ts: Timestamp) -> Position {
    Position::new(channel, vec![msg_id], ts)
}

// ---------------------------------------------------------------
// Event log
// ---------------------------------------------------------------

/// Ordered record of observable engine events.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Poll until the log satisfies `pred` or 5 seconds elapse.
    pub async fn wait_until(&self, pred: impl Fn(&[String]) -> bool) -> Vec<String> {
        for _ in 0..500 {
            {
                let events = self.events.lock().unwrap();
                if pred(&events) {
                    return events.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for events, got: {:?}",
            self.snapshot()
        );
    }
}

// ---------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------

pub struct MockAllocator {
    next: AtomicI64,
    pub alloc_calls: Mutex<Vec<u32>>,
}

impl MockAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(9000),
            alloc_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn allocated_total(&self) -> u32 {
        self.alloc_calls.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Allocator for MockAllocator {
    async fn alloc(&self, count: u32) -> Result<i64, MetaError> {
        self.alloc_calls.lock().unwrap().push(count);
        Ok(self.next.fetch_add(count as i64, Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------
// Broker
// ---------------------------------------------------------------

#[derive(Default)]
pub struct MockBroker {
    pub saved: Mutex<Vec<SaveBinlogPathsRequest>>,
    pub drop_requests: Mutex<Vec<DropVirtualChannelRequest>>,
    pub checkpoint_calls: Mutex<Vec<Vec<Position>>>,

    /// Scripted errors consumed one per call, in order.
    pub save_errors: Mutex<VecDeque<MetaError>>,
    pub drop_errors: Mutex<VecDeque<MetaError>>,
    pub checkpoint_errors: Mutex<VecDeque<MetaError>>,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn push_save_error(&self, e: MetaError) {
        self.save_errors.lock().unwrap().push_back(e);
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn save_binlog_paths(&self, req: SaveBinlogPathsRequest) -> Result<(), MetaError> {
        if let Some(e) = self.save_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.saved.lock().unwrap().push(req);
        Ok(())
    }

    async fn drop_virtual_channel(&self, req: DropVirtualChannelRequest) -> Result<(), MetaError> {
        if let Some(e) = self.drop_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.drop_requests.lock().unwrap().push(req);
        Ok(())
    }

    async fn update_channel_checkpoint(&self, positions: Vec<Position>) -> Result<(), MetaError> {
        if let Some(e) = self.checkpoint_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.checkpoint_calls.lock().unwrap().push(positions);
        Ok(())
    }
}

// ---------------------------------------------------------------
// Channel
// ---------------------------------------------------------------

pub struct MockChannel {
    collection_id: CollectionId,
    schema: CollectionSchema,
    segments: Mutex<HashMap<SegmentId, Arc<SegmentHandle>>>,
    start_positions: Mutex<Vec<SegmentStartPosition>>,
    pub transferred: Mutex<Vec<SegmentId>>,
    pub flushed_segments: Mutex<Vec<SegmentId>>,
    pub removed_segments: Mutex<Vec<SegmentId>>,
    pub evicted_insert: Mutex<Vec<(SegmentId, Timestamp)>>,
    pub evicted_delete: Mutex<Vec<(SegmentId, Timestamp)>>,
    num_rows: Mutex<HashMap<SegmentId, i64>>,
    flush_ts: AtomicU64,
}

impl MockChannel {
    pub fn new(collection_id: CollectionId) -> Arc<Self> {
        Arc::new(Self {
            collection_id,
            schema: test_schema(),
            segments: Mutex::new(HashMap::new()),
            start_positions: Mutex::new(Vec::new()),
            transferred: Mutex::new(Vec::new()),
            flushed_segments: Mutex::new(Vec::new()),
            removed_segments: Mutex::new(Vec::new()),
            evicted_insert: Mutex::new(Vec::new()),
            evicted_delete: Mutex::new(Vec::new()),
            num_rows: Mutex::new(HashMap::new()),
            flush_ts: AtomicU64::new(0),
        })
    }

    pub fn add_segment(&self, segment_id: SegmentId, partition_id: PartitionId) -> Arc<SegmentHandle> {
        let handle = Arc::new(SegmentHandle::new(segment_id, self.collection_id, partition_id));
        self.segments.lock().unwrap().insert(segment_id, handle.clone());
        handle
    }

    pub fn set_num_rows(&self, segment_id: SegmentId, rows: i64) {
        self.num_rows.lock().unwrap().insert(segment_id, rows);
    }

    pub fn add_new_segment_position(&self, segment_id: SegmentId, position: Position) {
        self.start_positions.lock().unwrap().push(SegmentStartPosition {
            segment_id,
            start_position: position,
        });
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    fn has_segment(&self, segment_id: SegmentId, _count_buffered: bool) -> bool {
        self.segments.lock().unwrap().contains_key(&segment_id)
    }

    fn collection_and_partition_id(
        &self,
        segment_id: SegmentId,
    ) -> Result<(CollectionId, PartitionId), MetaError> {
        self.segments
            .lock()
            .unwrap()
            .get(&segment_id)
            .map(|s| (s.collection_id, s.partition_id))
            .ok_or(MetaError::SegmentNotFound(segment_id))
    }

    async fn collection_schema(
        &self,
        _collection_id: CollectionId,
        _ts: Timestamp,
    ) -> Result<CollectionSchema, MetaError> {
        Ok(self.schema.clone())
    }

    fn get_segment(&self, segment_id: SegmentId) -> Option<Arc<SegmentHandle>> {
        self.segments.lock().unwrap().get(&segment_id).cloned()
    }

    fn list_new_segments_start_positions(&self) -> Vec<SegmentStartPosition> {
        self.start_positions.lock().unwrap().clone()
    }

    fn transfer_new_segments(&self, segment_ids: Vec<SegmentId>) {
        self.transferred.lock().unwrap().extend(segment_ids);
    }

    fn segment_flushed(&self, segment_id: SegmentId) {
        self.flushed_segments.lock().unwrap().push(segment_id);
    }

    fn remove_segments(&self, segment_ids: &[SegmentId]) {
        self.removed_segments.lock().unwrap().extend_from_slice(segment_ids);
        let mut segments = self.segments.lock().unwrap();
        for id in segment_ids {
            segments.remove(id);
        }
    }

    fn evict_history_insert_buffer(&self, segment_id: SegmentId, position: &Position) {
        self.evicted_insert
            .lock()
            .unwrap()
            .push((segment_id, position.timestamp));
    }

    fn evict_history_delete_buffer(&self, segment_id: SegmentId, position: &Position) {
        self.evicted_delete
            .lock()
            .unwrap()
            .push((segment_id, position.timestamp));
    }

    fn get_segment_statistics_updates(
        &self,
        segment_id: SegmentId,
    ) -> Option<SegmentStatisticsUpdate> {
        self.num_rows
            .lock()
            .unwrap()
            .get(&segment_id)
            .map(|rows| SegmentStatisticsUpdate {
                segment_id,
                num_rows: *rows,
            })
    }

    fn get_flush_ts(&self) -> Timestamp {
        self.flush_ts.load(Ordering::Acquire)
    }

    fn update_single_segment_memory_size(&self, _segment_id: SegmentId) {}
}

// ---------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSupervisor {
    pub fatals: Mutex<Vec<String>>,
}

impl RecordingSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fatal_count(&self) -> usize {
        self.fatals.lock().unwrap().len()
    }
}

impl Supervisor for RecordingSupervisor {
    fn on_fatal(&self, context: &str, error: &Error) {
        self.fatals
            .lock()
            .unwrap()
            .push(format!("{context}: {error}"));
    }
}

// ---------------------------------------------------------------
// Flaky object store
// ---------------------------------------------------------------

/// In-memory store that fails the first `fail_puts` PUT calls.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemory,
    fail_remaining: AtomicU32,
    pub put_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(fail_puts: u32) -> Self {
        Self {
            inner: InMemory::new(),
            fail_remaining: AtomicU32::new(fail_puts),
            put_calls: AtomicU32::new(0),
        }
    }

    pub fn put_count(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }
}

impl fmt::Display for FlakyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlakyStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, location: &Path, bytes: Bytes) -> object_store::Result<PutResult> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(object_store::Error::Generic {
                store: "flaky",
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "injected put failure",
                )),
            });
        }
        self.inner.put(location, bytes).await
    }

    async fn put_opts(
        &self,
        location: &Path,
        bytes: Bytes,
        opts: object_store::PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, bytes, opts).await
    }

    async fn put_multipart(
        &self,
        location: &Path,
    ) -> object_store::Result<(MultipartId, Box<dyn AsyncWrite + Send + Unpin>)> {
        self.inner.put_multipart(location).await
    }

    async fn abort_multipart(
        &self,
        location: &Path,
        multipart_id: &MultipartId,
    ) -> object_store::Result<()> {
        self.inner.abort_multipart(location, multipart_id).await
    }

    async fn get_opts(
        &self,
        location: &Path,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &Path) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(
        &self,
        prefix: Option<&Path>,
    ) -> futures::stream::BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&Path>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

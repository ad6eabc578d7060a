//! Ordered Flush Queues
//!
//! One `OrderFlushQueue` exists per segment and guarantees that the
//! segment's meta notifications happen in sync-point order. The order is
//! enforced not by a queue data structure but by a chain of completion
//! handles: the queue tracks the *tail* handle of the most recently
//! admitted task, and every new task receives the previous tail as its
//! predecessor. A task must not observably complete before its predecessor
//! has.
//!
//! ## Injections
//!
//! Pending injections ride a bounded side channel. A busy queue consumes
//! at most one injection per task boundary; an idle queue drains promptly
//! through a dedicated *injection task* that occupies a chain slot, fires
//! the barrier, awaits the verdict, and completes its handle like any
//! other task. Either way an injection executes strictly between two
//! consecutive task notifications.
//!
//! ## Cleanup
//!
//! `check_empty` only reports true when the chain state is uncontended and
//! no task is running; the manager's reaper uses it so removing an idle
//! queue never steals locks from an active one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use vectorhouse_core::{DeleteBuffer, Position, SegmentId};

use crate::injection::TaskInjection;
use crate::pack::{NotifyMetaFn, PostInjectionFn, SegmentFlushPack};
use crate::signal::{completion_pair, CompletionHandle};
use crate::task::{FlushDeleteTask, FlushInsertTask, FlushTaskRunner};

/// Capacity of the per-queue injection side channel.
const INJECT_CHANNEL_CAPACITY: usize = 100;

/// Key of one sync task: the message ID plus timestamp of its position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SyncTaskId {
    msg_id: Bytes,
    timestamp: u64,
}

impl SyncTaskId {
    pub(crate) fn from_position(pos: &Position) -> Self {
        Self {
            msg_id: pos.msg_id.clone(),
            timestamp: pos.timestamp,
        }
    }
}

struct ChainState {
    running_tasks: i32,
    tail: CompletionHandle,
}

pub(crate) struct OrderFlushQueue {
    segment_id: SegmentId,
    notify_fn: NotifyMetaFn,

    /// Sync tasks admitted but not yet notified.
    working: Mutex<HashMap<SyncTaskId, Arc<FlushTaskRunner>>>,

    inject_tx: mpsc::Sender<Arc<TaskInjection>>,
    inject_rx: Mutex<mpsc::Receiver<Arc<TaskInjection>>>,
    post_injection: Mutex<Option<PostInjectionFn>>,

    /// Guards task admission and the tail handle swap.
    chain: Mutex<ChainState>,
}

impl OrderFlushQueue {
    pub(crate) fn new(segment_id: SegmentId, notify_fn: NotifyMetaFn) -> Arc<Self> {
        let (inject_tx, inject_rx) = mpsc::channel(INJECT_CHANNEL_CAPACITY);
        Arc::new(Self {
            segment_id,
            notify_fn,
            working: Mutex::new(HashMap::new()),
            inject_tx,
            inject_rx: Mutex::new(inject_rx),
            post_injection: Mutex::new(None),
            chain: Mutex::new(ChainState {
                running_tasks: 0,
                // A fresh queue acts as if its tailing task already completed.
                tail: CompletionHandle::completed(),
            }),
        })
    }

    /// Find or admit the runner for `pos`. Admission swaps the tail handle
    /// and spawns the runner's driver with the previous tail as its
    /// predecessor.
    fn get_flush_task(self: &Arc<Self>, pos: &Position) -> Arc<FlushTaskRunner> {
        let task_id = SyncTaskId::from_position(pos);

        let mut working = self.working.lock().unwrap();
        if let Some(runner) = working.get(&task_id) {
            return runner.clone();
        }
        let runner = Arc::new(FlushTaskRunner::new(self.segment_id, pos.clone()));
        working.insert(task_id, runner.clone());

        // Swap the tail under the working guard so chain order always
        // matches admission order.
        let (start, finish) = {
            let mut chain = self.chain.lock().unwrap();
            chain.running_tasks += 1;
            let start = chain.tail.clone();
            let (finish, handle) = completion_pair();
            chain.tail = handle;
            (start, finish)
        };
        drop(working);

        tracing::info!(
            segment_id = self.segment_id,
            timestamp = pos.timestamp,
            "new flush task runner created and initialized"
        );
        tokio::spawn(runner.clone().run(self.clone(), start, finish));
        runner
    }

    pub(crate) fn enqueue_insert(
        self: &Arc<Self>,
        task: Arc<dyn FlushInsertTask>,
        insert_logs: HashMap<i64, vectorhouse_core::Binlog>,
        stats_logs: HashMap<i64, vectorhouse_core::Binlog>,
        flushed: bool,
        dropped: bool,
        pos: Position,
    ) {
        self.get_flush_task(&pos)
            .run_flush_insert(task, insert_logs, stats_logs, flushed, dropped);
    }

    pub(crate) fn enqueue_delete(
        self: &Arc<Self>,
        task: Arc<dyn FlushDeleteTask>,
        delta: Option<DeleteBuffer>,
        pos: Position,
    ) {
        self.get_flush_task(&pos).run_flush_del(task, delta);
    }

    /// Whether a sync task for `pos` is currently admitted.
    pub(crate) fn contains_task(&self, pos: &Position) -> bool {
        self.working
            .lock()
            .unwrap()
            .contains_key(&SyncTaskId::from_position(pos))
    }

    pub(crate) fn working_len(&self) -> usize {
        self.working.lock().unwrap().len()
    }

    /// Clean-up after a task completed its storage work, before it
    /// notifies. Applies any recorded post-injection rewrite to the pack
    /// and, if the queue went idle with injections still pending, enqueues
    /// an injection task so they drain promptly.
    pub(crate) fn post_task(
        self: &Arc<Self>,
        mut pack: Option<&mut SegmentFlushPack>,
        post_injection: Option<PostInjectionFn>,
        is_flush: bool,
    ) {
        if is_flush {
            if let Some(pack) = pack.as_deref() {
                self.working
                    .lock()
                    .unwrap()
                    .remove(&SyncTaskId::from_position(&pack.pos));
            }
        }

        {
            let mut recorded = self.post_injection.lock().unwrap();
            if post_injection.is_some() {
                *recorded = post_injection;
            }
            if is_flush {
                if let (Some(rewrite), Some(pack)) = (recorded.as_ref(), pack.as_deref_mut()) {
                    rewrite(pack);
                }
            }
        }

        let mut chain = self.chain.lock().unwrap();
        chain.running_tasks -= 1;
        if chain.running_tasks == 0 && self.has_pending_injections() {
            self.enqueue_inject_task(&mut chain);
        }
    }

    /// Queue an injection. If the queue is idle, an injection task is
    /// enqueued immediately so the barrier does not wait for a future sync.
    pub(crate) async fn inject(self: &Arc<Self>, injection: Arc<TaskInjection>) {
        if self.inject_tx.send(injection).await.is_err() {
            // Receiver lives as long as the queue; this only fires during teardown.
            tracing::warn!(segment_id = self.segment_id, "injection channel closed");
            return;
        }

        let mut chain = self.chain.lock().unwrap();
        if chain.running_tasks == 0 {
            self.enqueue_inject_task(&mut chain);
        }
    }

    /// Non-blocking take of at most one pending injection.
    pub(crate) fn try_take_injection(&self) -> Option<Arc<TaskInjection>> {
        self.inject_rx.lock().unwrap().try_recv().ok()
    }

    fn has_pending_injections(&self) -> bool {
        !self.inject_rx.lock().unwrap().is_empty()
    }

    /// Occupy a chain slot with a task whose only job is to drain one
    /// pending injection while the queue is idle.
    fn enqueue_inject_task(self: &Arc<Self>, chain: &mut ChainState) {
        chain.running_tasks += 1;
        let start = chain.tail.clone();
        let (finish, handle) = completion_pair();
        chain.tail = handle;

        tracing::info!(segment_id = self.segment_id, "new injection task enqueued");

        let queue = self.clone();
        tokio::spawn(async move {
            start.wait().await;

            let mut post_injection = None;
            if let Some(injection) = queue.try_take_injection() {
                injection.inject_one();
                if injection.inject_over().await {
                    post_injection = injection.post_injection();
                }
            }

            queue.post_task(None, post_injection, false);
            finish.finish();
        });
    }

    /// Enqueue an injection task unconditionally; the manager drains every
    /// queue this way on close so in-flight injections resolve.
    pub(crate) fn force_drain(self: &Arc<Self>) {
        let mut chain = self.chain.lock().unwrap();
        self.enqueue_inject_task(&mut chain);
    }

    /// Apply the recorded post-injection rewrite to `pack`, if any.
    pub(crate) fn apply_post_injection(&self, pack: &mut SegmentFlushPack) {
        if let Some(rewrite) = self.post_injection.lock().unwrap().as_ref() {
            rewrite(pack);
        }
    }

    /// Completion handle of the most recently admitted task.
    pub(crate) fn tail(&self) -> CompletionHandle {
        self.chain.lock().unwrap().tail.clone()
    }

    /// True only when the chain state is uncontended and idle.
    pub(crate) fn check_empty(&self) -> bool {
        match self.chain.try_lock() {
            Ok(chain) => chain.running_tasks == 0,
            Err(_) => false,
        }
    }

    pub(crate) async fn notify(&self, pack: SegmentFlushPack) {
        (self.notify_fn)(pack).await;
    }
}

//! Channel Checkpoint Updater
//!
//! Coalesces per-channel checkpoint advances into batched coordinator RPCs
//! with bounded parallelism. Two drivers feed dispatch:
//!
//! - **Tick**: every `update_tick`, sweep all pending tasks.
//! - **Notify**: flush completions trigger an immediate sweep of only the
//!   tasks carrying the flush bit; the bit is cleared on harvest. The
//!   notify channel holds a single slot and triggering never blocks.
//!
//! ## Coalescing
//!
//! One task exists per channel. Adding a position for a channel that
//! already has a task keeps the max-timestamp position, ORs the flush
//! bits, and adopts the new callback; a stale position without a flush
//! upgrade is a no-op. After a successful RPC a task is removed only if
//! its stored position has not advanced past the dispatched one, so a
//! checkpoint sent to the coordinator never regresses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, watch};

use vectorhouse_core::{Position, Timestamp};
use vectorhouse_metadata::Broker;
use vectorhouse_observability::{labels, FlushMetrics};

use crate::config::CheckpointConfig;

/// Callback invoked after the task's checkpoint was acknowledged.
pub type CheckpointCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
struct ChannelCheckpointTask {
    pos: Position,
    flush: bool,
    callback: CheckpointCallback,
}

pub struct ChannelCheckpointUpdater {
    broker: Arc<dyn Broker>,
    config: CheckpointConfig,
    metrics: FlushMetrics,

    tasks: RwLock<HashMap<String, ChannelCheckpointTask>>,

    notify_tx: mpsc::Sender<()>,
    notify_rx: Mutex<Option<mpsc::Receiver<()>>>,

    close_tx: watch::Sender<bool>,
}

impl ChannelCheckpointUpdater {
    pub fn new(broker: Arc<dyn Broker>, config: CheckpointConfig, metrics: FlushMetrics) -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::channel(1);
        let (close_tx, _) = watch::channel(false);
        Arc::new(Self {
            broker,
            config,
            metrics,
            tasks: RwLock::new(HashMap::new()),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            close_tx,
        })
    }

    /// Drive tick and notify dispatch until `close`. Spawn this once.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("channel checkpoint updater start");
        let Some(mut notify_rx) = self.notify_rx.lock().unwrap().take() else {
            tracing::warn!("channel checkpoint updater already running");
            return;
        };
        let mut close_rx = self.close_tx.subscribe();
        let mut ticker = tokio::time::interval(self.config.update_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick is immediate; consume it so a fresh
        // updater does not dispatch an empty sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = close_rx.changed() => {
                    if changed.is_err() || *close_rx.borrow_and_update() {
                        tracing::info!("channel checkpoint updater exit");
                        return;
                    }
                }
                Some(()) = notify_rx.recv() => {
                    let tasks = self.harvest_flush_tasks();
                    if !tasks.is_empty() {
                        self.update_checkpoints(tasks).await;
                    }
                }
                _ = ticker.tick() => {
                    self.execute().await;
                }
            }
        }
    }

    /// Record a checkpoint advance for a channel.
    pub fn add_task(&self, pos: Position, flush: bool, callback: CheckpointCallback) {
        if !pos.is_valid() {
            tracing::warn!(channel = %pos.channel_name, "illegal checkpoint position");
            return;
        }

        let channel = pos.channel_name.clone();
        {
            let mut tasks = self.tasks.write().unwrap();
            let replacement = match tasks.get(&channel) {
                None => Some(ChannelCheckpointTask { pos, flush, callback }),
                Some(existing)
                    if existing.pos.timestamp < pos.timestamp || (flush && !existing.flush) =>
                {
                    let merged_pos = if pos.timestamp > existing.pos.timestamp {
                        pos
                    } else {
                        existing.pos.clone()
                    };
                    Some(ChannelCheckpointTask {
                        pos: merged_pos,
                        flush: flush || existing.flush,
                        callback,
                    })
                }
                Some(_) => None,
            };
            if let Some(task) = replacement {
                tasks.insert(channel, task);
            }
        }

        if flush {
            self.trigger();
        }
    }

    /// Nudge the notify driver; never blocks.
    pub fn trigger(&self) {
        let _ = self.notify_tx.try_send(());
    }

    pub fn task_num(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    /// Take every task carrying the flush bit, clearing the bit.
    fn harvest_flush_tasks(&self) -> Vec<ChannelCheckpointTask> {
        let mut tasks = self.tasks.write().unwrap();
        let mut harvested = Vec::new();
        for task in tasks.values_mut() {
            if task.flush {
                task.flush = false;
                harvested.push(task.clone());
            }
        }
        harvested
    }

    /// Sweep every pending task.
    async fn execute(&self) {
        let tasks: Vec<_> = self.tasks.read().unwrap().values().cloned().collect();
        if !tasks.is_empty() {
            self.update_checkpoints(tasks).await;
        }
    }

    /// Batch tasks into RPC groups and dispatch with bounded parallelism.
    async fn update_checkpoints(&self, tasks: Vec<ChannelCheckpointTask>) {
        let rpc_batches: Vec<Vec<ChannelCheckpointTask>> = tasks
            .chunks(self.config.max_checkpoints_per_rpc.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut finished: Vec<(String, Timestamp)> = Vec::new();
        for group in rpc_batches.chunks(self.config.effective_max_parallel()) {
            let dispatched = futures::future::join_all(
                group.iter().map(|batch| self.dispatch_batch(batch)),
            )
            .await;
            finished.extend(dispatched.into_iter().flatten());
        }

        let mut tasks = self.tasks.write().unwrap();
        for (channel, dispatched_ts) in finished {
            // Keep the task if an interleaving add advanced it past what
            // was just acknowledged.
            let acknowledged = tasks
                .get(&channel)
                .map(|task| task.pos.timestamp <= dispatched_ts)
                .unwrap_or(false);
            if acknowledged {
                tasks.remove(&channel);
            }
        }
    }

    /// One RPC: send the batch's positions, then run callbacks on success.
    async fn dispatch_batch(&self, batch: &[ChannelCheckpointTask]) -> Vec<(String, Timestamp)> {
        let positions: Vec<Position> = batch.iter().map(|t| t.pos.clone()).collect();
        let result = tokio::time::timeout(
            self.config.rpc_timeout,
            self.broker.update_channel_checkpoint(positions),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                self.metrics
                    .checkpoint_updates_total
                    .with_label_values(&[labels::STATUS_SUCCESS])
                    .inc();
                batch
                    .iter()
                    .map(|task| {
                        (task.callback)();
                        (task.pos.channel_name.clone(), task.pos.timestamp)
                    })
                    .collect()
            }
            Ok(Err(e)) => {
                self.metrics
                    .checkpoint_updates_total
                    .with_label_values(&[labels::STATUS_FAIL])
                    .inc();
                tracing::warn!(error = %e, "update channel checkpoint failed");
                Vec::new()
            }
            Err(_) => {
                self.metrics
                    .checkpoint_updates_total
                    .with_label_values(&[labels::STATUS_FAIL])
                    .inc();
                tracing::warn!(
                    timeout_secs = self.config.rpc_timeout.as_secs(),
                    "update channel checkpoint timed out"
                );
                Vec::new()
            }
        }
    }
}

//! VectorHouse Durable Segment Flush Engine
//!
//! This crate implements the data node's write-durability core: turning
//! in-memory per-segment buffers into persisted, content-addressed binlog
//! objects while preserving strict per-segment ordering between sync
//! points.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐
//! │ insert buffer │   │ delete buffer │
//! └───────┬───────┘   └───────┬───────┘
//!         │ flush_buffer_data │ flush_del_data
//!         ▼                   ▼
//! ┌────────────────────────────────────┐
//! │     RendezvousFlushManager         │ ◄── serialize, allocate IDs
//! │  ┌──────────────────────────────┐  │
//! │  │ OrderFlushQueue (per segment)│  │ ◄── completion-handle chain
//! │  │   FlushTaskRunner per sync   │  │ ◄── insert/delete rendezvous
//! │  └──────────────┬───────────────┘  │
//! └─────────────────┼──────────────────┘
//!                   │ blobs                  ┌─────────────────────────┐
//!                   ▼                        │ ChannelCheckpointUpdater│
//! ┌────────────────────────────────────┐    │  coalesce + batch RPCs  │
//! │        ChunkManager → S3           │    └─────────────────────────┘
//! └─────────────────┬──────────────────┘
//!                   │ pack (in order)
//!                   ▼
//! ┌────────────────────────────────────┐
//! │ notify callbacks → meta coordinator│
//! └────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Per-segment meta notifications are totally ordered by sync position.
//! - Each admitted sync point notifies exactly once, in normal mode, or
//!   contributes exactly one pack to the final drop request, in dropping
//!   mode; never both.
//! - Injections (compaction barriers) execute strictly between two
//!   consecutive sync tasks of their target segments.
//! - Checkpoints reported to the coordinator never regress per channel.
//!
//! ## Main Components
//!
//! - [`RendezvousFlushManager`]: dispatch, serialization, dropping mode,
//!   queue lifecycle.
//! - [`ChannelCheckpointUpdater`]: debounced, bounded-parallel checkpoint
//!   RPCs.
//! - [`ChunkManager`]: object-store access with retry and metrics.
//! - [`flush_notify_fn`] / [`drop_virtual_channel_fn`]: translate packs
//!   into coordinator RPCs with the engine's failure policy.

pub mod checkpoint;
pub mod chunk_manager;
pub mod config;
pub mod error;
pub mod injection;
pub mod manager;
pub mod notify;
pub mod pack;
pub mod paths;
pub mod retry;
mod queue;
mod signal;
pub mod task;

pub use checkpoint::{ChannelCheckpointUpdater, CheckpointCallback};
pub use chunk_manager::ChunkManager;
pub use config::{CheckpointConfig, FlushConfig, DEFAULT_UPDATE_CHECKPOINT_MAX_PARALLEL};
pub use error::{Error, Result};
pub use injection::{new_task_injection, InjectionHandle, TaskInjection};
pub use manager::RendezvousFlushManager;
pub use notify::{
    drop_virtual_channel_fn, flush_notify_fn, AbortSupervisor, FlushingSegmentCache, Supervisor,
    SyncContext,
};
pub use pack::{FlushAndDropFn, NotifyMetaFn, PostInjectionFn, SegmentFlushPack};
pub use retry::{retry, RetryConfig};
pub use task::{FlushDeleteTask, FlushInsertTask, WriteDeleteTask, WriteInsertTask};

//! Flush Engine Configuration
//!
//! This module defines configuration for the flush engine and the channel
//! checkpoint updater.
//!
//! ## FlushConfig
//!
//! Controls the rendezvous flush manager and its object-store writes:
//!
//! - **root_path**: prefix under which all binlog objects are placed
//! - **clean_interval**: period of the idle-queue reaper
//! - **max_parallel_sync_task_num**: aggregate cap on in-flight sync tasks;
//!   `is_full()` reports against this and callers throttle
//! - **write_retries**: attempts per object-store PUT with exponential backoff
//!
//! ## CheckpointConfig
//!
//! Controls checkpoint coalescing and dispatch:
//!
//! - **update_tick**: sweep period for pending checkpoint tasks
//! - **max_checkpoints_per_rpc**: batch size per coordinator RPC
//! - **max_parallel**: RPC groups dispatched concurrently; `<= 0` falls back
//!   to the default of 10
//! - **rpc_timeout**: per-RPC deadline; a timed-out batch is retried by a
//!   later tick

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fallback for `CheckpointConfig::max_parallel` when non-positive.
pub const DEFAULT_UPDATE_CHECKPOINT_MAX_PARALLEL: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Object path prefix for all binlogs (default: "files")
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Period of the idle flush-queue reaper (default: 60s)
    #[serde(default = "default_clean_interval", with = "duration_secs")]
    pub clean_interval: Duration,

    /// Aggregate cap on in-flight sync tasks across all segments (default: 6)
    #[serde(default = "default_max_parallel_sync_task_num")]
    pub max_parallel_sync_task_num: usize,

    /// Object-store PUT attempts with exponential backoff (default: 3)
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    /// Initial backoff between PUT retries in milliseconds (default: 100)
    #[serde(default = "default_write_retry_backoff_ms")]
    pub write_retry_backoff_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            clean_interval: default_clean_interval(),
            max_parallel_sync_task_num: default_max_parallel_sync_task_num(),
            write_retries: default_write_retries(),
            write_retry_backoff_ms: default_write_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Sweep period for pending checkpoint tasks (default: 10s)
    #[serde(default = "default_update_tick", with = "duration_secs")]
    pub update_tick: Duration,

    /// Checkpoints batched into one coordinator RPC (default: 128)
    #[serde(default = "default_max_checkpoints_per_rpc")]
    pub max_checkpoints_per_rpc: usize,

    /// RPC groups dispatched concurrently; `<= 0` means the default of 10
    #[serde(default = "default_max_parallel")]
    pub max_parallel: i32,

    /// Deadline per checkpoint RPC (default: 20s)
    #[serde(default = "default_rpc_timeout", with = "duration_secs")]
    pub rpc_timeout: Duration,
}

impl CheckpointConfig {
    pub fn effective_max_parallel(&self) -> usize {
        if self.max_parallel <= 0 {
            DEFAULT_UPDATE_CHECKPOINT_MAX_PARALLEL
        } else {
            self.max_parallel as usize
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            update_tick: default_update_tick(),
            max_checkpoints_per_rpc: default_max_checkpoints_per_rpc(),
            max_parallel: default_max_parallel(),
            rpc_timeout: default_rpc_timeout(),
        }
    }
}

fn default_root_path() -> String {
    "files".to_string()
}

fn default_clean_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_parallel_sync_task_num() -> usize {
    6
}

fn default_write_retries() -> u32 {
    3
}

fn default_write_retry_backoff_ms() -> u64 {
    100
}

fn default_update_tick() -> Duration {
    Duration::from_secs(10)
}

fn default_max_checkpoints_per_rpc() -> usize {
    128
}

fn default_max_parallel() -> i32 {
    10
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Serde helpers for `Duration` as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

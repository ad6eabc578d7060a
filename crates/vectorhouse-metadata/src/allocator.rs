//! Log ID Allocation Interface
//!
//! Binlog object names embed a globally unique, monotonically increasing
//! log index. The allocator hands out ranges of them; the flush engine
//! consumes consecutive IDs from one `alloc` call so all blobs of a single
//! sync share a contiguous range.

use async_trait::async_trait;

use crate::error::Result;

/// Monotonic ID range allocator.
#[async_trait]
pub trait Allocator: Send + Sync {
    /// Reserve `count` consecutive IDs, returning the first.
    async fn alloc(&self, count: u32) -> Result<i64>;

    /// Reserve a single ID.
    async fn alloc_one(&self) -> Result<i64> {
        self.alloc(1).await
    }
}

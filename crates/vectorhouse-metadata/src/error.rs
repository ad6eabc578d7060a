//! Metadata Error Types
//!
//! Typed errors returned by the metadata coordinator. The flush engine's
//! retry policies branch on these, so the classification here is part of
//! the contract:
//!
//! - `SegmentNotFound` / `ChannelNotFound`: the coordinator no longer owns
//!   the entity. Notify retries downgrade these to a warning and succeed.
//! - `MetaFailed`: coordinator-side state conflict. During a channel drop
//!   this means the channel moved and is treated as success.
//! - `Transport`: transient RPC failure, safe to retry.

use thiserror::Error;

use vectorhouse_core::SegmentId;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("Segment not found: {0}")]
    SegmentNotFound(SegmentId),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Meta operation failed: {0}")]
    MetaFailed(String),

    #[error("Broker transport error: {0}")]
    Transport(String),
}

impl MetaError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetaError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, MetaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(MetaError::Transport("timeout".into()).is_retryable());
        assert!(!MetaError::SegmentNotFound(1).is_retryable());
        assert!(!MetaError::ChannelNotFound("ch".into()).is_retryable());
        assert!(!MetaError::MetaFailed("conflict".into()).is_retryable());
    }
}

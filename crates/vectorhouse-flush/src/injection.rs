//! Task Injections
//!
//! An injection is a caller-supplied barrier that must execute between two
//! consecutive sync tasks of a segment. Compaction uses it to rendezvous
//! with the flush pipeline: the flush side signals when every target queue
//! has reached the barrier, the caller does its work, then resolves the
//! barrier with a success verdict.
//!
//! ## Protocol
//!
//! 1. The caller builds the injection for N target segments and hands it to
//!    `RendezvousFlushManager::inject_flush`.
//! 2. Each target queue, at its next task boundary, counts down the barrier
//!    (`inject_one`) and suspends on the verdict.
//! 3. `InjectionHandle::injected()` resolves once all N queues reached the
//!    barrier; the caller performs its blocking work.
//! 4. `InjectionHandle::done(success)` releases every suspended queue. With
//!    `success == true` the queues record the injection's pack rewriter and
//!    apply it to subsequent packs.
//!
//! Dropping the handle without calling `done` resolves the barrier with
//! `false`, so an abandoned injection can never wedge a queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::pack::PostInjectionFn;

/// Queue-facing side of an injection barrier.
pub struct TaskInjection {
    remaining: AtomicUsize,
    injected_tx: watch::Sender<bool>,
    over_tx: watch::Sender<Option<bool>>,
    post_injection: Option<PostInjectionFn>,
}

/// Caller-facing side of an injection barrier.
pub struct InjectionHandle {
    injection: Arc<TaskInjection>,
}

/// Build an injection targeting `segment_count` queues.
pub fn new_task_injection(
    segment_count: usize,
    post_injection: Option<PostInjectionFn>,
) -> (Arc<TaskInjection>, InjectionHandle) {
    let (injected_tx, _) = watch::channel(segment_count == 0);
    let (over_tx, _) = watch::channel(None);
    let injection = Arc::new(TaskInjection {
        remaining: AtomicUsize::new(segment_count),
        injected_tx,
        over_tx,
        post_injection,
    });
    let handle = InjectionHandle {
        injection: injection.clone(),
    };
    (injection, handle)
}

impl TaskInjection {
    /// One queue reached the barrier. Fires the caller's `injected` signal
    /// once every target queue has.
    pub(crate) fn inject_one(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if prev == 1 {
            self.injected_tx.send_replace(true);
        }
    }

    /// Suspend until the caller resolves the barrier; returns the verdict.
    pub(crate) async fn inject_over(&self) -> bool {
        let mut rx = self.over_tx.subscribe();
        let result = match rx.wait_for(|v| v.is_some()).await {
            Ok(verdict) => verdict.unwrap_or(false),
            Err(_) => false,
        };
        result
    }

    pub(crate) fn post_injection(&self) -> Option<PostInjectionFn> {
        self.post_injection.clone()
    }

    /// Whether the caller has resolved the barrier yet.
    pub fn is_resolved(&self) -> bool {
        self.over_tx.borrow().is_some()
    }

    /// Wait until the barrier is resolved, either way.
    pub(crate) async fn resolved(&self) {
        let mut rx = self.over_tx.subscribe();
        let _ = rx.wait_for(|v| v.is_some()).await;
    }

    fn resolve(&self, success: bool) {
        self.over_tx.send_modify(|v| {
            if v.is_none() {
                *v = Some(success);
            }
        });
    }
}

impl InjectionHandle {
    /// Resolves once every target queue has reached the barrier.
    pub async fn injected(&self) {
        let mut rx = self.injection.injected_tx.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Release the suspended queues with a verdict. First resolution wins.
    pub fn done(self, success: bool) {
        self.injection.resolve(success);
    }
}

impl Drop for InjectionHandle {
    fn drop(&mut self) {
        // An abandoned injection reads as failed, never as a hang.
        self.injection.resolve(false);
    }
}

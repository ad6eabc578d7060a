//! Completion Signals, Latches, Wait Groups
//!
//! Small synchronization pieces the flush engine is built from, all layered
//! on `tokio::sync::watch` so completion is observable by any number of
//! waiters:
//!
//! - [`completion_pair`]: a one-shot broadcast used to chain sync tasks.
//!   Each queue keeps a *tail* [`CompletionHandle`]; admitting a task swaps
//!   the tail and hands the previous handle to the new task as its
//!   predecessor. The signal side fires on drop as well, so a chain link
//!   closes even if its task aborts.
//! - [`CountdownLatch`]: the insert/delete rendezvous. Fixed count, wait
//!   until it reaches zero.
//! - [`WaitGroup`]: dynamic membership via RAII guards, used to hold the
//!   drop-mode finalizer until in-flight drop packs land.

use tokio::sync::watch;

/// Create a linked completion signal/handle pair.
pub(crate) fn completion_pair() -> (CompletionSignal, CompletionHandle) {
    let (tx, rx) = watch::channel(false);
    (CompletionSignal { tx }, CompletionHandle { rx })
}

/// Owner side of a completion. Completes on `finish()` or on drop.
pub(crate) struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    pub(crate) fn finish(self) {
        // Drop does the send.
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

/// Waiter side of a completion. Cheap to clone; every clone observes the
/// same completion.
#[derive(Clone)]
pub(crate) struct CompletionHandle {
    rx: watch::Receiver<bool>,
}

impl CompletionHandle {
    /// A handle that is already complete. New queues start with one so
    /// their first task has no predecessor to wait on.
    pub(crate) fn completed() -> Self {
        let (tx, rx) = watch::channel(true);
        drop(tx);
        Self { rx }
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.rx.clone();
        // A dropped sender marked itself complete first, so an error here
        // still means the predecessor is gone.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Fixed-count latch: `wait` resolves once `count_down` was called `count`
/// times. Counting below zero is a no-op.
pub(crate) struct CountdownLatch {
    tx: watch::Sender<u32>,
}

impl CountdownLatch {
    pub(crate) fn new(count: u32) -> Self {
        let (tx, _rx) = watch::channel(count);
        Self { tx }
    }

    pub(crate) fn count_down(&self) {
        self.tx.send_modify(|c| *c = c.saturating_sub(1));
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

/// Dynamic-membership wait group. `enter` returns a guard; `wait` resolves
/// once every guard has dropped.
#[derive(Clone)]
pub(crate) struct WaitGroup {
    tx: watch::Sender<usize>,
}

pub(crate) struct WaitGroupGuard {
    tx: watch::Sender<usize>,
}

impl WaitGroup {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub(crate) fn enter(&self) -> WaitGroupGuard {
        self.tx.send_modify(|c| *c += 1);
        WaitGroupGuard {
            tx: self.tx.clone(),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|c| *c = c.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completion_fires_on_finish() {
        let (signal, handle) = completion_pair();
        let waiter = tokio::spawn(async move { handle.wait().await });
        signal.finish();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_completion_fires_on_drop() {
        let (signal, handle) = completion_pair();
        drop(signal);
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_completed_handle_is_immediate() {
        CompletionHandle::completed().wait().await;
    }

    #[tokio::test]
    async fn test_chain_orders_waiters() {
        let (s1, h1) = completion_pair();
        let (s2, h2) = completion_pair();

        let second = tokio::spawn(async move {
            h2.wait().await;
        });
        let first = tokio::spawn(async move {
            h1.wait().await;
            s2.finish();
        });

        // Nothing completes until the head of the chain fires.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        s1.finish();
        first.await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test]
    async fn test_latch_waits_for_both_halves() {
        let latch = CountdownLatch::new(2);
        latch.count_down();

        tokio::select! {
            _ = latch.wait() => panic!("latch released after one count"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        latch.count_down();
        latch.wait().await;
    }

    #[tokio::test]
    async fn test_wait_group_tracks_guards() {
        let wg = WaitGroup::new();
        let guard = wg.enter();

        tokio::select! {
            _ = wg.wait() => panic!("wait group released with live guard"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        drop(guard);
        wg.wait().await;
    }

    #[tokio::test]
    async fn test_empty_wait_group_is_immediate() {
        WaitGroup::new().wait().await;
    }
}

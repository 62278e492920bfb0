// src/runtime/cancellation.rs
// ============================================================================
// Module: Pipeline Cancellation Token
// Description: A small, cloneable cancellation handle threaded through the
//              orchestrator and into the external adapter calls.
// Purpose: Cooperative cancellation without pulling in `tokio-util`'s
//          richer `CancellationToken`, which is not otherwise needed here.
// Dependencies: std::sync, tokio::sync::Notify
// ============================================================================

//! ## Overview
//! [`CancellationToken`] is a thin `Arc<AtomicBool>` plus a
//! [`tokio::sync::Notify`] so callers can either poll
//! [`CancellationToken::is_cancelled`] (the CPU-bound stages) or `.await`
//! [`CancellationToken::cancelled`] in a `tokio::select!` alongside an
//! external adapter call — only the external reasoning and communication
//! adapters block on I/O.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::Notify;

/// A cooperative cancellation handle. Cloning shares the same underlying
/// state; cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
    /// Notifies any waiter in [`Self::cancelled`].
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Creates a new, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks this token (and every clone of it) as cancelled, waking any
    /// waiter in [`Self::cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns `true` if [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once this token has been cancelled. Intended to be raced
    /// against an external adapter call with `tokio::select!`; dropping
    /// the adapter call's future on the losing branch is what actually
    /// aborts the in-flight HTTP request.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_on_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.expect("waiter task completes");
    }
}

//! Caller-driven cancellation.
//!
//! The wire protocol is strictly synchronous, so a command cannot be
//! preempted; it is unblocked at its next I/O suspension point. A
//! [`CancelContext`] carries an optional deadline and a `cancel()` signal
//! and is observed by the per-connection watcher (sync) or raced against
//! each I/O future (tokio). A connection whose command was canceled is
//! poisoned and must not be reused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    cancelled: bool,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
    deadline: Option<Instant>,
    #[cfg(feature = "tokio")]
    notify: tokio::sync::Notify,
}

/// A cancelable, deadline-carrying handle for one or more commands.
///
/// Cloning shares the signal: canceling any clone cancels them all.
#[derive(Clone)]
pub struct CancelContext {
    inner: Arc<Inner>,
}

impl Default for CancelContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelContext {
    pub fn new() -> Self {
        Self::with_deadline_opt(None)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::with_deadline_opt(Some(deadline))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline_opt(Some(Instant::now() + timeout))
    }

    fn with_deadline_opt(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                cond: Condvar::new(),
                deadline,
                #[cfg(feature = "tokio")]
                notify: tokio::sync::Notify::new(),
            }),
        }
    }

    /// Signal cancellation. Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            state.cancelled = true;
        }
        self.inner.cond.notify_all();
        #[cfg(feature = "tokio")]
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancelled
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Wake blocked observers without canceling; used when a command
    /// completes and its watcher arm must be released.
    pub(crate) fn wake(&self) {
        self.inner.cond.notify_all();
    }

    /// Block until the context fires or `done`/`closed` is observed.
    /// Spurious wakeups re-check every condition.
    pub(crate) fn block_until_fired(&self, done: &AtomicBool, closed: &AtomicBool) -> CancelFate {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if done.load(Ordering::Acquire) || closed.load(Ordering::Acquire) {
                return CancelFate::Finished;
            }
            if state.cancelled {
                return CancelFate::Canceled;
            }
            match self.inner.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return CancelFate::DeadlineExceeded;
                    }
                    let (guard, _) = self
                        .inner
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    state = guard;
                }
                None => {
                    state = self
                        .inner
                        .cond
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Wait until `cancel()` is called. Deadlines are handled separately by
    /// composing timeouts around I/O futures.
    #[cfg(feature = "tokio")]
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Why an armed watcher stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelFate {
    /// The command completed (or the connection closed) first.
    Finished,
    Canceled,
    DeadlineExceeded,
}

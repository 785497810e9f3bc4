use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::cancel::{CancelContext, CancelFate};

use super::stream::WatchHandle;

/// State shared between a connection and its watcher thread.
pub(crate) struct ConnShared {
    /// Single-write: once set the connection must never be reused.
    pub(crate) closed: AtomicBool,
    /// Why the watcher fired, if it did; read by the command path to turn
    /// the resulting I/O error into the right cancellation error.
    pub(crate) cancel_cause: Mutex<Option<CancelFate>>,
}

impl ConnShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            cancel_cause: Mutex::new(None),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn take_cancel_cause(&self) -> Option<CancelFate> {
        self.cancel_cause
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

pub(crate) struct ArmToken {
    ctx: CancelContext,
    done: Arc<AtomicBool>,
}

impl ArmToken {
    /// Release the watcher; also happens on drop so a panicking handler
    /// cannot leave the watcher armed forever.
    pub(crate) fn disarm(self) {}

    pub(crate) fn context(&self) -> &CancelContext {
        &self.ctx
    }
}

impl Drop for ArmToken {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        self.ctx.wake();
    }
}

enum WatcherMsg {
    Arm {
        ctx: CancelContext,
        done: Arc<AtomicBool>,
    },
}

/// Handle to the per-connection watcher thread.
///
/// The watcher's sole job is translating a cancellation signal into an
/// unblocked socket: while a command is armed it waits for completion,
/// cancellation, the deadline, or connection close; on firing it records
/// the cause and shuts the duplicated socket handle down. It never touches
/// any other connection state.
pub(crate) struct Watcher {
    sender: Option<Sender<WatcherMsg>>,
    thread: Option<JoinHandle<()>>,
}

impl Watcher {
    pub(crate) fn spawn(handle: WatchHandle, shared: Arc<ConnShared>) -> Self {
        let (sender, receiver) = channel();
        let thread = std::thread::Builder::new()
            .name("keel-mysql-watcher".to_owned())
            .spawn(move || watch_loop(receiver, handle, &shared))
            .ok();
        Self {
            sender: Some(sender),
            thread,
        }
    }

    /// Arm the watcher for one command. Serialized with command start/end
    /// by the connection's `&mut self` discipline.
    pub(crate) fn arm(&self, ctx: &CancelContext) -> ArmToken {
        let done = Arc::new(AtomicBool::new(false));
        if let Some(sender) = &self.sender {
            let _ = sender.send(WatcherMsg::Arm {
                ctx: ctx.clone(),
                done: Arc::clone(&done),
            });
        }
        ArmToken {
            ctx: ctx.clone(),
            done,
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // Disconnecting the channel ends the loop.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn watch_loop(receiver: Receiver<WatcherMsg>, handle: WatchHandle, shared: &ConnShared) {
    while let Ok(WatcherMsg::Arm { ctx, done }) = receiver.recv() {
        match ctx.block_until_fired(&done, &shared.closed) {
            CancelFate::Finished => {}
            fate @ (CancelFate::Canceled | CancelFate::DeadlineExceeded) => {
                tracing::debug!(?fate, "cancellation fired; unblocking socket");
                *shared
                    .cancel_cause
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(fate);
                shared.mark_closed();
                handle.shutdown();
            }
        }
    }
}

//! Repeating timer for event producers.
//!
//! Stream handlers that emit on a fixed cadence (counters, heartbeats,
//! sampled sensors) run their action on a dedicated ticker thread.
//! [`CancelToken::cancel`] joins that thread, so once it returns the
//! action is guaranteed not to run again. That ordering is what lets a
//! handler's `on_cancel` promise "no event after the cancel ack".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::trace;

use crate::sync::lock;

struct TickerState {
    stopped: Mutex<bool>,
    cond: Condvar,
}

/// Handle to a running ticker. Dropping without calling [`cancel`]
/// leaves the ticker running for the life of the process.
///
/// [`cancel`]: CancelToken::cancel
pub struct CancelToken {
    state: Arc<TickerState>,
    handle: Option<JoinHandle<()>>,
    cancelled: AtomicBool,
}

impl CancelToken {
    /// Stop the ticker and wait for the in-flight tick, if any, to
    /// finish. Idempotent.
    pub fn cancel(&mut self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut stopped = lock(&self.state.stopped);
            *stopped = true;
        }
        self.state.cond.notify_all();
        if let Some(handle) = self.handle.take() {
            // Cancelling from inside the tick itself would deadlock on
            // join, so the ticker thread skips it.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        trace!("ticker cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run `action` every `interval` on a background thread until the
/// returned token is cancelled. The first tick fires after one full
/// interval, not immediately.
pub fn schedule<F>(interval: Duration, mut action: F) -> CancelToken
where
    F: FnMut() + Send + 'static,
{
    let state = Arc::new(TickerState {
        stopped: Mutex::new(false),
        cond: Condvar::new(),
    });
    let thread_state = Arc::clone(&state);
    let handle = thread::spawn(move || loop {
        let mut stopped = lock(&thread_state.stopped);
        let mut remaining = interval;
        while !*stopped && !remaining.is_zero() {
            let start = std::time::Instant::now();
            let (guard, timed_out) = thread_state
                .cond
                .wait_timeout(stopped, remaining)
                .unwrap_or_else(|poisoned| {
                    let (guard, timeout) = poisoned.into_inner();
                    (guard, timeout)
                });
            stopped = guard;
            if timed_out.timed_out() {
                remaining = Duration::ZERO;
            } else {
                remaining = remaining.saturating_sub(start.elapsed());
            }
        }
        if *stopped {
            return;
        }
        drop(stopped);
        action();
    });
    CancelToken {
        state,
        handle: Some(handle),
        cancelled: AtomicBool::new(false),
    }
}

//! Cross-thread cooperative stop signal.
//!
//! The host thread raises the signal; the script thread observes it at
//! every blocking wait and at the engine's periodic poll hook. This is the
//! cancellation token that every wrapped blocking primitive takes, so any
//! wait is cancellable within bounded latency.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::WaitOutcome;

struct SignalInner {
    raised: Mutex<bool>,
    cond: Condvar,
}

/// Clonable handle to a one-shot stop flag.
///
/// Raising is idempotent; once raised the signal never resets for the
/// lifetime of the script thread it belongs to.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<SignalInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                raised: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Request a cooperative stop and wake every pending wait.
    pub fn raise(&self) {
        let mut raised = self.inner.raised.lock();
        *raised = true;
        self.inner.cond.notify_all();
    }

    /// Non-blocking check, suitable for the engine's poll hook.
    pub fn is_raised(&self) -> bool {
        *self.inner.raised.lock()
    }

    /// Sleep for up to `timeout`, waking early if the signal is raised.
    ///
    /// A zero timeout is a pure poll. Returns [`WaitOutcome::Stopped`] if
    /// the signal was raised, [`WaitOutcome::TimedOut`] otherwise - expiry
    /// is a result, not an error.
    pub fn wait_for(&self, timeout: Duration) -> WaitOutcome {
        let mut raised = self.inner.raised.lock();
        if *raised {
            return WaitOutcome::Stopped;
        }
        if timeout.is_zero() {
            return WaitOutcome::TimedOut;
        }
        self.inner.cond.wait_for(&mut raised, timeout);
        if *raised {
            WaitOutcome::Stopped
        } else {
            WaitOutcome::TimedOut
        }
    }

    /// Block until the signal is raised. Used when the event loop has
    /// nothing else to wait on.
    pub fn wait(&self) {
        let mut raised = self.inner.raised.lock();
        while !*raised {
            self.inner.cond.wait(&mut raised);
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

//! Cancellable single-shot deadline.
//!
//! Firing and cancelling race for the same state word, so exactly one of
//! them takes effect. The timer task exits as soon as either happens.

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIs)]
pub enum GuardState {
    Armed,
    Fired,
    Cancelled,
}

#[derive(Debug)]
struct GuardInner {
    state: AtomicU8,
    wake: CancellationToken,
}

impl GuardInner {
    fn claim(&self, to: u8) -> bool {
        self.state
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handle to an armed deadline. Clones refer to the same deadline.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    inner: Arc<GuardInner>,
}

impl TimeoutGuard {
    /// Run `on_timeout` on `executor` after `duration` unless cancelled first.
    ///
    /// A zero duration fires before `arm` returns, on the calling thread.
    pub fn arm<F>(executor: &Handle, duration: Duration, on_timeout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = Self {
            inner: Arc::new(GuardInner {
                state: AtomicU8::new(ARMED),
                wake: CancellationToken::new(),
            }),
        };

        if duration.is_zero() {
            if guard.inner.claim(FIRED) {
                on_timeout();
            }
            return guard;
        }

        let inner = guard.inner.clone();
        executor.spawn(async move {
            tokio::select! {
                biased;
                () = inner.wake.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    if inner.claim(FIRED) {
                        on_timeout();
                    }
                }
            }
        });

        guard
    }

    /// Returns true if this call prevented the deadline from firing. Calling
    /// it after the deadline fired, or a second time, does nothing.
    pub fn cancel(&self) -> bool {
        let won = self.inner.claim(CANCELLED);
        if won {
            self.inner.wake.cancel();
        }
        won
    }

    pub fn state(&self) -> GuardState {
        match self.inner.state.load(Ordering::Acquire) {
            ARMED => GuardState::Armed,
            FIRED => GuardState::Fired,
            _ => GuardState::Cancelled,
        }
    }
}

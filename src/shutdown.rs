//! Graceful termination: stop admissions, then drain live requests.
//!
//! The coordinator gates the submit path and counts requests between
//! submission and resolution so shutdown can wait for the tail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// Shutdown phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Outcome of a drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    TimedOut { remaining: usize },
}

/// Coordinates graceful shutdown across runtime components.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    live: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            live: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track one live request. Returns `None` once draining has begun;
    /// the guard must live until the request resolves.
    pub fn track(&self) -> Option<ShutdownGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            live: Arc::clone(&self.live),
            drained: Arc::clone(&self.drained),
        })
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop admissions and wait for live requests to resolve.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = ShutdownState::Draining;
        let result = self.wait_for_drain(timeout).await;
        *self.state.write() = ShutdownState::Stopped;
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.live_count() == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::TimedOut {
                    remaining: self.live_count(),
                };
            }

            tokio::select! {
                () = self.drained.notified() => {}
                () = tokio::time::sleep(remaining_time) => {
                    let remaining = self.live_count();
                    return if remaining == 0 {
                        ShutdownResult::Complete
                    } else {
                        ShutdownResult::TimedOut { remaining }
                    };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one live request; drops on resolution.
pub struct ShutdownGuard {
    live: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_one();
        }
    }
}

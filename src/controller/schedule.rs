//! Timer primitives owned by the controller.
//!
//! Both primitives spawn the scheduled action as its own task instead of
//! awaiting it inline. An action is therefore free to replace the very timer
//! that fired it: dropping a handle only stops future firings.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Fires `action` every `period`, first firing one full period after start.
/// Stopped when dropped.
pub struct RepeatingTimer {
    handle: JoinHandle<()>,
}

impl RepeatingTimer {
    pub fn start<F, Fut>(period: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tokio::spawn(action());
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Collapses bursts of triggers into one action after a quiet period.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: Mutex::new(None) }
    }

    /// (Re)arm the debouncer. Any action scheduled by an earlier trigger that
    /// has not fired yet is cancelled.
    pub fn trigger<Fut>(&self, action: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let next = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        });
        if let Some(prev) = self.pending.lock().replace(next) {
            prev.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(prev) = self.pending.lock().take() {
            prev.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

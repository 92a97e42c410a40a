//! Shared control state between the tick loop and the control API.
//!
//! All mutable control fields are atomics wrapped in [`Arc`] so the loop
//! reads them lock-free at every suspension point and between agents.
//! A [`Notify`] wakes the loop from a paused wait when a command arrives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// What ended a paused wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The run was resumed.
    Resumed,
    /// Exactly one tick should execute, then pause again.
    Step,
    /// The run should stop.
    Stopped,
}

/// Control state for one run.
#[derive(Debug, Default)]
pub struct EngineControl {
    paused: AtomicBool,
    stop_requested: AtomicBool,
    step_requested: AtomicBool,
    command_notify: Notify,
    tick_delay_ms: AtomicU64,
}

impl EngineControl {
    /// Create control state with the given tick delay.
    pub fn new(tick_delay: Duration) -> Self {
        Self {
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            step_requested: AtomicBool::new(false),
            command_notify: Notify::new(),
            tick_delay_ms: AtomicU64::new(tick_delay.as_millis() as u64),
        }
    }

    /// Whether the run is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause the run; takes effect at the next suspension point.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.command_notify.notify_waiters();
    }

    /// Resume a paused run.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.command_notify.notify_waiters();
    }

    /// Request a clean stop. The current agent's turn completes and the
    /// step is persisted before the loop exits.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.command_notify.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Request a single tick while paused.
    pub fn request_step(&self) {
        self.step_requested.store(true, Ordering::Release);
        self.command_notify.notify_waiters();
    }

    /// Current tick delay.
    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_delay_ms.load(Ordering::Acquire))
    }

    /// Block while paused; returns when resumed, stepped, or stopped.
    pub async fn wait_while_paused(&self) -> WaitOutcome {
        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                return WaitOutcome::Stopped;
            }
            if self.step_requested.swap(false, Ordering::AcqRel) {
                return WaitOutcome::Step;
            }
            if !self.paused.load(Ordering::Acquire) {
                return WaitOutcome::Resumed;
            }
            self.command_notify.notified().await;
        }
    }

    /// Sleep for the configured tick delay, returning early if a control
    /// command arrives.
    pub async fn sleep_tick(&self) {
        let delay = self.tick_delay();
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.command_notify.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_returns_resumed_when_not_paused() {
        let control = EngineControl::new(Duration::ZERO);
        assert_eq!(control.wait_while_paused().await, WaitOutcome::Resumed);
    }

    #[tokio::test]
    async fn resume_wakes_a_paused_waiter() {
        let control = Arc::new(EngineControl::new(Duration::ZERO));
        control.pause();

        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        tokio::task::yield_now().await;
        control.resume();
        assert_eq!(waiter.await.expect("join"), WaitOutcome::Resumed);
    }

    #[tokio::test]
    async fn step_request_wins_over_pause() {
        let control = Arc::new(EngineControl::new(Duration::ZERO));
        control.pause();
        control.request_step();
        assert_eq!(control.wait_while_paused().await, WaitOutcome::Step);
        // The request is consumed.
        control.resume();
        assert_eq!(control.wait_while_paused().await, WaitOutcome::Resumed);
    }

    #[tokio::test]
    async fn stop_wins_over_everything() {
        let control = EngineControl::new(Duration::ZERO);
        control.pause();
        control.request_step();
        control.request_stop();
        assert_eq!(control.wait_while_paused().await, WaitOutcome::Stopped);
    }

    #[tokio::test]
    async fn sleep_tick_is_cancellable() {
        let control = Arc::new(EngineControl::new(Duration::from_secs(30)));
        let sleeper = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.sleep_tick().await })
        };
        tokio::task::yield_now().await;
        control.request_stop();
        // Returns promptly instead of sleeping 30 seconds.
        tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("cancelled sleep")
            .expect("join");
    }
}

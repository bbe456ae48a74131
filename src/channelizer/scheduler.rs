//! Periodic task scheduling on a shared tokio runtime.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::error;

/// Runs periodic tasks at a fixed interval.
#[derive(Clone, Debug)]
pub struct Scheduler {
    handle: Handle,
    interval: Duration,
}

impl Scheduler {
    pub fn new(handle: Handle, interval: Duration) -> Self {
        Self { handle, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `task` now and then once per interval until the returned handle is
    /// cancelled or dropped. A panicking run is logged and the schedule goes
    /// on.
    pub fn schedule<F>(&self, task: F) -> ScheduledTask
    where
        F: Fn() + Send + Sync + 'static,
    {
        let interval = self.interval;
        let handle = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(panic) = catch_unwind(AssertUnwindSafe(&task)) {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("Scheduled task panicked: {}", message);
                }
            }
        });
        ScheduledTask { handle }
    }
}

/// Handle on a periodic task; dropping it cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Stop the task. A run in progress completes; no further run starts.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// Scheduler — repeating-timer seam.
// The engine asks a `Scheduler` for a repeating timer and gets a `TimerHandle`;
// the host delivers each firing back through `Dispenser::on_timer(handle)`.
// Firings carrying a handle other than the engine's active one are ignored,
// so a cancelled timer can never move the level.

use std::time::Duration;

/// Opaque identifier of one repeating timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub trait Scheduler {
    /// Register a timer that fires every `interval` until cancelled.
    fn schedule_repeating(&mut self, interval: Duration) -> TimerHandle;

    /// Stop a timer. Must take effect before returning.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Scheduler whose timers only fire when the host says so.
///
/// Used by tests and by deterministic hosts that step the engine themselves.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    active: Vec<(TimerHandle, Duration)>,
    scheduled_total: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers currently registered, oldest first.
    pub fn active(&self) -> &[(TimerHandle, Duration)] {
        &self.active
    }

    /// Number of timers ever registered.
    pub fn scheduled_total(&self) -> usize {
        self.scheduled_total
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.active.iter().any(|(h, _)| *h == handle)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&mut self, interval: Duration) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.active.push((handle, interval));
        self.scheduled_total += 1;
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.active.retain(|(h, _)| *h != handle);
    }
}

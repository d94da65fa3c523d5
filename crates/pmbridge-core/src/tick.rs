//! Tick handoff between the periodic timer and the main loop.
//!
//! The timer side only marks a tick as due; the main loop picks it up and
//! runs the scheduler to completion. The gate holds at most one pending tick,
//! so ticks fired while the main loop is busy collapse into one.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

pub struct TickGate {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl TickGate {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Mark a tick as due. Safe to call from the timer task.
    pub fn fire(&self) {
        self.signal.signal(());
    }

    /// Consume the pending tick, if any, without waiting.
    pub fn take(&self) -> bool {
        self.signal.try_take().is_some()
    }

    /// Whether a tick is pending.
    pub fn is_pending(&self) -> bool {
        self.signal.signaled()
    }

    /// Wait for the next tick and consume it.
    pub async fn wait(&self) {
        self.signal.wait().await;
    }

    /// Drop a pending tick.
    pub fn reset(&self) {
        self.signal.reset();
    }
}

impl Default for TickGate {
    fn default() -> Self {
        Self::new()
    }
}

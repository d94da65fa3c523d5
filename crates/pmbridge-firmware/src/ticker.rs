//! Periodic tick source

use embassy_time::{Duration, Ticker};
use pmbridge_core::TickGate;

/// Gate shared between the tick task and the main loop.
pub static TICK: TickGate = TickGate::new();

/// Fire the tick gate every `CONFIG.notify_interval_ms`. Does no other work.
#[embassy_executor::task]
pub async fn tick_task(gate: &'static TickGate) {
    let mut ticker = Ticker::every(Duration::from_millis(crate::CONFIG.notify_interval_ms));
    loop {
        ticker.next().await;
        gate.fire();
    }
}

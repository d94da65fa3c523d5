//! Desktop simulator for the pmbridge PM2.5 BLE bridge.
//!
//! Runs the pmbridge-core scheduler against a synthetic dust sensor and a
//! console "central" that decodes every notification the way a phone app
//! would. A background thread plays the hardware timer and fires the tick
//! gate at the configured interval.
//!
//! # Script
//!
//! | Tick | Event                         |
//! |------|-------------------------------|
//! | 2    | Central connects              |
//! | 12   | Central disconnects           |
//! | 16   | Central reconnects            |
//! | 26   | Fault injected, state latches |
//!
//! Run with `RUST_LOG=debug` to see dropped frames and resyncs.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use embassy_futures::block_on;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady};
use log::{debug, info, warn};

use pmbridge_core::config::BridgeConfig;
use pmbridge_core::frame::{FRAME_LEN, Frame};
use pmbridge_core::measurement::{DENSITY_PER_VOLT, PAYLOAD_LEN, REFERENCE_VOLTS};
use pmbridge_core::scheduler::{Notifier, TickOutcome, run_tick};
use pmbridge_core::{ConnectionEvent, DeviceState, Measurement, TickGate};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Number of scheduler ticks to run before exiting.
const SIM_TICKS: u32 = 30;

/// Sensor frames emitted per tick interval.
const FRAMES_PER_TICK: usize = 3;

/// Every Nth frame carries a bad checksum.
const CORRUPT_EVERY: u32 = 11;

/// Every Nth frame loses its last byte on the wire.
const TRUNCATE_EVERY: u32 = 17;

/// Depth of the simulated UART receive FIFO.
const UART_FIFO_DEPTH: usize = 128;

/// Tick at which a fault is injected to exercise the abnormal latch.
const FAULT_TICK: u32 = 26;

/// Ticks at which the central connects or disconnects.
fn scripted_connection(tick: u32) -> Option<ConnectionEvent> {
    match tick {
        2 | 16 => Some(ConnectionEvent::Connected),
        12 => Some(ConnectionEvent::Disconnected),
        _ => None,
    }
}

static TICK: TickGate = TickGate::new();

// ---------------------------------------------------------------------------
// Synthetic sensor
// ---------------------------------------------------------------------------

/// Generates sensor frames from a slowly varying concentration.
struct MockSensor {
    /// Seconds since the simulation started
    elapsed_secs: f64,
    frames: u32,
}

impl MockSensor {
    fn new() -> Self {
        Self {
            elapsed_secs: 0.0,
            frames: 0,
        }
    }

    /// Advance the clock and return the bytes of the next frame as they
    /// arrive on the wire (occasionally corrupted or truncated).
    fn next_frame(&mut self, dt_secs: f64) -> ([u8; FRAME_LEN], usize) {
        self.elapsed_secs += dt_secs;
        self.frames += 1;
        let t = self.elapsed_secs;

        // PM2.5: 35-115 ug/m3 with a faster ripple on top
        let pm25 = 75.0 + 35.0 * (t / 20.0).sin() + 5.0 * (t / 3.0).cos();
        let counts = (pm25 / DENSITY_PER_VOLT / REFERENCE_VOLTS * 1024.0) as u16;

        let mut frame = Frame::encode(counts, 0x0C80);
        let mut len = FRAME_LEN;

        if self.frames % CORRUPT_EVERY == 0 {
            frame[5] = frame[5].wrapping_add(1);
        }
        if self.frames % TRUNCATE_EVERY == 0 {
            len -= 1;
        }

        (frame, len)
    }
}

// ---------------------------------------------------------------------------
// Simulated UART
// ---------------------------------------------------------------------------

/// Receive side of a UART with a bounded FIFO that drops on overrun.
struct SimSerial {
    fifo: VecDeque<u8>,
    overruns: usize,
}

impl SimSerial {
    fn new() -> Self {
        Self {
            fifo: VecDeque::with_capacity(UART_FIFO_DEPTH),
            overruns: 0,
        }
    }

    fn receive(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.fifo.len() == UART_FIFO_DEPTH {
                self.overruns += 1;
                continue;
            }
            self.fifo.push_back(b);
        }
    }
}

impl ErrorType for SimSerial {
    type Error = ErrorKind;
}

impl ReadReady for SimSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.fifo.is_empty())
    }
}

impl Read for SimSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.fifo.len());
        for (slot, b) in buf.iter_mut().zip(self.fifo.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Console central
// ---------------------------------------------------------------------------

/// Stands in for the connected central: decodes and prints each payload.
#[derive(Default)]
struct ConsoleCentral {
    received: usize,
}

impl Notifier for ConsoleCentral {
    type Error = ();

    async fn notify(&mut self, payload: &[u8; PAYLOAD_LEN]) -> Result<(), ()> {
        self.received += 1;
        match Measurement::from_payload(payload) {
            Ok(m) => info!("central <- {:02X?} = {:.1} ug/m3", payload, m.pm25),
            Err(e) => warn!("central <- undecodable payload {:02X?}: {}", payload, e),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let config = BridgeConfig::DEFAULT;
    let interval = Duration::from_millis(config.notify_interval_ms);

    info!("Starting pmbridge simulator");
    match config.advertised_name([0x24, 0x0A, 0xC4, 0x5E, 0x11, 0x7A]) {
        Ok(name) => info!("Advertising as {}", name),
        Err(e) => warn!("{}", e),
    }
    info!(
        "Tick every {} ms, {} ticks, sensor at {} baud",
        config.notify_interval_ms, SIM_TICKS, config.sensor_baud_rate
    );

    // Hardware timer: only marks ticks as due
    thread::spawn(move || {
        loop {
            thread::sleep(interval);
            TICK.fire();
        }
    });

    let mut state = DeviceState::new();
    let mut sensor = MockSensor::new();
    let mut serial = SimSerial::new();
    let mut central = ConsoleCentral::default();
    let frame_dt = interval.as_secs_f64() / FRAMES_PER_TICK as f64;

    for tick in 0..SIM_TICKS {
        block_on(TICK.wait());

        if let Some(event) = scripted_connection(tick) {
            state.apply(event);
        }
        if tick == FAULT_TICK {
            state.latch_abnormal();
        }

        for _ in 0..FRAMES_PER_TICK {
            let (frame, len) = sensor.next_frame(frame_dt);
            serial.receive(&frame[..len]);
        }

        match block_on(run_tick(&mut state, &mut serial, &mut central)) {
            Ok(TickOutcome::Skipped(reason)) => {
                debug!("tick {}: skipped ({:?})", tick, reason);
            }
            Ok(TickOutcome::Notified { frames, .. }) => {
                debug!("tick {}: {} frame(s) decoded", tick, frames);
            }
            Err(e) => warn!("tick {}: {}", tick, e),
        }
    }

    info!(
        "Simulator exiting: state {:?}, {} notifications, {} sensor frames, {} bytes lost to overrun",
        state.run_state(),
        central.received,
        sensor.frames,
        serial.overruns
    );
}

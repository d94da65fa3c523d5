//! Hardware-independent core library for pmbridge
//!
//! This crate contains all platform-agnostic logic for the PM2.5 BLE bridge:
//! the serial frame parser, the measurement record and its notification
//! payload, the device state machine, the tick gate shared between the timer
//! and the main loop, and the notify scheduler.
//!
//! It is `#![no_std]` so it compiles on both the ESP32 firmware target and
//! desktop hosts (for the simulator and tests).

#![no_std]

pub mod config;
pub mod error;
pub mod frame;
pub mod measurement;
pub mod rx_buffer;
pub mod scheduler;
pub mod state;
pub mod tick;

pub use error::BridgeError;
pub use frame::{Frame, FrameParser};
pub use measurement::Measurement;
pub use rx_buffer::{RxBuffer, RxReader};
pub use state::{ConnectionEvent, DeviceState, RunState};
pub use tick::TickGate;

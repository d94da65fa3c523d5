//! ESP32 firmware-specific modules for pmbridge
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: the UART adapter for the dust sensor, the GATT server and
//! advertising on top of `trouble-host`, and the tick timer task.

#![no_std]

pub mod ble;
pub mod serial;
pub mod ticker;

use pmbridge_core::config::{BridgeConfig, DEFAULT_DEVICE_NAME};

/// Bridge configuration, with the device name optionally overridden at build
/// time through `PMBRIDGE_DEVICE_NAME` (see `build.rs`).
pub const CONFIG: BridgeConfig<'static> =
    BridgeConfig::DEFAULT.with_device_name(match option_env!("PMBRIDGE_DEVICE_NAME") {
        Some(name) => name,
        None => DEFAULT_DEVICE_NAME,
    });

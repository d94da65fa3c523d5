use core::fmt::Write;

use heapless::String;

use crate::error::ConfigError;

/// Device name used when the build does not override it.
pub const DEFAULT_DEVICE_NAME: &str = "PM25-Bridge";

/// Longest local name that still fits next to the flags in a 31-byte
/// advertising packet.
pub const MAX_ADVERTISED_NAME_LEN: usize = 29;

/// Compile-time configuration of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig<'a> {
    pub device_name: &'a str,
    /// Interval between scheduler ticks
    pub notify_interval_ms: u64,
    /// UART baud rate of the dust sensor
    pub sensor_baud_rate: u32,
}

impl BridgeConfig<'static> {
    pub const DEFAULT: Self = Self {
        device_name: DEFAULT_DEVICE_NAME,
        notify_interval_ms: 1000,
        sensor_baud_rate: 2400,
    };
}

impl<'a> BridgeConfig<'a> {
    pub const fn with_device_name(self, device_name: &'a str) -> Self {
        Self {
            device_name,
            ..self
        }
    }

    /// Build the advertised name: the device name plus the low three bytes
    /// of the MAC address, e.g. `PM25-Bridge-A1B2C3`.
    pub fn advertised_name(
        &self,
        mac: [u8; 6],
    ) -> Result<String<MAX_ADVERTISED_NAME_LEN>, ConfigError> {
        let mut name = String::new();
        write!(
            name,
            "{}-{:02X}{:02X}{:02X}",
            self.device_name, mac[3], mac[4], mac[5]
        )
        .map_err(|_| ConfigError::NameTooLong)?;
        Ok(name)
    }
}

impl Default for BridgeConfig<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

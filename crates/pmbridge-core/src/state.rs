//! Device-wide state owned by the main control loop

use log::{info, warn};

use crate::frame::FrameParser;
use crate::measurement::Measurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Disconnected,
    ConnectedIdle,
    ConnectedNotifying,
    /// Latched. Only a device reset leaves this state.
    Abnormal,
}

/// Connection changes reported by the BLE stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// Main device state container
///
/// Holds the connection flag, the abnormal latch, the latest measurement and
/// the frame parser. The main loop owns it and lends it to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    connected: bool,
    notifying: bool,
    abnormal: bool,
    measurement: Measurement,
    parser: FrameParser,
}

impl DeviceState {
    pub const fn new() -> Self {
        Self {
            connected: false,
            notifying: false,
            abnormal: false,
            measurement: Measurement::new(0.0),
            parser: FrameParser::new(),
        }
    }

    pub fn run_state(&self) -> RunState {
        if self.abnormal {
            RunState::Abnormal
        } else if !self.connected {
            RunState::Disconnected
        } else if self.notifying {
            RunState::ConnectedNotifying
        } else {
            RunState::ConnectedIdle
        }
    }

    /// Apply a connection event from the BLE stack.
    pub fn apply(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                info!("Central connected");
                self.connected = true;
            }
            ConnectionEvent::Disconnected => {
                info!("Central disconnected");
                self.connected = false;
                self.notifying = false;
            }
        }
    }

    /// Latch the abnormal state. All further ticks are skipped until reset.
    pub fn latch_abnormal(&mut self) {
        if !self.abnormal {
            warn!("Abnormal state latched, notifications stopped until reset");
        }
        self.abnormal = true;
        self.notifying = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_abnormal(&self) -> bool {
        self.abnormal
    }

    /// Whether a tick should drain serial input and notify.
    pub fn is_active(&self) -> bool {
        self.connected && !self.abnormal
    }

    pub fn measurement(&self) -> Measurement {
        self.measurement
    }

    /// Run one serial byte through the parser, keeping the newest reading.
    pub fn ingest(&mut self, byte: u8) -> Option<Measurement> {
        let m = self.parser.feed(byte)?;
        self.measurement = m;
        Some(m)
    }

    pub(crate) fn set_notifying(&mut self, notifying: bool) {
        self.notifying = notifying && self.is_active();
    }
}

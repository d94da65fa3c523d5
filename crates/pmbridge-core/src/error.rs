//! Error types shared by the bridge components

use thiserror_no_std::Error;

/// Why a collected frame was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Checksum mismatch: expected {expected:#04x}, frame carried {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("Bad terminator byte {0:#04x}")]
    Terminator(u8),
    #[error("Frame does not begin with the start marker (found {0:#04x})")]
    MissingStart(u8),
}

/// Errors surfaced by a scheduler tick.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Serial read failed: {0:?}")]
    Serial(embedded_io::ErrorKind),
    #[error("Payload encoding failed: {0}")]
    Encode(postcard::Error),
    #[error("Notification was not delivered")]
    Notify,
}

impl From<postcard::Error> for BridgeError {
    fn from(value: postcard::Error) -> Self {
        Self::Encode(value)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Advertised name does not fit in the advertising packet")]
    NameTooLong,
}

//! Serial frame parsing for the PM2.5 dust sensor.
//!
//! The sensor streams fixed 7-byte frames:
//!
//! ```text
//! +------+--------+--------+--------+--------+----------+------+
//! | 0xAA | Vout H | Vout L | Vref H | Vref L | checksum | 0xFF |
//! +------+--------+--------+--------+--------+----------+------+
//! ```
//!
//! `checksum` is the byte-wise sum of the four payload bytes, modulo 256.
//! The start marker is privileged: seeing it anywhere restarts the frame,
//! which is how the parser resynchronizes after a dropped byte.

use log::debug;

use crate::error::FrameError;
use crate::measurement::Measurement;

/// Byte that opens every frame.
pub const START_MARKER: u8 = 0xAA;

/// Byte that closes every frame.
pub const TERMINATOR: u8 = 0xFF;

/// Length of a complete frame.
pub const FRAME_LEN: usize = 7;

const CHECKSUM_INDEX: usize = 5;
const LAST_INDEX: usize = FRAME_LEN - 1;

/// A validated sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    raw: [u8; FRAME_LEN],
}

impl Frame {
    /// Validate a complete 7-byte window.
    pub fn parse(raw: [u8; FRAME_LEN]) -> Result<Self, FrameError> {
        if raw[0] != START_MARKER {
            return Err(FrameError::MissingStart(raw[0]));
        }

        let expected = Self::payload_sum(&raw);
        let actual = raw[CHECKSUM_INDEX];
        if actual != expected {
            return Err(FrameError::Checksum { expected, actual });
        }

        if raw[LAST_INDEX] != TERMINATOR {
            return Err(FrameError::Terminator(raw[LAST_INDEX]));
        }

        Ok(Self { raw })
    }

    /// Build a well-formed frame from raw counts.
    pub fn encode(vout: u16, vref: u16) -> [u8; FRAME_LEN] {
        let [vout_h, vout_l] = vout.to_be_bytes();
        let [vref_h, vref_l] = vref.to_be_bytes();
        let mut raw = [START_MARKER, vout_h, vout_l, vref_h, vref_l, 0, TERMINATOR];
        raw[CHECKSUM_INDEX] = Self::payload_sum(&raw);
        raw
    }

    fn payload_sum(raw: &[u8; FRAME_LEN]) -> u8 {
        raw[1..CHECKSUM_INDEX]
            .iter()
            .fold(0u8, |sum, &b| sum.wrapping_add(b))
    }

    /// Output voltage counts (big-endian bytes 1 and 2).
    pub fn vout_counts(&self) -> u16 {
        u16::from_be_bytes([self.raw[1], self.raw[2]])
    }

    /// Reference counts (bytes 3 and 4). Not used by the conversion.
    pub fn vref_counts(&self) -> u16 {
        u16::from_be_bytes([self.raw[3], self.raw[4]])
    }

    pub fn checksum(&self) -> u8 {
        self.raw[CHECKSUM_INDEX]
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.raw
    }

    /// Physical reading carried by this frame.
    pub fn measurement(&self) -> Measurement {
        Measurement::from_vout_counts(self.vout_counts())
    }
}

/// Streaming frame parser fed one byte at a time.
///
/// Between frames the parser is hunting: bytes other than the start marker
/// are discarded, so the write index is bounded by the frame length.
#[derive(Debug, Clone, Default)]
pub struct FrameParser {
    buf: [u8; FRAME_LEN],
    /// Index of the last byte written, `None` while hunting.
    index: Option<usize>,
}

impl FrameParser {
    pub const fn new() -> Self {
        Self {
            buf: [0; FRAME_LEN],
            index: None,
        }
    }

    /// Whether a start marker has been seen and a frame is being collected.
    pub fn is_synced(&self) -> bool {
        self.index.is_some()
    }

    /// Drop any partial frame and go back to hunting.
    pub fn reset(&mut self) {
        self.buf = [0; FRAME_LEN];
        self.index = None;
    }

    /// Push one byte. Returns the frame it completed, if any.
    pub fn push(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        if byte == START_MARKER {
            if self.index.is_some_and(|i| i > 0) {
                debug!("start marker mid-frame, resyncing");
            }
            self.buf = [0; FRAME_LEN];
            self.buf[0] = byte;
            self.index = Some(0);
            return Ok(None);
        }

        let Some(last) = self.index else {
            return Ok(None);
        };

        let index = last + 1;
        self.buf[index] = byte;

        if index < LAST_INDEX {
            self.index = Some(index);
            return Ok(None);
        }

        let raw = self.buf;
        self.reset();
        Frame::parse(raw).map(Some)
    }

    /// Push one byte and return the measurement of a completed valid frame.
    ///
    /// Malformed frames are dropped and only reported at debug level.
    pub fn feed(&mut self, byte: u8) -> Option<Measurement> {
        match self.push(byte) {
            Ok(frame) => frame.map(|f| f.measurement()),
            Err(e) => {
                debug!("dropping frame: {}", e);
                None
            }
        }
    }
}

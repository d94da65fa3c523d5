//! PM2.5 measurement record and its BLE notification payload.
//!
//! The payload is the postcard encoding of [`Measurement`], which for a single
//! `f64` field is exactly the 8-byte little-endian IEEE-754 value. Centrals
//! must decode it as such.

use serde::{Deserialize, Serialize};

/// Sensor ADC full-scale count.
pub const ADC_FULL_SCALE: f64 = 1024.0;

/// Sensor reference voltage in volts.
pub const REFERENCE_VOLTS: f64 = 5.0;

/// Conversion factor from output voltage to concentration (ug/m3 per volt).
pub const DENSITY_PER_VOLT: f64 = 700.0;

/// Size of the notification payload in bytes.
pub const PAYLOAD_LEN: usize = 8;

/// Latest PM2.5 concentration held by the device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    /// Concentration in ug/m3
    pub pm25: f64,
}

impl Measurement {
    pub const fn new(pm25: f64) -> Self {
        Self { pm25 }
    }

    /// Convert the sensor's raw output-voltage counts into a concentration.
    pub fn from_vout_counts(counts: u16) -> Self {
        let volts = f64::from(counts) / ADC_FULL_SCALE * REFERENCE_VOLTS;
        Self::new(volts * DENSITY_PER_VOLT)
    }

    /// Output voltage implied by this concentration.
    pub fn volts(&self) -> f64 {
        self.pm25 / DENSITY_PER_VOLT
    }

    /// Encode the measurement as the fixed-size notification payload.
    pub fn to_payload(&self) -> Result<[u8; PAYLOAD_LEN], postcard::Error> {
        let mut payload = [0u8; PAYLOAD_LEN];
        let used = postcard::to_slice(self, &mut payload)?.len();
        if used != PAYLOAD_LEN {
            return Err(postcard::Error::SerializeBufferFull);
        }
        Ok(payload)
    }

    /// Decode a notification payload, as a central would.
    pub fn from_payload(payload: &[u8]) -> Result<Self, postcard::Error> {
        if payload.len() != PAYLOAD_LEN {
            return Err(postcard::Error::DeserializeUnexpectedEnd);
        }
        postcard::from_bytes(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_from_counts() {
        // 256 counts -> 1.25 V -> 875 ug/m3
        let m = Measurement::from_vout_counts(256);
        assert_eq!(m.pm25, 875.0);
        assert_eq!(m.volts(), 1.25);
    }

    #[test]
    fn test_zero_counts() {
        assert_eq!(Measurement::from_vout_counts(0), Measurement::default());
    }

    #[test]
    fn test_payload_is_little_endian_f64() {
        let payload = Measurement::new(875.0).to_payload().unwrap();
        assert_eq!(payload, 875.0f64.to_le_bytes());
    }

    #[test]
    fn test_payload_decodes_like_a_central() {
        let payload = 12.5f64.to_le_bytes();
        let m = Measurement::from_payload(&payload).unwrap();
        assert_eq!(m.pm25, 12.5);
    }

    #[test]
    fn test_short_payload_rejected() {
        assert!(Measurement::from_payload(&[0u8; 4]).is_err());
    }
}

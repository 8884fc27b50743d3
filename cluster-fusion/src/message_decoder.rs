//! Payload decoding for the speed and rpm frames
//!
//! The speed frame exists in two encodings on the bus:
//! - legacy: byte 0 is an unsigned km/h value and bytes 1..3 are zero
//!   (e.g. `11 00 00 00 ...` is 17 km/h)
//! - float: bytes 0..3 are a little-endian IEEE-754 f32 km/h value
//!
//! The rpm frame always carries a little-endian f32 in bytes 0..3.

use byteorder::{LittleEndian, ReadBytesExt};

/// Minimum payload length for both frame kinds
pub const MIN_PAYLOAD_LEN: usize = 4;

/// Speed encoding detected in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedEncoding {
    LegacyInteger,
    Float32,
}

/// Stateless payload decoder
pub struct PayloadDecoder;

impl PayloadDecoder {
    /// Decide which encoding a speed payload uses
    ///
    /// The legacy pattern is checked first: `[n, 0, 0, 0]` is also a valid
    /// (denormal) f32, so the more specific pattern must win.
    pub fn speed_encoding(data: &[u8]) -> Option<SpeedEncoding> {
        if data.len() < MIN_PAYLOAD_LEN {
            return None;
        }
        if data[1..4] == [0, 0, 0] {
            Some(SpeedEncoding::LegacyInteger)
        } else {
            Some(SpeedEncoding::Float32)
        }
    }

    /// Decode a speed payload in km/h
    pub fn decode_speed(data: &[u8]) -> Option<f64> {
        match Self::speed_encoding(data)? {
            SpeedEncoding::LegacyInteger => Some(f64::from(data[0])),
            SpeedEncoding::Float32 => Self::read_f32_le(data),
        }
    }

    /// Decode an rpm payload
    pub fn decode_rpm(data: &[u8]) -> Option<f64> {
        if data.len() < MIN_PAYLOAD_LEN {
            return None;
        }
        Self::read_f32_le(data)
    }

    /// Read a little-endian f32 from the first four bytes
    ///
    /// NaN and infinities are rejected as malformed payloads.
    fn read_f32_le(mut data: &[u8]) -> Option<f64> {
        let value = data.read_f32::<LittleEndian>().ok()?;
        if value.is_finite() {
            Some(f64::from(value))
        } else {
            log::trace!("Discarding non-finite float payload: {}", value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_speed_takes_precedence() {
        let data = [17, 0, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD];
        assert_eq!(
            PayloadDecoder::speed_encoding(&data),
            Some(SpeedEncoding::LegacyInteger)
        );
        assert_eq!(PayloadDecoder::decode_speed(&data), Some(17.0));
    }

    #[test]
    fn test_legacy_speed_max_byte() {
        assert_eq!(PayloadDecoder::decode_speed(&[255, 0, 0, 0]), Some(255.0));
        assert_eq!(PayloadDecoder::decode_speed(&[0, 0, 0, 0]), Some(0.0));
    }

    #[test]
    fn test_float_speed() {
        let data = 12.5f32.to_le_bytes();
        assert_eq!(
            PayloadDecoder::speed_encoding(&data),
            Some(SpeedEncoding::Float32)
        );
        assert_eq!(PayloadDecoder::decode_speed(&data), Some(12.5));
    }

    #[test]
    fn test_negative_float_speed() {
        let data = (-3.25f32).to_le_bytes();
        assert_eq!(PayloadDecoder::decode_speed(&data), Some(-3.25));
    }

    #[test]
    fn test_short_payloads_are_ignored() {
        assert_eq!(PayloadDecoder::decode_speed(&[17, 0, 0]), None);
        assert_eq!(PayloadDecoder::decode_speed(&[]), None);
        assert_eq!(PayloadDecoder::decode_rpm(&[1, 2, 3]), None);
    }

    #[test]
    fn test_rpm_is_always_float() {
        // Same bytes as a legacy speed frame, but rpm has no integer form
        let data = [17, 0, 0, 0];
        let rpm = PayloadDecoder::decode_rpm(&data).unwrap();
        assert!(rpm > 0.0 && rpm < 1e-30);

        let data = 3200.0f32.to_le_bytes();
        assert_eq!(PayloadDecoder::decode_rpm(&data), Some(3200.0));
    }

    #[test]
    fn test_non_finite_floats_are_malformed() {
        assert_eq!(PayloadDecoder::decode_rpm(&f32::NAN.to_le_bytes()), None);
        assert_eq!(
            PayloadDecoder::decode_speed(&f32::INFINITY.to_le_bytes()),
            None
        );
    }
}

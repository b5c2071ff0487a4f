//! Decoding of measurement notifications.
//!
//! The monitor speaks a proprietary protocol which has not been documented or
//! fully reverse engineered. Two candidate layouts are recognised: a frame tagged
//! with a vendor marker byte and an untagged frame read at fixed offsets. Because
//! neither is confirmed, every decoded value must pass a plausibility check
//! before it is accepted.

mod fixed_offset_frame;
mod vendor_frame;

use fixed_offset_frame::FixedOffsetFrame;
use vendor_frame::VendorFrame;

/// Notifications shorter than this are never decoded
pub const MIN_FRAME_LEN: usize = vendor_frame::LEN;

const SYSTOLIC_RANGE: std::ops::RangeInclusive<u16> = 50..=250;
const DIASTOLIC_RANGE: std::ops::RangeInclusive<u16> = 30..=150;
const PULSE_MAX: u16 = 200;

/// The values carried by one measurement notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// mmHg
    pub systolic: u16,
    /// mmHg
    pub diastolic: u16,
    /// Beats per minute, 0 if the frame did not carry it
    pub pulse: u16,
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} mmHg, pulse {}", self.systolic, self.diastolic, self.pulse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("payload too short: {len} bytes")]
    TooShort { len: usize },
    #[error("implausible values {0}")]
    Implausible(Measurement),
    #[error("unrecognized frame marker 0x{marker:02x}")]
    UnrecognizedShape { marker: u8 },
}

/// Decodes raw notification payloads into [`Measurement`]s.
///
/// Each call sees exactly one notification. Nothing is buffered between calls.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    fixed_offset_fallback: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self { fixed_offset_fallback: true }
    }
}

impl Decoder {
    /// When `fixed_offset_fallback` is false only vendor tagged frames are accepted
    pub fn new(fixed_offset_fallback: bool) -> Self {
        Self { fixed_offset_fallback }
    }

    pub fn decode(&self, data: &[u8]) -> Result<Measurement, DecodeFailure> {
        if data.len() < MIN_FRAME_LEN {
            return Err(DecodeFailure::TooShort { len: data.len() });
        }

        let measurement = if let Some(frame) = VendorFrame::new(data) {
            Measurement {
                systolic: frame.systolic(),
                diastolic: frame.diastolic(),
                pulse: frame.pulse(),
            }
        } else if let Some(frame) = FixedOffsetFrame::new(data).filter(|_| self.fixed_offset_fallback) {
            Measurement {
                systolic: frame.systolic(),
                diastolic: frame.diastolic(),
                pulse: frame.pulse(),
            }
        } else {
            return Err(DecodeFailure::UnrecognizedShape { marker: data[0] });
        };

        if !is_plausible(&measurement) {
            return Err(DecodeFailure::Implausible(measurement));
        }

        Ok(measurement)
    }
}

/// Decode with the default [`Decoder`]
pub fn decode(data: &[u8]) -> Result<Measurement, DecodeFailure> {
    Decoder::default().decode(data)
}

fn is_plausible(m: &Measurement) -> bool {
    SYSTOLIC_RANGE.contains(&m.systolic) && DIASTOLIC_RANGE.contains(&m.diastolic) && m.pulse <= PULSE_MAX
}

#[cfg(test)]
fn vendor_payload(systolic: u16, diastolic: u16, pulse: u8) -> Vec<u8> {
    let mut data = vec![0xFD];
    data.extend_from_slice(&systolic.to_le_bytes());
    data.extend_from_slice(&diastolic.to_le_bytes());
    data.push(pulse);
    data
}

#[test]
fn test_decode_vendor_frame() {
    let data = hex::decode("fd9600500048").unwrap();
    let m = decode(&data).unwrap();
    assert_eq!(m, Measurement { systolic: 150, diastolic: 80, pulse: 72 });
}

#[test]
fn test_decode_vendor_frame_recovers_values() {
    for (systolic, diastolic, pulse) in [(50, 30, 0), (118, 76, 64), (250, 150, 200)] {
        let m = decode(&vendor_payload(systolic, diastolic, pulse)).unwrap();
        assert_eq!(m, Measurement { systolic, diastolic, pulse: pulse as u16 });
    }
}

#[test]
fn test_decode_too_short() {
    for len in 0..MIN_FRAME_LEN {
        let data = vec![0xFD; len];
        assert_eq!(decode(&data), Err(DecodeFailure::TooShort { len }));
    }
    // untagged, and plausible if it were read at fixed offsets
    let data = hex::decode("1e78005000").unwrap();
    assert_eq!(decode(&data), Err(DecodeFailure::TooShort { len: 5 }));
}

#[test]
fn test_decode_implausible() {
    let data = vendor_payload(10, 80, 72);
    assert_eq!(
        decode(&data),
        Err(DecodeFailure::Implausible(Measurement { systolic: 10, diastolic: 80, pulse: 72 }))
    );
    assert!(matches!(decode(&vendor_payload(120, 151, 72)), Err(DecodeFailure::Implausible(_))));
    assert!(matches!(decode(&vendor_payload(120, 80, 201)), Err(DecodeFailure::Implausible(_))));
}

#[test]
fn test_decode_vendor_marker_does_not_fall_back() {
    // The pulse byte is implausible, the fixed offset pulse field is not
    let mut data = vendor_payload(120, 80, 250);
    data.extend_from_slice(&[0; 8]);
    data.extend_from_slice(&70u16.to_le_bytes());
    assert_eq!(data.len(), 16);
    assert!(matches!(decode(&data), Err(DecodeFailure::Implausible(_))));
}

#[test]
fn test_decode_fixed_offset_fallback() {
    let data = hex::decode("1e780050000000000000000000004200").unwrap();
    let m = decode(&data).unwrap();
    assert_eq!(m, Measurement { systolic: 120, diastolic: 80, pulse: 66 });

    let data = hex::decode("1e7800500000").unwrap();
    let m = decode(&data).unwrap();
    assert_eq!(m, Measurement { systolic: 120, diastolic: 80, pulse: 0 });
}

#[test]
fn test_decode_without_fallback() {
    let decoder = Decoder::new(false);
    let data = hex::decode("1e7800500000").unwrap();
    assert_eq!(decoder.decode(&data), Err(DecodeFailure::UnrecognizedShape { marker: 0x1e }));

    let data = hex::decode("fd9600500048").unwrap();
    assert!(decoder.decode(&data).is_ok());
}

#[test]
fn test_decode_noise_never_panics() {
    let mut seed: u32 = 0x1234_5678;
    for len in 0..40 {
        let data: Vec<u8> = (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            })
            .collect();
        let _ = decode(&data);
    }
}

/// Shorter notifications are not measurement frames
pub(crate) const MIN_LEN: usize = super::MIN_FRAME_LEN;

/// Shortest frame which also carries the pulse field
pub(crate) const LEN_WITH_PULSE: usize = 16;

/// A measurement frame without a recognised marker, read at fixed offsets.
///
/// Byte     | Meaning
/// 0        | Unknown
/// 1..=2    | Systolic mmHg, little endian
/// 3..=4    | Diastolic mmHg, little endian
/// 5..=13   | Unknown
/// 14..=15  | Pulse bpm, little endian. Treated as 0 when the frame is shorter.
///
/// This mirrors the layout of the standard GATT blood pressure measurement
/// characteristic with the SFLOAT exponent ignored, which is as much as we
/// can say about it.
pub(crate) struct FixedOffsetFrame<'a>(&'a [u8]);

impl<'a> FixedOffsetFrame<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < MIN_LEN {
            return None;
        }
        Some(Self(data))
    }

    pub fn systolic(&self) -> u16 {
        u16::from_le_bytes([self.0[1], self.0[2]])
    }

    pub fn diastolic(&self) -> u16 {
        u16::from_le_bytes([self.0[3], self.0[4]])
    }

    pub fn pulse(&self) -> u16 {
        if self.0.len() < LEN_WITH_PULSE {
            return 0;
        }
        u16::from_le_bytes([self.0[14], self.0[15]])
    }
}

#[test]
fn test_fixed_offset_frame_with_pulse() {
    let data = hex::decode("1e780050000000000000000000004200").unwrap();
    let frame = FixedOffsetFrame::new(&data).unwrap();
    assert_eq!(frame.systolic(), 120);
    assert_eq!(frame.diastolic(), 80);
    assert_eq!(frame.pulse(), 66);
}

#[test]
fn test_fixed_offset_frame_without_pulse() {
    let data = hex::decode("1e78005000000000").unwrap();
    let frame = FixedOffsetFrame::new(&data).unwrap();
    assert_eq!(frame.systolic(), 120);
    assert_eq!(frame.diastolic(), 80);
    assert_eq!(frame.pulse(), 0);
}

#[test]
fn test_fixed_offset_frame_pulse_needs_both_bytes() {
    // 15 bytes, so the pulse field is cut in half
    let data = hex::decode("1e7800500000000000000000000042").unwrap();
    let frame = FixedOffsetFrame::new(&data).unwrap();
    assert_eq!(frame.pulse(), 0);
}

#[test]
fn test_fixed_offset_frame_too_short() {
    let data = hex::decode("1e78005000").unwrap();
    assert!(FixedOffsetFrame::new(&data).is_none());
    assert!(FixedOffsetFrame::new(&hex::decode("1e7800500000").unwrap()).is_some());
}

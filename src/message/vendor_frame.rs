/// First byte values which tag a vendor measurement frame
pub(crate) const MARKERS: [u8; 2] = [0xFD, 0xFE];

/// Marker, systolic (2), diastolic (2), pulse (1)
pub(crate) const LEN: usize = 6;

/// A measurement frame tagged with one of the vendor markers.
///
/// Byte   | Meaning
/// 0      | Marker, 0xFD or 0xFE
/// 1..=2  | Systolic mmHg, little endian
/// 3..=4  | Diastolic mmHg, little endian
/// 5      | Pulse bpm
///
/// Any trailing bytes are ignored. The layout was inferred from captured
/// notifications and has not been confirmed against vendor documentation.
pub(crate) struct VendorFrame<'a>(&'a [u8]);

impl<'a> VendorFrame<'a> {
    /// Returns `None` if the data is too short or does not start with a marker
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < LEN || !MARKERS.contains(&data[0]) {
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
        self.0[5] as u16
    }
}

#[test]
fn test_vendor_frame_fields() {
    let data = hex::decode("fe7d004b0041ffff").unwrap();
    let frame = VendorFrame::new(&data).unwrap();
    assert_eq!(frame.systolic(), 125);
    assert_eq!(frame.diastolic(), 75);
    assert_eq!(frame.pulse(), 65);
}

#[test]
fn test_vendor_frame_requires_marker() {
    let data = hex::decode("017d004b0041").unwrap();
    assert!(VendorFrame::new(&data).is_none());
}

#[test]
fn test_vendor_frame_requires_length() {
    let data = hex::decode("fd7d004b00").unwrap();
    assert!(VendorFrame::new(&data).is_none());
}

use chrono::DateTime;
use chrono::Local;
use serde::Serialize;
use serde::Serializer;

use crate::classification::classify;
use crate::classification::SeverityTier;
use crate::message::DecodeFailure;
use crate::message::Decoder;

/// A decoded and classified blood pressure measurement.
///
/// The only way to obtain one is [`Reading::decode`], so every `Reading` has
/// passed the plausibility checks of the [`Decoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    systolic: u16,
    diastolic: u16,
    pulse: u16,
    timestamp: DateTime<Local>,
    classification: SeverityTier,
    #[serde(serialize_with = "serialize_hex")]
    raw: Vec<u8>,
}

impl Reading {
    /// Decode one notification payload, stamping it with the time it was received.
    pub fn decode(decoder: &Decoder, raw: &[u8], timestamp: DateTime<Local>) -> Result<Self, DecodeFailure> {
        let m = decoder.decode(raw)?;
        Ok(Self {
            systolic: m.systolic,
            diastolic: m.diastolic,
            pulse: m.pulse,
            timestamp,
            classification: classify(m.systolic.into(), m.diastolic.into()),
            raw: raw.to_vec(),
        })
    }

    /// Systolic pressure in mmHg
    pub fn systolic(&self) -> u16 {
        self.systolic
    }

    /// Diastolic pressure in mmHg
    pub fn diastolic(&self) -> u16 {
        self.diastolic
    }

    /// Pulse in beats per minute
    pub fn pulse(&self) -> u16 {
        self.pulse
    }

    /// When the notification was processed. The monitor's own clock is not used.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn classification(&self) -> SeverityTier {
        self.classification
    }

    /// The notification payload this reading was decoded from
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

fn serialize_hex<S: Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(raw))
}

#[test]
fn test_reading_from_vendor_frame() {
    let raw = hex::decode("fd9600500048").unwrap();
    let reading = Reading::decode(&Decoder::default(), &raw, Local::now()).unwrap();
    assert_eq!(reading.systolic(), 150);
    assert_eq!(reading.diastolic(), 80);
    assert_eq!(reading.pulse(), 72);
    assert_eq!(reading.classification(), SeverityTier::Stage1High);
    assert_eq!(reading.classification().color(), "#FF9800");
    assert_eq!(reading.raw(), &raw[..]);
}

#[test]
fn test_reading_rejects_short_payload() {
    let raw = hex::decode("fd96").unwrap();
    let result = Reading::decode(&Decoder::default(), &raw, Local::now());
    assert_eq!(result, Err(DecodeFailure::TooShort { len: 2 }));
}

#[test]
fn test_reading_json() {
    let raw = hex::decode("fe7800460041").unwrap();
    let reading = Reading::decode(&Decoder::default(), &raw, Local::now()).unwrap();
    let json = serde_json::to_value(&reading).unwrap();
    assert_eq!(json["systolic"], 120);
    assert_eq!(json["diastolic"], 70);
    assert_eq!(json["pulse"], 65);
    assert_eq!(json["classification"]["level"], "elevated");
    assert_eq!(json["classification"]["color"], "#FFC107");
    assert_eq!(json["raw"], "fe7800460041");
    assert!(json["timestamp"].is_string());
}

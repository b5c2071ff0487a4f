use serde::ser::SerializeStruct;
use serde::Serialize;
use serde::Serializer;

/// Blood pressure severity tier, following the AHA adult categories.
///
/// Variants are declared in order of increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityTier {
    Normal,
    Elevated,
    Stage1High,
    Stage2High,
    Crisis,
}

impl SeverityTier {
    /// Stable identifier used by web clients
    pub fn level(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::Stage1High => "high1",
            Self::Stage2High => "high2",
            Self::Crisis => "crisis",
        }
    }

    /// Human readable label
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Elevated => "Elevated",
            Self::Stage1High => "High Blood Pressure Stage 1",
            Self::Stage2High => "High Blood Pressure Stage 2",
            Self::Crisis => "Hypertensive Crisis",
        }
    }

    /// Display color as a `#RRGGBB` string
    pub fn color(self) -> &'static str {
        match self {
            Self::Normal => "#00C853",
            Self::Elevated => "#FFC107",
            Self::Stage1High => "#FF9800",
            Self::Stage2High => "#F44336",
            Self::Crisis => "#B71C1C",
        }
    }
}

impl Serialize for SeverityTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SeverityTier", 3)?;
        s.serialize_field("level", self.level())?;
        s.serialize_field("name", self.name())?;
        s.serialize_field("color", self.color())?;
        s.end()
    }
}

/// Classify a reading in mmHg.
///
/// The rules overlap at their boundaries so they are evaluated in order and the
/// first match wins. For example 120/85 is Stage 1 rather than Elevated.
pub fn classify(systolic: i32, diastolic: i32) -> SeverityTier {
    if systolic >= 180 || diastolic >= 120 {
        SeverityTier::Crisis
    } else if systolic >= 140 || diastolic >= 90 {
        SeverityTier::Stage2High
    } else if systolic >= 130 || diastolic >= 80 {
        SeverityTier::Stage1High
    } else if systolic >= 120 && diastolic < 80 {
        SeverityTier::Elevated
    } else {
        SeverityTier::Normal
    }
}

#[test]
fn test_classify_boundaries() {
    assert_eq!(classify(180, 70), SeverityTier::Crisis);
    assert_eq!(classify(100, 120), SeverityTier::Crisis);
    assert_eq!(classify(140, 89), SeverityTier::Stage2High);
    assert_eq!(classify(139, 90), SeverityTier::Stage2High);
    assert_eq!(classify(130, 79), SeverityTier::Stage1High);
    assert_eq!(classify(122, 75), SeverityTier::Elevated);
    assert_eq!(classify(110, 70), SeverityTier::Normal);
    assert_eq!(classify(119, 79), SeverityTier::Normal);
}

#[test]
fn test_classify_first_match_wins() {
    // Satisfies both the Elevated systolic bound and the Stage 1 diastolic bound
    assert_eq!(classify(120, 85), SeverityTier::Stage1High);
    assert_eq!(classify(120, 80), SeverityTier::Stage1High);
    assert_eq!(classify(200, 130), SeverityTier::Crisis);
}

#[test]
fn test_classify_is_monotonic() {
    for systolic in (-50..=300).step_by(3) {
        for diastolic in (-50..=200).step_by(3) {
            let tier = classify(systolic, diastolic);
            assert!(classify(systolic + 1, diastolic) >= tier);
            assert!(classify(systolic, diastolic + 1) >= tier);
        }
    }
    assert_eq!(classify(i32::MIN, i32::MIN), SeverityTier::Normal);
    assert_eq!(classify(i32::MAX, 0), SeverityTier::Crisis);
}

#[test]
fn test_tier_colors() {
    assert_eq!(SeverityTier::Normal.color(), "#00C853");
    assert_eq!(SeverityTier::Elevated.color(), "#FFC107");
    assert_eq!(SeverityTier::Stage1High.color(), "#FF9800");
    assert_eq!(SeverityTier::Stage2High.color(), "#F44336");
    assert_eq!(SeverityTier::Crisis.color(), "#B71C1C");
}

#[test]
fn test_tier_serializes_as_object() {
    let json = serde_json::to_value(SeverityTier::Stage2High).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "level": "high2",
            "name": "High Blood Pressure Stage 2",
            "color": "#F44336",
        })
    );
}

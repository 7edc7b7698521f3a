//! Fused realtime readings as written to the cache by the sensor-fusion process.
//!
//! The evaluation engine only ever reads these. A missing reading means
//! "no data yet", never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Sensing modality that produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSource {
    BedSensor,
    Radar,
    Fused,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SensorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorSource::BedSensor => write!(f, "bed_sensor"),
            SensorSource::Radar => write!(f, "radar"),
            SensorSource::Fused => write!(f, "fused"),
            SensorSource::Unknown => write!(f, "unknown"),
        }
    }
}

/// Bed occupancy as reported by the fusion process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedStatus {
    OnBed,
    OffBed,
    #[serde(other)]
    Unknown,
}

/// One vital-sign channel (heart or breath).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSign {
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default)]
    pub source: Option<SensorSource>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl VitalSign {
    pub fn new(value: i32, source: SensorSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            source: Some(source),
            timestamp: Some(timestamp),
        }
    }

    /// A channel is reporting when it carries a positive value.
    pub fn is_reporting(&self) -> bool {
        matches!(self.value, Some(v) if v > 0)
    }
}

/// Coarse posture classes derived from the fusion posture code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureKind {
    Unknown,
    Standing,
    Sitting,
    Lying,
    Walking,
    Fallen,
}

impl PostureKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => PostureKind::Standing,
            2 => PostureKind::Sitting,
            3 => PostureKind::Lying,
            4 => PostureKind::Walking,
            5 => PostureKind::Fallen,
            _ => PostureKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostureKind::Unknown => "unknown",
            PostureKind::Standing => "standing",
            PostureKind::Sitting => "sitting",
            PostureKind::Lying => "lying",
            PostureKind::Walking => "walking",
            PostureKind::Fallen => "fallen",
        }
    }
}

/// A point in the sensor's room coordinates (metres); `z` is height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: Option<f64>,
}

impl Position {
    /// Horizontal distance, ignoring height.
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Posture of one tracked subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posture {
    #[serde(deserialize_with = "string_or_number")]
    pub track_id: String,
    /// Fusion posture code, see [`PostureKind::from_code`].
    pub posture: i32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
}

impl Posture {
    pub fn new(track_id: impl Into<String>, kind: PostureKind) -> Self {
        let code = match kind {
            PostureKind::Unknown => 0,
            PostureKind::Standing => 1,
            PostureKind::Sitting => 2,
            PostureKind::Lying => 3,
            PostureKind::Walking => 4,
            PostureKind::Fallen => 5,
        };
        Self {
            track_id: track_id.into(),
            posture: code,
            label: Some(kind.as_str().to_string()),
            x: None,
            y: None,
            z: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self.z = Some(z);
        self
    }

    pub fn kind(&self) -> PostureKind {
        PostureKind::from_code(self.posture)
    }

    /// Display label, falling back to the posture class name.
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.kind().as_str().to_string())
    }

    pub fn position(&self) -> Option<Position> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Position { x, y, z: self.z }),
            _ => None,
        }
    }
}

/// Latest fused snapshot for one monitored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub heart: VitalSign,
    #[serde(default)]
    pub breath: VitalSign,
    #[serde(default)]
    pub sleep_stage: Option<String>,
    #[serde(default)]
    pub bed_status: Option<BedStatus>,
    #[serde(default)]
    pub person_count: u32,
    #[serde(default)]
    pub postures: Vec<Posture>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// An empty reading at `timestamp`: no vitals, no occupancy, no tracks.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            heart: VitalSign::default(),
            breath: VitalSign::default(),
            sleep_stage: None,
            bed_status: None,
            person_count: 0,
            postures: Vec::new(),
            timestamp,
        }
    }

    /// True when either vital-sign channel is reporting.
    pub fn has_vital_signs(&self) -> bool {
        self.heart.is_reporting() || self.breath.is_reporting()
    }

    /// Source of the first reporting vital-sign channel.
    pub fn vital_source(&self) -> Option<SensorSource> {
        [&self.heart, &self.breath]
            .into_iter()
            .find(|v| v.is_reporting())
            .map(|v| v.source.unwrap_or(SensorSource::Unknown))
    }

    pub fn is_occupied(&self) -> bool {
        self.bed_status == Some(BedStatus::OnBed)
    }

    pub fn is_unoccupied(&self) -> bool {
        self.bed_status == Some(BedStatus::OffBed)
    }

    pub fn track(&self, track_id: &str) -> Option<&Posture> {
        self.postures.iter().find(|p| p.track_id == track_id)
    }
}

/// Accept track ids written either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_fusion_payload() {
        let json = r#"{
            "heart": {"value": 68, "source": "bed_sensor", "timestamp": "2026-03-01T08:00:00Z"},
            "breath": {"value": null},
            "sleep_stage": "light",
            "bed_status": "on_bed",
            "person_count": 1,
            "postures": [{"track_id": 7, "posture": 3, "label": "lying", "x": 1.0, "y": 2.0, "z": 0.4}],
            "timestamp": "2026-03-01T08:00:01Z"
        }"#;
        let r: Reading = serde_json::from_str(json).unwrap();
        assert!(r.has_vital_signs());
        assert_eq!(r.vital_source(), Some(SensorSource::BedSensor));
        assert!(r.is_occupied());
        assert_eq!(r.postures[0].track_id, "7");
        assert_eq!(r.postures[0].kind(), PostureKind::Lying);
        assert_eq!(r.postures[0].position().unwrap().z, Some(0.4));
    }

    #[test]
    fn unknown_codes_are_tolerated() {
        let json = r#"{"bed_status": "sensor_fault", "heart": {"source": "lidar"},
                       "timestamp": "2026-03-01T08:00:01Z"}"#;
        let r: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(r.bed_status, Some(BedStatus::Unknown));
        assert_eq!(r.heart.source, Some(SensorSource::Unknown));
        assert!(!r.has_vital_signs());
        assert!(!r.is_occupied() && !r.is_unoccupied());
    }

    #[test]
    fn zero_vital_value_is_not_reporting() {
        let mut r = Reading::empty(Utc::now());
        r.heart.value = Some(0);
        assert!(!r.has_vital_signs());
    }

    #[test]
    fn display_label_falls_back_to_kind() {
        let mut p = Posture::new("1", PostureKind::Standing);
        p.label = None;
        assert_eq!(p.display_label(), "standing");
    }
}

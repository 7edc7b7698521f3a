//! Durable alarm event record and its classification enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reading::SensorSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCategory {
    Safety,
    Clinical,
    Behavioral,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    Active,
    Acknowledged,
    /// Raised by a rule as context for other alarms; never persisted.
    Suppressed,
}

macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($s => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(AlarmCategory {
    Safety => "safety",
    Clinical => "clinical",
    Behavioral => "behavioral",
    Device => "device",
});

str_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

str_enum!(AlarmStatus {
    Active => "active",
    Acknowledged => "acknowledged",
    Suppressed => "suppressed",
});

/// A term from a coded clinical vocabulary (e.g. SNOMED CT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalCode {
    pub system: String,
    pub code: String,
    pub display: String,
}

impl ClinicalCode {
    pub fn snomed(code: &str, display: &str) -> Self {
        Self {
            system: "http://snomed.info/sct".to_string(),
            code: code.to_string(),
            display: display.to_string(),
        }
    }
}

/// Immutable snapshot of the data that triggered an alarm.
///
/// Optional fields serialize as explicit `null` so the stored record always
/// carries the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    /// Which sensing modality produced the triggering data.
    pub source: SensorSource,
    pub heart_rate: Option<i32>,
    pub breath_rate: Option<i32>,
    pub posture: Option<String>,
    pub confidence: Option<f64>,
    pub duration_secs: Option<i64>,
    pub clinical_code: Option<ClinicalCode>,
}

impl TriggerSnapshot {
    pub fn new(source: SensorSource) -> Self {
        Self {
            source,
            heart_rate: None,
            breath_rate: None,
            posture: None,
            confidence: None,
            duration_secs: None,
            clinical_code: None,
        }
    }
}

/// A persisted alarm event.
///
/// Created once by the builder and never mutated by the evaluation engine;
/// acknowledgement is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub entity_id: String,
    pub event_type: String,
    pub category: AlarmCategory,
    pub severity: Severity,
    pub status: AlarmStatus,
    pub triggered_at: DateTime<Utc>,
    pub handled_at: Option<DateTime<Utc>>,
    pub source_record_id: Option<String>,
    pub trigger_data: serde_json::Value,
    pub handler: Option<String>,
    pub operation: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub notified_recipients: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn is_active(&self) -> bool {
        self.status == AlarmStatus::Active
    }

    /// Decode the stored trigger data back into its structured form.
    pub fn trigger_snapshot(&self) -> Result<TriggerSnapshot, serde_json::Error> {
        serde_json::from_value(self.trigger_data.clone())
    }
}

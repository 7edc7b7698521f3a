use serde::{Deserialize, Serialize};

/// How an entity is observed: through a bed it owns or through an area/room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bed,
    Area,
    /// Recovered from cache keys without catalog data.
    Unknown,
}

impl EntityKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "bed" => EntityKind::Bed,
            "area" | "room" | "location" => EntityKind::Area,
            _ => EntityKind::Unknown,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Bed => write!(f, "bed"),
            EntityKind::Area => write!(f, "area"),
            EntityKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Sensor device families that can be bound to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Under-mattress / bed-frame vital-sign sensor.
    VitalSignSensor,
    /// mmWave radar reporting presence, tracks and posture.
    PresenceRadar,
    Other,
}

impl DeviceType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "vital_sign_sensor" | "bed_sensor" | "sleep_monitor" => DeviceType::VitalSignSensor,
            "presence_radar" | "radar" => DeviceType::PresenceRadar,
            _ => DeviceType::Other,
        }
    }
}

/// A device bound to a monitored entity, with the name of the location it is installed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub device_id: String,
    pub device_type: DeviceType,
    pub location_name: Option<String>,
}

/// A monitored unit (bed or area) as listed by the entity catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredEntity {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub bindings: Vec<DeviceBinding>,
}

impl MonitoredEntity {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, kind: EntityKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tenant_id: tenant_id.into(),
            kind,
            bindings: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_binding(
        mut self,
        device_id: impl Into<String>,
        device_type: DeviceType,
        location_name: Option<&str>,
    ) -> Self {
        self.bindings.push(DeviceBinding {
            device_id: device_id.into(),
            device_type,
            location_name: location_name.map(str::to_string),
        });
        self
    }

    pub fn is_bed(&self) -> bool {
        self.kind == EntityKind::Bed
    }

    pub fn is_area(&self) -> bool {
        self.kind == EntityKind::Area
    }

    pub fn has_device(&self, device_type: DeviceType) -> bool {
        self.bindings.iter().any(|b| b.device_type == device_type)
    }

    /// The entity name followed by every bound device's location name.
    pub fn location_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.bindings.iter().filter_map(|b| b.location_name.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_accepts_aliases() {
        assert_eq!(EntityKind::parse("BED"), EntityKind::Bed);
        assert_eq!(EntityKind::parse("room"), EntityKind::Area);
        assert_eq!(EntityKind::parse("garage"), EntityKind::Unknown);
    }

    #[test]
    fn location_names_include_entity_and_bindings() {
        let e = MonitoredEntity::new("a-1", "t", EntityKind::Area)
            .with_name("Room 12")
            .with_binding("r-1", DeviceType::PresenceRadar, Some("Room 12 Bathroom"))
            .with_binding("r-2", DeviceType::PresenceRadar, None);
        let names: Vec<&str> = e.location_names().collect();
        assert_eq!(names, vec!["Room 12", "Room 12 Bathroom"]);
        assert!(e.has_device(DeviceType::PresenceRadar));
        assert!(!e.has_device(DeviceType::VitalSignSensor));
    }
}

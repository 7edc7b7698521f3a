//! Cache key construction.
//!
//! Key shapes are shared with the fusion process and UI consumers and must
//! not change:
//! - readings: `{realtime_prefix}{entity_id}{realtime_suffix}`
//! - alarm mirror: `{alarm_prefix}{entity_id}{alarm_suffix}`
//! - rule state: `{state_prefix}{entity_id}:track_{track_id}:{rule_name}`

use std::fmt;

use carewatch_core::config::KeyConfig;

/// Track id used for rule state that belongs to the entity rather than a subject.
pub const ENTITY_TRACK: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    config: KeyConfig,
}

impl KeyLayout {
    pub fn new(config: KeyConfig) -> Self {
        Self { config }
    }

    pub fn reading_key(&self, entity_id: &str) -> String {
        format!(
            "{}{}{}",
            self.config.realtime_prefix, entity_id, self.config.realtime_suffix
        )
    }

    pub fn alarm_key(&self, entity_id: &str) -> String {
        format!(
            "{}{}{}",
            self.config.alarm_prefix, entity_id, self.config.alarm_suffix
        )
    }

    pub fn reading_prefix(&self) -> &str {
        &self.config.realtime_prefix
    }

    /// Recover the entity id from a reading key. Inverse of [`reading_key`](Self::reading_key).
    pub fn entity_id_from_reading_key(&self, key: &str) -> Option<String> {
        let id = key
            .strip_prefix(self.config.realtime_prefix.as_str())?
            .strip_suffix(self.config.realtime_suffix.as_str())?;
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    pub fn state_key(&self, key: &StateKey) -> String {
        format!("{}{}", self.config.state_prefix, key)
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(KeyConfig::default())
    }
}

/// Address of one rule-state record: (entity, sub-track, rule).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub entity_id: String,
    pub track_id: String,
    pub rule_name: String,
}

impl StateKey {
    pub fn new(entity_id: &str, track_id: &str, rule_name: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            track_id: track_id.to_string(),
            rule_name: rule_name.to_string(),
        }
    }

    /// State owned by the entity as a whole (track [`ENTITY_TRACK`]).
    pub fn entity(entity_id: &str, rule_name: &str) -> Self {
        Self::new(entity_id, ENTITY_TRACK, rule_name)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:track_{}:{}", self.entity_id, self.track_id, self.rule_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_key_round_trips() {
        let keys = KeyLayout::default();
        let key = keys.reading_key("card-1");
        assert_eq!(key, "realtime:card-1:fused");
        assert_eq!(keys.entity_id_from_reading_key(&key).as_deref(), Some("card-1"));
    }

    #[test]
    fn foreign_keys_do_not_invert() {
        let keys = KeyLayout::default();
        assert_eq!(keys.entity_id_from_reading_key("realtime:card-1:raw"), None);
        assert_eq!(keys.entity_id_from_reading_key("alarm:active:card-1"), None);
        assert_eq!(keys.entity_id_from_reading_key("realtime::fused"), None);
    }

    #[test]
    fn state_key_layout() {
        let keys = KeyLayout::default();
        let k = StateKey::new("card-1", "3", "bed_exit_fall");
        assert_eq!(keys.state_key(&k), "alarm:state:card-1:track_3:bed_exit_fall");
        assert_eq!(
            keys.state_key(&StateKey::entity("a-1", "bathroom_standing")),
            "alarm:state:a-1:track_0:bathroom_standing"
        );
    }

    #[test]
    fn alarm_key_uses_configured_suffix() {
        let keys = KeyLayout::new(KeyConfig {
            alarm_suffix: ":list".to_string(),
            ..KeyConfig::default()
        });
        assert_eq!(keys.alarm_key("card-1"), "alarm:active:card-1:list");
    }
}

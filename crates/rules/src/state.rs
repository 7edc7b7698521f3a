//! Typed rule state on top of the byte-level [`StateStore`].
//!
//! Every record is one variant of the closed [`RuleState`] enum. A rule
//! loads through [`RuleStateStore::load`] with its own variant type and gets
//! [`RuleError::StateMismatch`] if the key holds anything else.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carewatch_cache::{StateKey, StateStore};
use carewatch_core::Position;

use crate::error::RuleError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "state", rename_all = "snake_case")]
pub enum RuleState {
    BedExit(BedExitState),
    SensorConflict(SensorConflictState),
    BathroomStanding(BathroomStandingState),
    TrackHistory(TrackHistoryState),
    TrackRoster(TrackRosterState),
}

impl RuleState {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleState::BedExit(_) => "bed_exit",
            RuleState::SensorConflict(_) => "sensor_conflict",
            RuleState::BathroomStanding(_) => "bathroom_standing",
            RuleState::TrackHistory(_) => "track_history",
            RuleState::TrackRoster(_) => "track_roster",
        }
    }
}

/// Progress of the bed-exit rule for one bed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum BedExitState {
    /// Occupant seen in bed; remembered so a later exit has a reference point.
    Baseline {
        posture: Option<String>,
        position: Option<Position>,
        observed_at: DateTime<Utc>,
    },
    /// Bed found empty with no vitals; waiting out the dwell.
    LeftBed {
        left_at: DateTime<Utc>,
        baseline_posture: Option<String>,
        baseline_position: Option<Position>,
    },
    /// Episode ended by vitals or motion while the bed stayed empty. Kept
    /// under its own track so it outlives the episode record and blocks
    /// re-arming until the bed is occupied again.
    Exited { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConflictState {
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BathroomStandingState {
    pub track_id: String,
    pub since: DateTime<Utc>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightSample {
    pub at: DateTime<Utc>,
    pub z: f64,
}

/// A sharp height loss observed on a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropMark {
    pub at: DateTime<Utc>,
    pub from_z: f64,
    pub to_z: f64,
}

impl DropMark {
    pub fn depth(&self) -> f64 {
        self.from_z - self.to_z
    }
}

/// Recent height history of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackHistoryState {
    pub samples: Vec<HeightSample>,
    pub last_seen: DateTime<Utc>,
    pub last_posture: Option<String>,
    pub drop: Option<DropMark>,
}

impl TrackHistoryState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            samples: Vec::new(),
            last_seen: now,
            last_posture: None,
            drop: None,
        }
    }
}

/// Track ids seen on an entity's previous reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRosterState {
    pub track_ids: Vec<String>,
}

/// Conversion between a rule's own state type and the shared enum.
pub trait StateVariant: Sized {
    fn into_state(self) -> RuleState;
    /// Hands the state back unchanged when it is another variant.
    fn from_state(state: RuleState) -> Result<Self, RuleState>;
}

macro_rules! state_variant {
    ($ty:ty, $variant:ident) => {
        impl StateVariant for $ty {
            fn into_state(self) -> RuleState {
                RuleState::$variant(self)
            }

            fn from_state(state: RuleState) -> Result<Self, RuleState> {
                match state {
                    RuleState::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

state_variant!(BedExitState, BedExit);
state_variant!(SensorConflictState, SensorConflict);
state_variant!(BathroomStandingState, BathroomStanding);
state_variant!(TrackHistoryState, TrackHistory);
state_variant!(TrackRosterState, TrackRoster);

#[derive(Clone)]
pub struct RuleStateStore {
    inner: StateStore,
}

impl RuleStateStore {
    pub fn new(inner: StateStore) -> Self {
        Self { inner }
    }

    /// Load a rule's state. A missing or expired record is `Ok(None)`.
    pub async fn load<T: StateVariant>(&self, key: &StateKey) -> Result<Option<T>, RuleError> {
        let bytes = match self.inner.get_state(key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: RuleState = serde_json::from_slice(&bytes)?;
        T::from_state(state)
            .map(Some)
            .map_err(|other| RuleError::StateMismatch {
                rule: key.rule_name.clone(),
                found: other.kind(),
            })
    }

    pub async fn save<T: StateVariant>(
        &self,
        key: &StateKey,
        value: T,
        ttl: Duration,
    ) -> Result<(), RuleError> {
        let bytes = serde_json::to_vec(&value.into_state())?;
        self.inner.set_state(key, &bytes, ttl).await?;
        Ok(())
    }

    /// Keep an in-progress record alive. `false` if it already expired.
    pub async fn touch(&self, key: &StateKey, ttl: Duration) -> Result<bool, RuleError> {
        Ok(self.inner.extend_ttl(key, ttl).await?)
    }

    pub async fn clear(&self, key: &StateKey) -> Result<(), RuleError> {
        Ok(self.inner.delete(key).await?)
    }

    pub async fn exists(&self, key: &StateKey) -> Result<bool, RuleError> {
        Ok(self.inner.exists(key).await?)
    }
}

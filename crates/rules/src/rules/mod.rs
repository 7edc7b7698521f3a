//! Detection rules.

mod bathroom;
mod bed_exit;
mod disappearance;
mod sensor_reliability;

pub use bathroom::{is_bathroom, BathroomStandingRule};
pub use bed_exit::BedExitRule;
pub use disappearance::SuddenDisappearanceRule;
pub use sensor_reliability::SensorReliabilityRule;

use chrono::{DateTime, Utc};

/// Whole seconds from `since` to `now`, never negative.
pub(crate) fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_seconds().max(0)
}

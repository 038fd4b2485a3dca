//! Shared value types for the orchestration domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (progress is in `[0.0, 1.0]`) and take part
//! in domain decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Fraction of an analysis run that has completed, in the range `[0.0, 1.0]`.
///
/// Set to discrete checkpoints by the orchestrator; never computed from
/// sub-task counts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Progress(f64);

impl Progress {
    /// Progress of a run that has not started.
    pub const ZERO: Progress = Progress(0.0);

    /// Progress of a finished run.
    pub const COMPLETE: Progress = Progress(1.0);

    /// Creates a [`Progress`], returning `None` if `value` is outside the valid
    /// range `[0.0, 1.0]` or not finite.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Checkpoint constant for use in `const` items. Callers pass literals
    /// in `[0.0, 1.0]`; the plan tests check every one with [`Progress::new`].
    pub(crate) const fn checkpoint(value: f64) -> Self {
        Self(value)
    }

    /// Returns the fraction as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` once the run has reached the final checkpoint.
    pub fn is_complete(self) -> bool {
        self.0 >= 1.0
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

impl TryFrom<f64> for Progress {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("progress {value} is outside [0.0, 1.0]"))
    }
}

impl From<Progress> for f64 {
    fn from(value: Progress) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 string as stored by persistence adapters.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Compact `YYYYmmdd_HHMMSS` form used in generated file names.
    pub fn file_stamp(self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn progress_rejects_out_of_range_values() {
        assert!(Progress::new(-0.01).is_none());
        assert!(Progress::new(1.01).is_none());
        assert!(Progress::new(f64::NAN).is_none());
        assert_eq!(Progress::new(0.4).map(Progress::as_f64), Some(0.4));
    }

    #[test]
    fn progress_serialises_as_plain_number() {
        let json = serde_json::to_string(&Progress::new(0.5).unwrap()).unwrap();
        assert_eq!(json, "0.5");
        assert!(serde_json::from_str::<Progress>("1.5").is_err());
    }

    #[test]
    fn timestamp_round_trips_through_rfc3339() {
        let ts = Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap());
        assert_eq!(Timestamp::parse_rfc3339(&ts.to_string()), Some(ts));
        assert_eq!(ts.file_stamp(), "20240309_140507");
    }
}

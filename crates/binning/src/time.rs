//! Observation time base.
//!
//! Observation times are fractional days since 2000-01-01T00:00:00Z
//! ("MJD2000"), which keeps them in a plain `f64` next to lat/lon.

use crate::error::{BinningError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// 2000-01-01T00:00:00Z.
pub fn mjd2000_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Fractional days since the MJD2000 epoch.
pub fn to_mjd2000(time: DateTime<Utc>) -> f64 {
    (time - mjd2000_epoch()).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Inverse of [`to_mjd2000`], to millisecond precision.
pub fn from_mjd2000(mjd: f64) -> Option<DateTime<Utc>> {
    if !mjd.is_finite() {
        return None;
    }
    let millis = (mjd * MILLIS_PER_DAY).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    mjd2000_epoch().checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Closed time interval used to select observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(BinningError::config(format!(
                "time range starts at {} after it ends at {}",
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        Ok(())
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }

    /// Whether an MJD2000 observation time falls in the range. Observations
    /// without a valid time never do.
    pub fn accepts(&self, mjd: f64) -> bool {
        mjd.is_finite() && to_mjd2000(self.start) <= mjd && mjd <= to_mjd2000(self.end)
    }
}

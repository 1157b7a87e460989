//! Data resolution: the granularity of emitted market data.

use super::Timestamp;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of market data.
///
/// Variants are ordered from finest to coarsest, so `min()` over a set of
/// requested resolutions yields the finest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Tick,
    Second,
    Minute,
    Hour,
    Daily,
}

impl Resolution {
    /// Time covered by one bar at this resolution. Ticks have no span.
    pub fn span(self) -> Duration {
        match self {
            Resolution::Tick => Duration::zero(),
            Resolution::Second => Duration::seconds(1),
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
            Resolution::Daily => Duration::days(1),
        }
    }

    /// Whether the simulation clock can advance in steps of this resolution.
    pub fn is_steppable(self) -> bool {
        self != Resolution::Tick
    }

    /// The finer of two resolutions.
    pub fn finest(self, other: Resolution) -> Resolution {
        self.min(other)
    }

    /// Whether `t` closes a bar of this resolution on the UTC grid
    /// (midnight for daily, the top of the hour for hourly). Every instant
    /// closes a tick.
    pub fn is_boundary(self, t: Timestamp) -> bool {
        let span = self.span().num_seconds();
        if span == 0 {
            return true;
        }
        let utc = t.and_utc();
        utc.timestamp().rem_euclid(span) == 0 && utc.timestamp_subsec_nanos() == 0
    }

    /// Latest grid boundary at or before `t`.
    pub fn floor(self, t: Timestamp) -> Timestamp {
        let span = self.span().num_seconds();
        if span == 0 {
            return t;
        }
        let utc = t.and_utc();
        let back = Duration::seconds(utc.timestamp().rem_euclid(span))
            + Duration::nanoseconds(i64::from(utc.timestamp_subsec_nanos()));
        t.checked_sub_signed(back).unwrap_or(t)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Tick => "tick",
            Resolution::Second => "second",
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
            Resolution::Daily => "daily",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_finest_first() {
        assert!(Resolution::Tick < Resolution::Minute);
        assert!(Resolution::Hour < Resolution::Daily);
        assert_eq!(Resolution::Daily.finest(Resolution::Hour), Resolution::Hour);
        assert_eq!(Resolution::Minute.finest(Resolution::Daily), Resolution::Minute);
    }

    #[test]
    fn spans() {
        assert_eq!(Resolution::Hour.span(), Duration::hours(1));
        assert_eq!(Resolution::Daily.span(), Duration::days(1));
        assert!(!Resolution::Tick.is_steppable());
        assert!(Resolution::Second.is_steppable());
    }

    #[test]
    fn grid_boundaries_follow_utc() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let midnight = day.and_hms_opt(0, 0, 0).unwrap();
        let six = day.and_hms_opt(6, 0, 0).unwrap();
        let half_past = day.and_hms_opt(6, 30, 0).unwrap();

        assert!(Resolution::Daily.is_boundary(midnight));
        assert!(!Resolution::Daily.is_boundary(six));
        assert!(Resolution::Hour.is_boundary(six));
        assert!(!Resolution::Hour.is_boundary(half_past));
        assert!(Resolution::Tick.is_boundary(half_past));

        assert_eq!(Resolution::Daily.floor(six), midnight);
        assert_eq!(Resolution::Hour.floor(half_past), six);
        assert_eq!(Resolution::Hour.floor(six), six);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Resolution::Hour).unwrap();
        assert_eq!(json, "\"hour\"");
        let parsed: Resolution = serde_json::from_str("\"daily\"").unwrap();
        assert_eq!(parsed, Resolution::Daily);
    }
}

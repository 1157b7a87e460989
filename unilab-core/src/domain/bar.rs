//! Bar: the market data unit gated by the engine.

use super::{Resolution, Symbol, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol over `[start, end)`.
///
/// The engine does not interpret prices; it only checks that a bar belongs to
/// a subscribed symbol, carries the resolution that was requested for it and
/// falls inside the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub start: Timestamp,
    pub end: Timestamp,
    pub resolution: Resolution,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() || self.end <= self.start {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 0, 0).unwrap();
        Bar {
            symbol: Symbol::equity("SPY"),
            start,
            end: start + Duration::hours(1),
            resolution: Resolution::Hour,
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
        }
    }

    #[test]
    fn bar_is_sane() {
        let bar = sample_bar();
        assert!(bar.is_sane());
        assert_eq!(bar.span(), Duration::hours(1));
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_inverted_interval() {
        let mut bar = sample_bar();
        bar.end = bar.start;
        assert!(!bar.is_sane());
    }
}

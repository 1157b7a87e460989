//! Warmup window and the controller that owns the "warming up" signal.
//!
//! The window is fixed once at initialization. The controller answers two
//! questions for any step time: is the run still warming up, and which
//! resolution should data be delivered at. It is cleared exactly once, on the
//! first observed time past the window end.

use super::state::ConfigError;
use crate::domain::{Resolution, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

/// How long the warmup lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupLength {
    Period(Duration),
    /// Number of bars of the nominal resolution.
    Bars(usize),
}

/// Warmup requested by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupSpec {
    pub length: WarmupLength,
    /// Resolution data is delivered at while warming up. `None` keeps nominal.
    pub resolution: Option<Resolution>,
}

impl WarmupSpec {
    pub fn period(period: Duration) -> Self {
        Self { length: WarmupLength::Period(period), resolution: None }
    }

    pub fn bars(bars: usize) -> Self {
        Self { length: WarmupLength::Bars(bars), resolution: None }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Duration of the warmup given the run's nominal resolution. `None`
    /// when the bar count overflows a duration.
    pub fn duration(&self, nominal: Resolution) -> Option<Duration> {
        match self.length {
            WarmupLength::Period(period) => Some(period),
            WarmupLength::Bars(bars) => {
                let count = i64::try_from(bars).ok()?;
                Duration::try_seconds(nominal.span().num_seconds().checked_mul(count)?)
            }
        }
    }
}

/// `[start, end]` of the warmup, with the optional resolution override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupWindow {
    pub start: Timestamp,
    pub end: Timestamp,
    pub resolution: Option<Resolution>,
}

impl WarmupWindow {
    /// Window ending at `live_start`.
    pub fn from_spec(
        spec: &WarmupSpec,
        live_start: Timestamp,
        nominal: Resolution,
    ) -> Result<Self, ConfigError> {
        let duration = spec.duration(nominal).ok_or(ConfigError::WarmupOutOfRange)?;
        if duration <= Duration::zero() {
            return Err(ConfigError::EmptyWarmup);
        }
        if let Some(resolution) = spec.resolution {
            if !resolution.is_steppable() {
                return Err(ConfigError::UnsteppableResolution(resolution));
            }
        }
        let start = live_start
            .checked_sub_signed(duration)
            .ok_or(ConfigError::WarmupOutOfRange)?;
        Ok(Self { start, end: live_start, resolution: spec.resolution })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, time: Timestamp) -> bool {
        time <= self.end
    }
}

/// Single source of truth for the warmup state of a run.
#[derive(Debug, Clone, Default)]
pub struct WarmupController {
    window: Option<WarmupWindow>,
    ended_at: Option<Timestamp>,
}

impl WarmupController {
    pub fn new(window: Option<WarmupWindow>) -> Self {
        Self { window, ended_at: None }
    }

    /// Active window, `None` once cleared or when no warmup was configured.
    pub fn window(&self) -> Option<&WarmupWindow> {
        self.window.as_ref()
    }

    pub fn is_warming_up(&self, time: Timestamp) -> bool {
        self.window.is_some_and(|w| w.contains(time))
    }

    /// Resolution data should be delivered at for a subscription requesting `nominal`.
    pub fn effective_resolution(&self, nominal: Resolution, time: Timestamp) -> Resolution {
        match self.window {
            Some(w) if w.contains(time) => w.resolution.unwrap_or(nominal),
            _ => nominal,
        }
    }

    /// Advance to `time`. Returns true exactly once, on the first time past the window.
    pub fn observe(&mut self, time: Timestamp) -> bool {
        match self.window {
            Some(w) if time > w.end => {
                self.window = None;
                self.ended_at = Some(w.end);
                info!(time = %time, warmup_end = %w.end, "warmup finished");
                true
            }
            _ => false,
        }
    }

    /// End of the warmup window, once it has been cleared.
    pub fn ended_at(&self) -> Option<Timestamp> {
        self.ended_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn window_ends_at_live_start() {
        let spec = WarmupSpec::period(Duration::days(2)).with_resolution(Resolution::Daily);
        let w = WarmupWindow::from_spec(&spec, at(5, 0), Resolution::Hour).unwrap();
        assert_eq!(w.start, at(3, 0));
        assert_eq!(w.end, at(5, 0));
        assert_eq!(w.resolution, Some(Resolution::Daily));
    }

    #[test]
    fn bar_count_uses_nominal_span() {
        let spec = WarmupSpec::bars(30);
        let w = WarmupWindow::from_spec(&spec, at(5, 0), Resolution::Hour).unwrap();
        assert_eq!(w.duration(), Duration::hours(30));
    }

    #[test]
    fn zero_length_is_rejected() {
        let spec = WarmupSpec::bars(0);
        assert!(matches!(
            WarmupWindow::from_spec(&spec, at(5, 0), Resolution::Hour),
            Err(ConfigError::EmptyWarmup)
        ));
        let tick = WarmupSpec::bars(5).with_resolution(Resolution::Tick);
        assert!(matches!(
            WarmupWindow::from_spec(&tick, at(5, 0), Resolution::Hour),
            Err(ConfigError::UnsteppableResolution(Resolution::Tick))
        ));
    }

    #[test]
    fn oversized_warmup_is_a_config_error() {
        let huge = WarmupSpec::period(Duration::days(100_000_000));
        assert!(matches!(
            WarmupWindow::from_spec(&huge, at(5, 0), Resolution::Hour),
            Err(ConfigError::WarmupOutOfRange)
        ));
        let many = WarmupSpec::bars(usize::MAX);
        assert!(matches!(
            WarmupWindow::from_spec(&many, at(5, 0), Resolution::Daily),
            Err(ConfigError::WarmupOutOfRange)
        ));
    }

    #[test]
    fn controller_switches_exactly_once() {
        let spec = WarmupSpec::period(Duration::days(1)).with_resolution(Resolution::Daily);
        let w = WarmupWindow::from_spec(&spec, at(2, 0), Resolution::Hour).unwrap();
        let mut ctl = WarmupController::new(Some(w));

        assert!(!ctl.observe(at(2, 0)));
        assert!(ctl.is_warming_up(at(2, 0)));
        assert_eq!(ctl.effective_resolution(Resolution::Hour, at(2, 0)), Resolution::Daily);

        assert!(ctl.observe(at(2, 1)));
        assert!(!ctl.is_warming_up(at(2, 1)));
        assert_eq!(ctl.effective_resolution(Resolution::Hour, at(2, 1)), Resolution::Hour);
        assert_eq!(ctl.ended_at(), Some(at(2, 0)));

        assert!(!ctl.observe(at(2, 2)));
        assert!(ctl.window().is_none());
    }

    #[test]
    fn no_window_never_warms_up() {
        let mut ctl = WarmupController::new(None);
        assert!(!ctl.is_warming_up(at(1, 0)));
        assert!(!ctl.observe(at(1, 0)));
        assert_eq!(ctl.effective_resolution(Resolution::Minute, at(1, 0)), Resolution::Minute);
        assert_eq!(ctl.ended_at(), None);
    }

    #[test]
    fn override_absent_keeps_subscription_resolution() {
        let spec = WarmupSpec::bars(10);
        let w = WarmupWindow::from_spec(&spec, at(2, 0), Resolution::Hour).unwrap();
        let ctl = WarmupController::new(Some(w));
        assert!(ctl.is_warming_up(at(1, 20)));
        assert_eq!(ctl.effective_resolution(Resolution::Minute, at(1, 20)), Resolution::Minute);
    }
}

//! Simulation clock: the sequence of time steps a run walks through.
//!
//! The clock always advances at the nominal resolution, warming up or not,
//! so rule-time cadences see every nominal boundary. Coarser data (a warmup
//! override or a coarse subscription) is served only on the steps that close
//! one of its bars; see [`TimeStep::data_interval`].

use super::warmup::WarmupWindow;
use crate::domain::{Resolution, Timestamp};
use chrono::Duration;

/// One simulation step covering `(start, end]`. The step's time is `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStep {
    pub start: Timestamp,
    pub end: Timestamp,
    /// Nominal resolution of the run.
    pub resolution: Resolution,
    pub warming_up: bool,
}

impl TimeStep {
    pub fn time(&self) -> Timestamp {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Interval a feed at `resolution` is served for on this step, or `None`
    /// when the step closes none of its bars.
    ///
    /// `bounds` is the phase the step belongs to (the warmup window or the
    /// live run). A coarse bar closes on its UTC grid or at the phase end,
    /// and never starts before the phase start.
    pub fn data_interval(
        &self,
        resolution: Resolution,
        bounds: (Timestamp, Timestamp),
    ) -> Option<(Timestamp, Timestamp)> {
        if resolution <= self.resolution {
            return Some((self.start, self.end));
        }
        let (phase_start, phase_end) = bounds;
        let start = if resolution.is_boundary(self.end) {
            self.end.checked_sub_signed(resolution.span())?
        } else if self.end == phase_end {
            resolution.floor(self.end)
        } else {
            return None;
        };
        Some((start.max(phase_start).min(self.start), self.end))
    }
}

/// Yields steps of the nominal resolution from the warmup start (or the live
/// start) until `end`. The last warmup step is clipped at the window end so
/// live steps start exactly there.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    cursor: Timestamp,
    end: Timestamp,
    nominal: Resolution,
    warmup: Option<WarmupWindow>,
}

impl SimulationClock {
    pub fn new(
        live_start: Timestamp,
        end: Timestamp,
        nominal: Resolution,
        warmup: Option<WarmupWindow>,
    ) -> Self {
        let cursor = warmup.map_or(live_start, |w| w.start);
        Self { cursor, end, nominal, warmup }
    }

    /// Start of the next step.
    pub fn cursor(&self) -> Timestamp {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor
            .checked_add_signed(self.nominal.span())
            .map_or(true, |next| next > self.end)
    }
}

impl Iterator for SimulationClock {
    type Item = TimeStep;

    fn next(&mut self) -> Option<TimeStep> {
        let mut end = self.cursor.checked_add_signed(self.nominal.span())?;
        let warming_up = match self.warmup {
            Some(w) if self.cursor < w.end => {
                end = end.min(w.end);
                true
            }
            _ => false,
        };
        if end <= self.cursor || end > self.end {
            return None;
        }
        let step = TimeStep { start: self.cursor, end, resolution: self.nominal, warming_up };
        self.cursor = end;
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::warmup::WarmupSpec;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn hourly_step(d: u32, h: u32) -> TimeStep {
        TimeStep {
            start: at(d, h) - Duration::hours(1),
            end: at(d, h),
            resolution: Resolution::Hour,
            warming_up: false,
        }
    }

    #[test]
    fn live_only_steps_nominal() {
        let steps: Vec<_> = SimulationClock::new(at(2, 0), at(2, 3), Resolution::Hour, None).collect();
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.span() == Duration::hours(1) && !s.warming_up));
        assert_eq!(steps[0].time(), at(2, 1));
        assert_eq!(steps[2].time(), at(2, 3));
    }

    #[test]
    fn partial_trailing_step_is_not_emitted() {
        let end = at(2, 2) + Duration::minutes(30);
        let clock = SimulationClock::new(at(2, 0), end, Resolution::Hour, None);
        assert_eq!(clock.count(), 2);
    }

    #[test]
    fn warmup_steps_at_nominal_resolution() {
        // 30 hourly bars of warmup, delivered daily, still step hourly.
        let spec = WarmupSpec::bars(30).with_resolution(Resolution::Daily);
        let window = WarmupWindow::from_spec(&spec, at(3, 0), Resolution::Hour).unwrap();
        let steps: Vec<_> =
            SimulationClock::new(at(3, 0), at(3, 2), Resolution::Hour, Some(window)).collect();

        assert_eq!(steps.len(), 32);
        assert_eq!(steps[0].start, at(1, 18));
        assert!(steps.iter().all(|s| s.span() == Duration::hours(1)));
        assert!(steps.iter().all(|s| s.resolution == Resolution::Hour));
        assert_eq!(steps.iter().filter(|s| s.warming_up).count(), 30);
        assert_eq!(steps[29].end, at(3, 0));

        let first_live = steps[30];
        assert!(!first_live.warming_up);
        assert_eq!(first_live.start, at(3, 0));
    }

    #[test]
    fn last_warmup_step_is_clipped_at_window_end() {
        // A 90 minute warmup on an hourly clock ends half way through a step.
        let spec = WarmupSpec::period(Duration::minutes(90));
        let window = WarmupWindow::from_spec(&spec, at(3, 0), Resolution::Hour).unwrap();
        let steps: Vec<_> =
            SimulationClock::new(at(3, 0), at(3, 1), Resolution::Hour, Some(window)).collect();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].span(), Duration::minutes(30));
        assert_eq!(steps[1].end, at(3, 0));
        assert!(!steps[2].warming_up);
        assert_eq!(steps[2].span(), Duration::hours(1));
    }

    #[test]
    fn coarse_interval_only_on_closing_steps() {
        let live = (at(2, 0), at(4, 0));

        assert_eq!(hourly_step(2, 5).data_interval(Resolution::Daily, live), None);
        assert_eq!(
            hourly_step(3, 0).data_interval(Resolution::Daily, live),
            Some((at(2, 0), at(3, 0)))
        );
        assert_eq!(
            hourly_step(2, 5).data_interval(Resolution::Hour, live),
            Some((at(2, 4), at(2, 5)))
        );
        // Finer than the clock is served at the step interval.
        assert_eq!(
            hourly_step(2, 5).data_interval(Resolution::Minute, live),
            Some((at(2, 4), at(2, 5)))
        );
    }

    #[test]
    fn coarse_interval_is_clipped_to_the_phase() {
        let warmup = (at(1, 18), at(2, 6));

        // First daily close only covers the part of the day inside the window.
        assert_eq!(
            hourly_step(2, 0).data_interval(Resolution::Daily, warmup),
            Some((at(1, 18), at(2, 0)))
        );
        // The window end closes a partial bar off the grid.
        assert_eq!(
            hourly_step(2, 6).data_interval(Resolution::Daily, warmup),
            Some((at(2, 0), at(2, 6)))
        );
    }

    #[test]
    fn empty_range_yields_nothing() {
        let mut clock = SimulationClock::new(at(2, 0), at(2, 0), Resolution::Hour, None);
        assert!(clock.is_finished());
        assert!(clock.next().is_none());
    }
}

//! Selection sources: pluggable rules deciding which instruments should exist.
//!
//! Every source exposes a cadence and a selection function of time. The
//! selector runner invokes a source only when its cadence boundary has been
//! crossed; between firings the source's last candidate set stands.
//!
//! Four kinds of sources are provided:
//! - `UserDefinedSelector`: arbitrary closure of time
//! - `FundamentalSelector`: coarse filter, optionally followed by a fine filter
//! - `FutureChainSelector`: contracts of a futures root within an expiry window
//! - `ContinuousFutureSelector`: canonical symbol plus its currently mapped contract

pub mod continuous;
pub mod fundamental;
pub mod future_chain;
pub mod runner;
pub mod user_defined;

pub use continuous::ContinuousFutureSelector;
pub use fundamental::{CoarseFilter, FineFilter, FundamentalSelector};
pub use future_chain::FutureChainSelector;
pub use runner::{SelectionFailure, SelectorRunner, SelectorTick, SourceCandidates};
pub use user_defined::UserDefinedSelector;

use crate::domain::{Resolution, Symbol, Timestamp};
use crate::futures::ContinuousSpec;
use chrono::{Datelike, Duration, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A selection rule failed for one time step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("selection rule failed: {0}")]
    Rule(String),

    #[error("selection input unavailable: {0}")]
    DataUnavailable(String),
}

/// When a source is evaluated, defined in rule time (independent of the
/// resolution data is currently delivered at).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every simulation step.
    EveryStep,
    Hourly,
    Daily,
    /// Once per ISO week.
    Weekly,
    /// Once per calendar month.
    MonthStart,
    /// Once per fixed interval, aligned to the Unix epoch.
    Interval(Duration),
}

impl Cadence {
    /// Identifier of the cadence period containing `time`. `None` means every
    /// step is its own period.
    pub fn period_key(&self, time: Timestamp) -> Option<i64> {
        let day = i64::from(time.date().num_days_from_ce());
        match self {
            Cadence::EveryStep => None,
            Cadence::Hourly => Some(day * 24 + i64::from(time.hour())),
            Cadence::Daily => Some(day),
            Cadence::Weekly => {
                let week = time.iso_week();
                Some(i64::from(week.year()) * 100 + i64::from(week.week()))
            }
            Cadence::MonthStart => Some(i64::from(time.year()) * 12 + i64::from(time.month0())),
            Cadence::Interval(interval) => {
                let secs = interval.num_seconds().max(1);
                Some(time.and_utc().timestamp().div_euclid(secs))
            }
        }
    }

    /// Whether a source last fired in period `last` is due again at `time`.
    pub fn is_due(&self, last: Option<i64>, fired_before: bool, time: Timestamp) -> bool {
        if !fired_before {
            return true;
        }
        match self.period_key(time) {
            None => true,
            Some(key) => last != Some(key),
        }
    }
}

/// What to do when a source keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep reusing the last good candidate set for as long as failures last.
    #[default]
    RetainPrevious,
    /// Clear the source's candidates after this many consecutive failures.
    DeselectAfter(u32),
}

/// Per-source subscription settings.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSettings {
    /// Resolution requested for every symbol this source selects.
    pub resolution: Resolution,
    /// A symbol added by this source is kept by it at least this long.
    pub min_time_in_universe: Duration,
    /// Overrides the engine-wide failure policy for this source.
    pub failure_policy: Option<FailurePolicy>,
}

impl UniverseSettings {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution, min_time_in_universe: Duration::zero(), failure_policy: None }
    }

    pub fn with_min_time_in_universe(mut self, min: Duration) -> Self {
        self.min_time_in_universe = min;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self::new(Resolution::Minute)
    }
}

/// Candidate instruments produced by one source at one step.
///
/// Chain-style sources also report the concrete contract they currently
/// reference as `front`; the front contract is always part of `symbols`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    symbols: BTreeSet<Symbol>,
    front: Option<Symbol>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_front(mut self, front: Symbol) -> Self {
        self.symbols.insert(front.clone());
        self.front = Some(front);
        self
    }

    pub fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol);
    }

    pub fn symbols(&self) -> &BTreeSet<Symbol> {
        &self.symbols
    }

    pub fn front(&self) -> Option<&Symbol> {
        self.front.as_ref()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<Symbol> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        Self { symbols: iter.into_iter().collect(), front: None }
    }
}

/// Outcome of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Symbols(CandidateSet),
    /// Keep whatever the source selected last time.
    Unchanged,
}

/// Inputs available to a selection function.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub time: Timestamp,
    /// Contract currently mapped for this source, for continuous futures.
    pub mapped: Option<&'a Symbol>,
}

/// A selection source.
///
/// `select` must be a pure function of its context: the runner may retain
/// and reuse its result, and never calls it more than once per cadence period.
pub trait UniverseSelector: Send + Sync {
    /// Short kind label for logs and reports.
    fn kind(&self) -> &'static str;

    fn cadence(&self) -> Cadence;

    fn settings(&self) -> &UniverseSettings;

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selection, SelectionError>;

    /// Continuous-future sources describe the mapping they need.
    fn continuous_spec(&self) -> Option<ContinuousSpec> {
        None
    }
}

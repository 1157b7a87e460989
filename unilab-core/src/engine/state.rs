//! Engine configuration, mutable state, and run result types.

use super::context::{OrderIntent, PendingMutation, StrategyContext};
use super::warmup::{WarmupSpec, WarmupWindow};
use crate::domain::{IdGen, Resolution, SecurityChangeBatch, Symbol, Timestamp};
use crate::futures::{ContinuousContractMapper, MappingChangeEvent, MappingFailure, NormalizationMode};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::selection::{FailurePolicy, SelectionFailure, SelectorRunner};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("run end {end} is not after start {start}")]
    EmptyRange { start: Timestamp, end: Timestamp },

    #[error("resolution '{0}' cannot drive the simulation clock")]
    UnsteppableResolution(Resolution),

    #[error("warmup length must be positive")]
    EmptyWarmup,

    #[error("warmup reaches outside the representable time range")]
    WarmupOutOfRange,

    #[error("run window shorter than one {0} step")]
    RangeShorterThanStep(Resolution),
}

/// Configuration for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// First live instant. Warmup, if any, ends here.
    pub start: Timestamp,
    pub end: Timestamp,
    /// Resolution of live steps.
    pub nominal_resolution: Resolution,
    pub warmup: Option<WarmupSpec>,
    /// Applied to sources whose settings carry no policy of their own.
    pub failure_policy: FailurePolicy,
}

impl EngineConfig {
    pub fn new(start: Timestamp, end: Timestamp, nominal_resolution: Resolution) -> Self {
        Self {
            start,
            end,
            nominal_resolution,
            warmup: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_warmup(mut self, warmup: WarmupSpec) -> Self {
        self.warmup = Some(warmup);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end <= self.start {
            return Err(ConfigError::EmptyRange { start: self.start, end: self.end });
        }
        if !self.nominal_resolution.is_steppable() {
            return Err(ConfigError::UnsteppableResolution(self.nominal_resolution));
        }
        if self.end - self.start < self.nominal_resolution.span() {
            return Err(ConfigError::RangeShorterThanStep(self.nominal_resolution));
        }
        self.warmup_window().map(|_| ())
    }

    /// Warmup window ending at `start`, if warmup is configured.
    pub fn warmup_window(&self) -> Result<Option<WarmupWindow>, ConfigError> {
        self.warmup
            .as_ref()
            .map(|spec| WarmupWindow::from_spec(spec, self.start, self.nominal_resolution))
            .transpose()
    }
}

/// Mutable state that evolves step by step and that strategy callbacks read.
pub struct EngineState {
    pub registry: SubscriptionRegistry,
    pub selectors: SelectorRunner,
    pub mapper: ContinuousContractMapper,
    /// Explicit single-instrument subscriptions and their requested resolution.
    pub explicit: BTreeMap<Symbol, Resolution>,
    /// Mutations queued by callbacks, applied at the start of the next step.
    pub pending: Vec<PendingMutation>,
    pub orders: Vec<OrderIntent>,
    pub id_gen: IdGen,
}

impl EngineState {
    pub fn new(failure_policy: FailurePolicy) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            selectors: SelectorRunner::new(failure_policy),
            mapper: ContinuousContractMapper::new(),
            explicit: BTreeMap::new(),
            pending: Vec::new(),
            orders: Vec::new(),
            id_gen: IdGen::default(),
        }
    }

    pub fn context(&mut self, time: Timestamp, warming_up: bool) -> StrategyContext<'_> {
        StrategyContext::new(
            time,
            warming_up,
            &self.registry,
            &self.mapper,
            &self.selectors,
            &self.explicit,
            &mut self.pending,
            &mut self.orders,
            &mut self.id_gen,
        )
    }

    /// Normalization mode requested for each tracked canonical symbol.
    pub fn normalization_modes(&self) -> BTreeMap<Symbol, NormalizationMode> {
        self.mapper
            .selectors()
            .iter()
            .filter_map(|id| self.mapper.mapping(id))
            .map(|m| (m.canonical.clone(), m.settings.normalization))
            .collect()
    }
}

/// What one step delivered to strategy logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBatchSummary {
    pub time: Timestamp,
    pub start: Timestamp,
    pub resolution: Resolution,
    pub warming_up: bool,
    pub bars: usize,
    /// Bars returned by the feed but dropped by the engine.
    pub gated: usize,
}

impl DataBatchSummary {
    pub fn span(&self) -> Duration {
        self.time - self.start
    }
}

/// Outcome of a single engine step.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub time: Timestamp,
    pub warming_up: bool,
    pub changes: SecurityChangeBatch,
    pub mapping_events: Vec<MappingChangeEvent>,
    /// Remaps that failed while a previous contract stayed mapped.
    pub mapping_failures: Vec<MappingFailure>,
    pub failures: Vec<SelectionFailure>,
    /// Sources evaluated this step.
    pub fired: usize,
    pub data: DataBatchSummary,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub ticks: usize,
    /// Non-empty change batches, in delivery order.
    pub change_batches: Vec<SecurityChangeBatch>,
    pub mapping_events: Vec<MappingChangeEvent>,
    #[serde(default)]
    pub mapping_failures: Vec<MappingFailure>,
    pub selection_failures: Vec<SelectionFailure>,
    pub data_batches: Vec<DataBatchSummary>,
    pub order_intents: Vec<OrderIntent>,
    pub warmup_ended_at: Option<Timestamp>,
    pub final_tradable: BTreeSet<Symbol>,
    pub final_subscriptions: Vec<Subscription>,
    pub final_data_feeds: usize,
}

impl RunResult {
    /// Times at which `symbol` became tradable.
    pub fn added_times(&self, symbol: &Symbol) -> Vec<Timestamp> {
        self.change_batches
            .iter()
            .filter(|b| b.was_added(symbol))
            .map(SecurityChangeBatch::time)
            .collect()
    }

    /// Times at which `symbol` stopped being tradable.
    pub fn removed_times(&self, symbol: &Symbol) -> Vec<Timestamp> {
        self.change_batches
            .iter()
            .filter(|b| b.was_removed(symbol))
            .map(SecurityChangeBatch::time)
            .collect()
    }

    /// First data batch delivered after warmup.
    pub fn first_live_batch(&self) -> Option<&DataBatchSummary> {
        self.data_batches.iter().find(|b| !b.warming_up)
    }

    pub fn warmup_batches(&self) -> usize {
        self.data_batches.iter().filter(|b| b.warming_up).count()
    }

    pub fn total_bars(&self) -> usize {
        self.data_batches.iter().map(|b| b.bars).sum()
    }

    pub fn total_gated(&self) -> usize {
        self.data_batches.iter().map(|b| b.gated).sum()
    }
}

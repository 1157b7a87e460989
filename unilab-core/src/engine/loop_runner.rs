//! Step-by-step scheduler: the heart of the lifecycle engine.
//!
//! Each step runs these phases in order, on a single thread:
//! 1. Warmup: clear the window once time passes its end
//! 2. Apply mutations queued by strategy callbacks during the previous step
//! 3. Continuous mapping: re-evaluate every continuous source's contract
//! 4. Selection: run every due source to completion
//! 5. Reconciliation: merge all candidate sets into the registry
//! 6. Notification phase 1: deliver the change batch
//! 7. Data: request one feed per tradable symbol, gate what comes back
//! 8. Notification phase 2: deliver the data slice
//!
//! The clock steps at the nominal resolution throughout. A feed coarser than
//! the step (a warmup override or a daily subscription on an hourly run) is
//! only requested on the steps that close one of its bars.

use super::clock::{SimulationClock, TimeStep};
use super::context::{PendingMutation, Strategy};
use super::error::EngineError;
use super::notifier::ChangeNotifier;
use super::state::{DataBatchSummary, EngineConfig, EngineState, RunResult, TickReport};
use super::warmup::WarmupController;
use crate::data::{DataFeed, DataRequest, Slice};
use crate::domain::{Bar, Resolution, SelectorId, Symbol, Timestamp};
use crate::futures::{ContinuousContractMapper, MappingChangeEvent, MappingFailure};
use crate::reconcile::reconcile_with_retired;
use crate::registry::SubscriptionRegistry;
use crate::selection::SourceCandidates;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

pub struct Engine {
    config: EngineConfig,
    clock: SimulationClock,
    warmup: WarmupController,
    notifier: ChangeNotifier,
    state: EngineState,
    result: RunResult,
    initialized: bool,
    last_time: Option<Timestamp>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let window = config.warmup_window()?;
        let clock =
            SimulationClock::new(config.start, config.end, config.nominal_resolution, window);
        Ok(Self {
            clock,
            warmup: WarmupController::new(window),
            notifier: ChangeNotifier::new(),
            state: EngineState::new(config.failure_policy),
            result: RunResult::default(),
            initialized: false,
            last_time: None,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.state.registry
    }

    pub fn mapper(&self) -> &ContinuousContractMapper {
        &self.state.mapper
    }

    pub fn warmup(&self) -> &WarmupController {
        &self.warmup
    }

    /// Time of the last completed step.
    pub fn time(&self) -> Option<Timestamp> {
        self.last_time
    }

    pub fn is_warming_up(&self) -> bool {
        self.warmup.is_warming_up(self.last_time.unwrap_or_else(|| self.clock.cursor()))
    }

    pub fn is_finished(&self) -> bool {
        self.clock.is_finished()
    }

    /// Let `strategy` register its universes and explicit subscriptions.
    /// Called automatically by the first `step`.
    pub fn initialize(&mut self, strategy: &mut dyn Strategy) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        let time = self.clock.cursor();
        let warming_up = self.warmup.window().is_some();
        let mut ctx = self.state.context(time, warming_up);
        strategy
            .initialize(&mut ctx)
            .map_err(|source| fatal(EngineError::Strategy { time, source }))?;
        info!(
            start = %self.config.start,
            end = %self.config.end,
            resolution = %self.config.nominal_resolution,
            warmup_start = ?self.warmup.window().map(|w| w.start.to_string()),
            pending = self.state.pending.len(),
            "engine initialized"
        );
        Ok(())
    }

    /// Advance one step. Returns `None` once the run window is exhausted.
    pub fn step(
        &mut self,
        strategy: &mut dyn Strategy,
        feed: &mut dyn DataFeed,
    ) -> Result<Option<TickReport>, EngineError> {
        self.initialize(strategy)?;
        let Some(step) = self.clock.next() else {
            return Ok(None);
        };
        let time = step.time();
        self.result.ticks += 1;
        self.last_time = Some(time);

        if self.warmup.observe(time) {
            self.result.warmup_ended_at = self.warmup.ended_at();
            let mut ctx = self.state.context(time, false);
            strategy
                .on_warmup_finished(&mut ctx)
                .map_err(|source| fatal(EngineError::Strategy { time, source }))?;
        }
        let warming_up = self.warmup.is_warming_up(time);
        debug_assert_eq!(warming_up, step.warming_up);

        let retired = self.apply_pending(time)?;
        let (mapping_events, mapping_failures) = self.update_mappings(time)?;

        let tick = self.state.selectors.tick(time, &self.state.mapper);
        let fired = tick.fired();
        let failures = tick.failures;
        let mut sources = tick.sources;
        sources.push(SourceCandidates::explicit(&self.state.explicit));

        let reconciliation =
            reconcile_with_retired(&mut self.state.registry, &retired, &sources, time)
                .map_err(|e| fatal(EngineError::from(e)))?;
        let changes = reconciliation.changes;

        let mut ctx = self.state.context(time, warming_up);
        self.notifier
            .deliver_changes(&changes, strategy, &mut ctx)
            .map_err(|e| fatal(EngineError::from_delivery(time, e)))?;

        let (bars, gated) = self.fetch(&step, feed)?;
        let summary = DataBatchSummary {
            time,
            start: step.start,
            resolution: step.resolution,
            warming_up,
            bars: bars.len(),
            gated,
        };
        let slice = Slice {
            time,
            start: step.start,
            resolution: step.resolution,
            warming_up,
            bars,
            symbol_changes: mapping_events.clone(),
        };

        let mut ctx = self.state.context(time, warming_up);
        self.notifier
            .deliver_data(&slice, strategy, &mut ctx)
            .map_err(|e| fatal(EngineError::from_delivery(time, e)))?;

        if !changes.is_empty() {
            self.result.change_batches.push(changes.clone());
        }
        self.result.mapping_events.extend(mapping_events.iter().cloned());
        self.result.mapping_failures.extend(mapping_failures.iter().cloned());
        self.result.selection_failures.extend(failures.iter().cloned());
        self.result.data_batches.push(summary.clone());

        Ok(Some(TickReport {
            time,
            warming_up,
            changes,
            mapping_events,
            mapping_failures,
            failures,
            fired,
            data: summary,
        }))
    }

    /// Run every remaining step and collect the result.
    pub fn run(
        mut self,
        strategy: &mut dyn Strategy,
        feed: &mut dyn DataFeed,
    ) -> Result<RunResult, EngineError> {
        while self.step(strategy, feed)?.is_some() {}
        info!(
            ticks = self.result.ticks,
            change_batches = self.result.change_batches.len(),
            remaps = self.result.mapping_events.len(),
            mapping_failures = self.result.mapping_failures.len(),
            failures = self.result.selection_failures.len(),
            "run finished"
        );
        Ok(self.finish())
    }

    /// Snapshot the result so far without consuming the engine.
    pub fn result(&self) -> RunResult {
        let mut result = self.result.clone();
        self.fill_final(&mut result);
        result
    }

    fn finish(mut self) -> RunResult {
        let mut result = std::mem::take(&mut self.result);
        self.fill_final(&mut result);
        result
    }

    fn fill_final(&self, result: &mut RunResult) {
        result.order_intents = self.state.orders.clone();
        result.final_tradable = self.state.registry.tradable_set();
        result.final_subscriptions = self.state.registry.subscriptions();
        result.final_data_feeds = self.state.registry.data_feeds().len();
    }

    /// Apply queued mutations. Returns the universes removed, which lose their
    /// subscriptions this step even if re-added in the same batch.
    fn apply_pending(&mut self, time: Timestamp) -> Result<Vec<SelectorId>, EngineError> {
        let mut retired = Vec::new();
        for mutation in std::mem::take(&mut self.state.pending) {
            match mutation {
                PendingMutation::AddUniverse { id, selector } => {
                    let spec = selector.continuous_spec();
                    let kind = selector.kind();
                    self.state
                        .selectors
                        .add(id.clone(), selector)
                        .map_err(|e| fatal(EngineError::from(e)))?;
                    if let Some(spec) = spec {
                        self.state.mapper.register(&id, spec);
                    }
                    info!(selector = %id, kind, time = %time, "universe added");
                }
                PendingMutation::RemoveUniverse(id) => {
                    self.state.selectors.remove(&id);
                    self.state.mapper.unregister(&id);
                    info!(selector = %id, time = %time, "universe removed");
                    retired.push(id);
                }
                PendingMutation::AddSecurity { symbol, resolution } => {
                    debug!(symbol = %symbol, resolution = %resolution, "explicit subscription added");
                    self.state.explicit.insert(symbol, resolution);
                }
                PendingMutation::RemoveSecurity(symbol) => {
                    debug!(symbol = %symbol, "explicit subscription removed");
                    self.state.explicit.remove(&symbol);
                }
            }
        }
        Ok(retired)
    }

    /// Re-map every continuous source. An ambiguity is fatal only while the
    /// source has never been mapped; afterwards the previous contract stands
    /// and the failure is recorded.
    fn update_mappings(
        &mut self,
        time: Timestamp,
    ) -> Result<(Vec<MappingChangeEvent>, Vec<MappingFailure>), EngineError> {
        let mut events = Vec::new();
        let mut failures = Vec::new();
        for id in self.state.mapper.selectors() {
            match self.state.mapper.update(&id, time) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(source) if self.state.mapper.mapped(&id).is_none() => {
                    return Err(fatal(EngineError::Mapping { selector: id, time, source }));
                }
                Err(e) => {
                    warn!(selector = %id, time = %time, error = %e, "keeping previous contract mapping");
                    failures.push(MappingFailure { selector: id, time, message: e.to_string() });
                }
            }
        }
        Ok((events, failures))
    }

    /// Phase the step belongs to: the warmup window or the live run.
    fn phase_bounds(&self, step: &TimeStep) -> (Timestamp, Timestamp) {
        match self.warmup.window() {
            Some(w) if step.warming_up => (w.start, w.end),
            _ => (self.config.start, self.config.end),
        }
    }

    /// Fetch bars for every data feed whose interval closes on this step and
    /// drop anything that was not asked for.
    ///
    /// Requests sharing an interval go to the feed in one call. A bar is kept
    /// only if it matches its request's resolution and interval exactly, its
    /// symbol is tradable, and no bar for that symbol was kept already.
    fn fetch(
        &self,
        step: &TimeStep,
        feed: &mut dyn DataFeed,
    ) -> Result<(BTreeMap<Symbol, Bar>, usize), EngineError> {
        let time = step.time();
        let bounds = self.phase_bounds(step);
        let normalization = self.state.normalization_modes();

        let mut groups: BTreeMap<(Timestamp, Timestamp), Vec<DataRequest>> = BTreeMap::new();
        for (symbol, requested) in self.state.registry.data_feeds() {
            let resolution = self.warmup.effective_resolution(requested, time).max(step.resolution);
            let Some(interval) = step.data_interval(resolution, bounds) else {
                continue;
            };
            groups.entry(interval).or_default().push(DataRequest {
                resolution,
                normalization: normalization.get(&symbol).copied(),
                symbol,
            });
        }

        let mut bars = BTreeMap::new();
        let mut gated = 0;
        for ((start, end), requests) in &groups {
            let fetched = feed.fetch(requests, *start, *end).map_err(|source| {
                fatal(EngineError::Feed { feed: feed.name().to_string(), time, source })
            })?;
            let wanted: BTreeMap<&Symbol, Resolution> =
                requests.iter().map(|r| (&r.symbol, r.resolution)).collect();
            for bar in fetched {
                let admitted = wanted.get(&bar.symbol) == Some(&bar.resolution)
                    && bar.start == *start
                    && bar.end == *end
                    && self.state.registry.is_tradable(&bar.symbol)
                    && !bars.contains_key(&bar.symbol);
                if admitted {
                    bars.insert(bar.symbol.clone(), bar);
                } else {
                    gated += 1;
                }
            }
        }
        if gated > 0 {
            warn!(time = %time, gated, feed = feed.name(), "dropped bars outside this step's subscriptions");
        }
        Ok((bars, gated))
    }
}

fn fatal(err: EngineError) -> EngineError {
    error!(error = %err, "run aborted");
    err
}

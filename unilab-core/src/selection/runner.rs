//! Selector runner: evaluates every due source once per step.
//!
//! Runs all sources to completion before returning, so reconciliation always
//! sees the candidate sets of every source for the step. Sources that are not
//! due, or whose rule failed, contribute their previous candidate set.

use super::{CandidateSet, FailurePolicy, Selection, SelectionContext, UniverseSelector};
use crate::domain::{Resolution, SelectorId, Symbol, Timestamp};
use crate::futures::ContinuousContractMapper;
use crate::registry::SubscriptionError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

/// Candidate set of one source for the current step.
#[derive(Debug, Clone)]
pub struct SourceCandidates {
    pub selector: SelectorId,
    pub candidates: CandidateSet,
    pub resolution: Resolution,
    /// Per-symbol resolutions that replace `resolution`.
    pub overrides: BTreeMap<Symbol, Resolution>,
    pub min_time_in_universe: Duration,
    /// False when the set was carried over from an earlier step.
    pub fired: bool,
}

impl SourceCandidates {
    /// Source of explicit single-instrument subscriptions.
    pub fn explicit(symbols: &BTreeMap<Symbol, Resolution>) -> Self {
        Self {
            selector: SelectorId::manual(),
            candidates: symbols.keys().cloned().collect(),
            resolution: symbols.values().copied().min().unwrap_or(Resolution::Minute),
            overrides: symbols.clone(),
            min_time_in_universe: Duration::zero(),
            fired: true,
        }
    }

    pub fn resolution_for(&self, symbol: &Symbol) -> Resolution {
        self.overrides.get(symbol).copied().unwrap_or(self.resolution)
    }
}

/// A source's rule failed at `time`; its previous candidates were reused
/// unless the failure policy deselected it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionFailure {
    pub selector: SelectorId,
    pub time: Timestamp,
    pub message: String,
    pub consecutive_failures: u32,
    pub deselected: bool,
}

/// Output of one runner step.
#[derive(Debug, Clone, Default)]
pub struct SelectorTick {
    pub sources: Vec<SourceCandidates>,
    pub failures: Vec<SelectionFailure>,
}

impl SelectorTick {
    pub fn fired(&self) -> usize {
        self.sources.iter().filter(|s| s.fired).count()
    }
}

struct SourceState {
    selector: Box<dyn UniverseSelector>,
    last_period: Option<i64>,
    fired_before: bool,
    candidates: CandidateSet,
    consecutive_failures: u32,
}

pub struct SelectorRunner {
    sources: BTreeMap<SelectorId, SourceState>,
    default_policy: FailurePolicy,
}

impl SelectorRunner {
    pub fn new(default_policy: FailurePolicy) -> Self {
        Self { sources: BTreeMap::new(), default_policy }
    }

    pub fn add(
        &mut self,
        id: SelectorId,
        selector: Box<dyn UniverseSelector>,
    ) -> Result<(), SubscriptionError> {
        if id.is_manual() {
            return Err(SubscriptionError::ReservedSelector(id));
        }
        if self.sources.contains_key(&id) {
            return Err(SubscriptionError::SelectorAlreadyRegistered(id));
        }
        self.sources.insert(
            id,
            SourceState {
                selector,
                last_period: None,
                fired_before: false,
                candidates: CandidateSet::new(),
                consecutive_failures: 0,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, id: &SelectorId) -> Option<Box<dyn UniverseSelector>> {
        self.sources.remove(id).map(|s| s.selector)
    }

    pub fn contains(&self, id: &SelectorId) -> bool {
        self.sources.contains_key(id)
    }

    pub fn ids(&self) -> Vec<SelectorId> {
        self.sources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: &SelectorId) -> Option<&dyn UniverseSelector> {
        self.sources.get(id).map(|s| s.selector.as_ref())
    }

    /// Last candidate set of `id`.
    pub fn candidates(&self, id: &SelectorId) -> Option<&CandidateSet> {
        self.sources.get(id).map(|s| &s.candidates)
    }

    /// Evaluate every due source at `time`.
    pub fn tick(&mut self, time: Timestamp, mapper: &ContinuousContractMapper) -> SelectorTick {
        let mut out = SelectorTick::default();

        for (id, state) in self.sources.iter_mut() {
            let cadence = state.selector.cadence();
            let due = cadence.is_due(state.last_period, state.fired_before, time);
            let settings = state.selector.settings();

            if due {
                state.last_period = cadence.period_key(time);
                state.fired_before = true;

                let ctx = SelectionContext { time, mapped: mapper.mapped(id) };
                match state.selector.select(&ctx) {
                    Ok(Selection::Symbols(set)) => {
                        debug!(
                            selector = %id,
                            kind = state.selector.kind(),
                            time = %time,
                            candidates = set.len(),
                            "selector fired"
                        );
                        state.candidates = set;
                        state.consecutive_failures = 0;
                    }
                    Ok(Selection::Unchanged) => {
                        debug!(selector = %id, time = %time, "selector returned unchanged");
                        state.consecutive_failures = 0;
                    }
                    Err(e) => {
                        state.consecutive_failures += 1;
                        let policy = settings.failure_policy.unwrap_or(self.default_policy);
                        let deselected = matches!(
                            policy,
                            FailurePolicy::DeselectAfter(n) if state.consecutive_failures >= n
                        );
                        if deselected {
                            error!(
                                selector = %id,
                                time = %time,
                                failures = state.consecutive_failures,
                                error = %e,
                                "selector keeps failing, clearing its candidates"
                            );
                            state.candidates = CandidateSet::new();
                        } else {
                            warn!(
                                selector = %id,
                                time = %time,
                                failures = state.consecutive_failures,
                                error = %e,
                                "selection failed, reusing previous candidates"
                            );
                        }
                        out.failures.push(SelectionFailure {
                            selector: id.clone(),
                            time,
                            message: e.to_string(),
                            consecutive_failures: state.consecutive_failures,
                            deselected,
                        });
                    }
                }
            }

            out.sources.push(SourceCandidates {
                selector: id.clone(),
                candidates: state.candidates.clone(),
                resolution: settings.resolution,
                overrides: BTreeMap::new(),
                min_time_in_universe: settings.min_time_in_universe,
                fired: due,
            });
        }

        out
    }
}

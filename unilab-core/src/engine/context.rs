//! Strategy-facing surface of the engine.
//!
//! Strategy callbacks receive a `StrategyContext` scoped to the current step.
//! Reads reflect the state after this step's reconciliation. Mutations
//! (adding or removing universes and explicit securities) are queued and
//! applied at the start of the next step, so nothing a callback does can
//! change the batch or data currently being delivered.

use crate::data::Slice;
use crate::domain::{IdGen, OrderId, Resolution, SecurityChangeBatch, SelectorId, Symbol, Timestamp};
use crate::futures::{ContinuousContractMapper, ContinuousMapping};
use crate::registry::{SubscriptionError, SubscriptionRegistry};
use crate::selection::{SelectorRunner, UniverseSelector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("{0}")]
    Other(String),
}

/// Why an order intent was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRejection {
    #[error("cannot trade {0} while warming up")]
    WarmingUp(Symbol),

    #[error("{0} is not tradable")]
    NotTradable(Symbol),

    #[error("{0} is a canonical symbol, trade the mapped contract instead")]
    Canonical(Symbol),
}

/// An order submitted by strategy logic. Execution is not modelled; the
/// intent is recorded with its acceptance outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Assigned to accepted intents only.
    pub id: Option<OrderId>,
    pub time: Timestamp,
    pub symbol: Symbol,
    pub quantity: f64,
    pub rejection: Option<OrderRejection>,
}

impl OrderIntent {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Strategy logic driven by the engine.
pub trait Strategy {
    /// Called once before the first step. Typical use: register universes
    /// and explicit subscriptions.
    fn initialize(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError>;

    /// Called with every non-empty change batch, before that step's data.
    fn on_securities_changed(
        &mut self,
        _changes: &SecurityChangeBatch,
        _ctx: &mut StrategyContext<'_>,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called once per step with the data delivered for it.
    fn on_data(&mut self, slice: &Slice, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError>;

    /// Called once, at the first step past the warmup window.
    fn on_warmup_finished(&mut self, _ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        Ok(())
    }
}

/// A change requested by strategy logic, applied at the start of the next step.
pub enum PendingMutation {
    AddUniverse { id: SelectorId, selector: Box<dyn UniverseSelector> },
    RemoveUniverse(SelectorId),
    AddSecurity { symbol: Symbol, resolution: Resolution },
    RemoveSecurity(Symbol),
}

impl fmt::Debug for PendingMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingMutation::AddUniverse { id, selector } => f
                .debug_struct("AddUniverse")
                .field("id", id)
                .field("kind", &selector.kind())
                .finish(),
            PendingMutation::RemoveUniverse(id) => f.debug_tuple("RemoveUniverse").field(id).finish(),
            PendingMutation::AddSecurity { symbol, resolution } => f
                .debug_struct("AddSecurity")
                .field("symbol", symbol)
                .field("resolution", resolution)
                .finish(),
            PendingMutation::RemoveSecurity(symbol) => {
                f.debug_tuple("RemoveSecurity").field(symbol).finish()
            }
        }
    }
}

/// View of the engine handed to strategy callbacks for one step.
pub struct StrategyContext<'a> {
    time: Timestamp,
    warming_up: bool,
    registry: &'a SubscriptionRegistry,
    mapper: &'a ContinuousContractMapper,
    selectors: &'a SelectorRunner,
    explicit: &'a BTreeMap<Symbol, Resolution>,
    pending: &'a mut Vec<PendingMutation>,
    orders: &'a mut Vec<OrderIntent>,
    ids: &'a mut IdGen,
}

impl<'a> StrategyContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        time: Timestamp,
        warming_up: bool,
        registry: &'a SubscriptionRegistry,
        mapper: &'a ContinuousContractMapper,
        selectors: &'a SelectorRunner,
        explicit: &'a BTreeMap<Symbol, Resolution>,
        pending: &'a mut Vec<PendingMutation>,
        orders: &'a mut Vec<OrderIntent>,
        ids: &'a mut IdGen,
    ) -> Self {
        Self { time, warming_up, registry, mapper, selectors, explicit, pending, orders, ids }
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn is_warming_up(&self) -> bool {
        self.warming_up
    }

    pub fn is_tradable(&self, symbol: &Symbol) -> bool {
        self.registry.is_tradable(symbol)
    }

    pub fn tradable(&self) -> BTreeSet<Symbol> {
        self.registry.tradable_set()
    }

    /// Contract currently mapped by the continuous source `selector`.
    pub fn mapped(&self, selector: &SelectorId) -> Option<&Symbol> {
        self.mapper.mapped(selector)
    }

    pub fn mapping(&self, selector: &SelectorId) -> Option<&ContinuousMapping> {
        self.mapper.mapping(selector)
    }

    /// Finest resolution any source requests for `symbol`.
    pub fn effective_resolution(&self, symbol: &Symbol) -> Option<Resolution> {
        self.registry.effective_resolution(symbol)
    }

    /// Number of `(selector, symbol)` subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.registry.subscription_count()
    }

    pub fn data_feed_count(&self) -> usize {
        self.registry.data_feeds().len()
    }

    pub fn reference_count(&self, symbol: &Symbol) -> usize {
        self.registry.reference_count(symbol)
    }

    /// Queue a new universe. Fails on reserved or already registered ids.
    pub fn add_universe(
        &mut self,
        id: impl Into<SelectorId>,
        selector: Box<dyn UniverseSelector>,
    ) -> Result<SelectorId, SubscriptionError> {
        let id = id.into();
        if id.is_manual() {
            return Err(SubscriptionError::ReservedSelector(id));
        }
        if self.universe_registered(&id) {
            return Err(SubscriptionError::SelectorAlreadyRegistered(id));
        }
        self.pending.push(PendingMutation::AddUniverse { id: id.clone(), selector });
        Ok(id)
    }

    /// Queue removal of a universe and all its subscriptions.
    pub fn remove_universe(&mut self, id: &SelectorId) -> Result<(), SubscriptionError> {
        if !self.universe_registered(id) {
            return Err(SubscriptionError::UnknownSelector(id.clone()));
        }
        self.pending.push(PendingMutation::RemoveUniverse(id.clone()));
        Ok(())
    }

    /// Queue an explicit subscription. Subscribing twice is a programming error.
    pub fn add_security(
        &mut self,
        symbol: Symbol,
        resolution: Resolution,
    ) -> Result<(), SubscriptionError> {
        if self.explicitly_subscribed(&symbol) {
            return Err(SubscriptionError::DuplicateSubscription {
                selector: SelectorId::manual(),
                symbol,
            });
        }
        self.pending.push(PendingMutation::AddSecurity { symbol, resolution });
        Ok(())
    }

    /// Queue removal of an explicit subscription. Returns false if there was none.
    pub fn remove_security(&mut self, symbol: &Symbol) -> bool {
        if !self.explicitly_subscribed(symbol) {
            return false;
        }
        self.pending.push(PendingMutation::RemoveSecurity(symbol.clone()));
        true
    }

    /// Record an order intent, refused while warming up or for symbols that
    /// are not tradable.
    pub fn submit_order(&mut self, symbol: &Symbol, quantity: f64) -> Result<OrderId, OrderRejection> {
        let verdict = if self.warming_up {
            Err(OrderRejection::WarmingUp(symbol.clone()))
        } else if symbol.is_canonical() {
            Err(OrderRejection::Canonical(symbol.clone()))
        } else if !self.registry.is_tradable(symbol) {
            Err(OrderRejection::NotTradable(symbol.clone()))
        } else {
            Ok(self.ids.next_order_id())
        };
        self.orders.push(OrderIntent {
            id: verdict.as_ref().ok().copied(),
            time: self.time,
            symbol: symbol.clone(),
            quantity,
            rejection: verdict.as_ref().err().cloned(),
        });
        verdict
    }

    fn universe_registered(&self, id: &SelectorId) -> bool {
        let mut registered = self.selectors.contains(id);
        for m in self.pending.iter() {
            match m {
                PendingMutation::AddUniverse { id: added, .. } if added == id => registered = true,
                PendingMutation::RemoveUniverse(removed) if removed == id => registered = false,
                _ => {}
            }
        }
        registered
    }

    fn explicitly_subscribed(&self, symbol: &Symbol) -> bool {
        let mut subscribed = self.explicit.contains_key(symbol);
        for m in self.pending.iter() {
            match m {
                PendingMutation::AddSecurity { symbol: added, .. } if added == symbol => subscribed = true,
                PendingMutation::RemoveSecurity(removed) if removed == symbol => subscribed = false,
                _ => {}
            }
        }
        subscribed
    }
}

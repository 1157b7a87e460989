//! Scripted strategy: replays a scenario's setup and time-stamped actions.
//!
//! On initialization it registers every configured universe and explicit
//! subscription. During the run it performs each scripted action at the
//! first step whose time is at or after the action's `at`, and optionally
//! orders every newly added instrument. Everything it observes is tallied in
//! a `ScriptLog`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use unilab_core::data::Slice;
use unilab_core::domain::{SecurityChangeBatch, SelectorId, Timestamp};
use unilab_core::engine::{Strategy, StrategyContext, StrategyError};

use crate::build::Collaborators;
use crate::config::{parse_symbol, Action, ActionConfig, ScenarioConfig, SelectorConfig, SubscriptionConfig};

/// What the scripted strategy saw during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptLog {
    pub actions_applied: usize,
    /// Removals of explicit subscriptions that did not exist.
    pub missed_removals: usize,
    pub change_callbacks: usize,
    pub slices: usize,
    pub warmup_slices: usize,
    pub bars_seen: usize,
    pub remaps_seen: usize,
    pub warmup_finished_at: Option<Timestamp>,
}

pub struct ScriptedStrategy {
    collaborators: Collaborators,
    selectors: Vec<SelectorConfig>,
    subscriptions: Vec<SubscriptionConfig>,
    actions: Vec<ActionConfig>,
    next_action: usize,
    order_on_add: Option<f64>,
    log: ScriptLog,
}

impl ScriptedStrategy {
    pub fn from_config(config: &ScenarioConfig) -> Self {
        let mut actions = config.actions.clone();
        actions.sort_by_key(|a| a.at);
        Self {
            collaborators: Collaborators::from_config(config),
            selectors: config.selectors.clone(),
            subscriptions: config.subscriptions.clone(),
            actions,
            next_action: 0,
            order_on_add: config.order_on_add,
            log: ScriptLog::default(),
        }
    }

    pub fn log(&self) -> &ScriptLog {
        &self.log
    }

    pub fn into_log(self) -> ScriptLog {
        self.log
    }

    /// Actions not yet performed.
    pub fn remaining_actions(&self) -> usize {
        self.actions.len() - self.next_action
    }

    fn apply(&mut self, action: &Action, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        match action {
            Action::AddSecurity { ticker, expiry, resolution } => {
                ctx.add_security(parse_symbol(ticker, *expiry), *resolution)?;
            }
            Action::RemoveSecurity { ticker, expiry } => {
                let symbol = parse_symbol(ticker, *expiry);
                if !ctx.remove_security(&symbol) {
                    warn!(symbol = %symbol, time = %ctx.time(), "no explicit subscription to remove");
                    self.log.missed_removals += 1;
                }
            }
            Action::AddUniverse { selector } => {
                let built = self
                    .collaborators
                    .build_selector(selector)
                    .map_err(|e| StrategyError::Other(e.to_string()))?;
                ctx.add_universe(selector.id.as_str(), built)?;
            }
            Action::RemoveUniverse { id } => {
                ctx.remove_universe(&SelectorId::new(id.as_str()))?;
            }
            Action::Order { ticker, expiry, quantity } => {
                let symbol = parse_symbol(ticker, *expiry);
                if let Err(rejection) = ctx.submit_order(&symbol, *quantity) {
                    debug!(symbol = %symbol, %rejection, "scripted order rejected");
                }
            }
        }
        self.log.actions_applied += 1;
        Ok(())
    }
}

impl Strategy for ScriptedStrategy {
    fn initialize(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        for selector in &self.selectors {
            let built = self
                .collaborators
                .build_selector(selector)
                .map_err(|e| StrategyError::Other(e.to_string()))?;
            ctx.add_universe(selector.id.as_str(), built)?;
        }
        for sub in &self.subscriptions {
            ctx.add_security(sub.symbol(), sub.resolution)?;
        }
        Ok(())
    }

    fn on_securities_changed(
        &mut self,
        changes: &SecurityChangeBatch,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<(), StrategyError> {
        self.log.change_callbacks += 1;
        if let Some(quantity) = self.order_on_add {
            for symbol in changes.added().iter().filter(|s| !s.is_canonical()) {
                if let Err(rejection) = ctx.submit_order(symbol, quantity) {
                    debug!(symbol = %symbol, %rejection, "order on add rejected");
                }
            }
        }
        Ok(())
    }

    fn on_data(&mut self, slice: &Slice, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        self.log.slices += 1;
        if slice.warming_up {
            self.log.warmup_slices += 1;
        }
        self.log.bars_seen += slice.len();
        self.log.remaps_seen += slice.symbol_changes.len();

        while let Some(next) = self.actions.get(self.next_action) {
            if next.at > ctx.time() {
                break;
            }
            let action = next.action.clone();
            self.next_action += 1;
            self.apply(&action, ctx)?;
        }
        Ok(())
    }

    fn on_warmup_finished(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        self.log.warmup_finished_at = Some(ctx.time());
        Ok(())
    }
}

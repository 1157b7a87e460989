use super::{
    Cadence, CandidateSet, Selection, SelectionContext, SelectionError, UniverseSelector,
    UniverseSettings,
};
use crate::domain::Symbol;
use crate::futures::ContractChain;
use std::sync::Arc;

/// Contracts of one futures root whose days-to-expiry fall inside a window.
pub struct FutureChainSelector {
    canonical: Symbol,
    chain: Arc<dyn ContractChain>,
    min_days: i64,
    max_days: i64,
    front_only: bool,
    settings: UniverseSettings,
}

impl FutureChainSelector {
    pub fn new(canonical: Symbol, chain: Arc<dyn ContractChain>, settings: UniverseSettings) -> Self {
        Self { canonical, chain, min_days: 0, max_days: 365, front_only: false, settings }
    }

    /// Keep contracts expiring between `min_days` and `max_days` from today, inclusive.
    pub fn with_expiry_window(mut self, min_days: i64, max_days: i64) -> Self {
        self.min_days = min_days;
        self.max_days = max_days;
        self
    }

    pub fn front_month_only(mut self, yes: bool) -> Self {
        self.front_only = yes;
        self
    }
}

impl UniverseSelector for FutureChainSelector {
    fn kind(&self) -> &'static str {
        "future_chain"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selection, SelectionError> {
        let today = ctx.time.date();
        let mut eligible: Vec<Symbol> = self
            .chain
            .contracts(&self.canonical, today)
            .into_iter()
            .filter(|c| {
                let days = c.days_to_expiry(today);
                days >= self.min_days.max(0) && days <= self.max_days
            })
            .map(|c| c.symbol)
            .collect();
        eligible.sort_by_key(|s| s.expiry);

        let Some(front) = eligible.first().cloned() else {
            return Ok(Selection::Symbols(CandidateSet::new()));
        };
        let set = if self.front_only {
            CandidateSet::new().with_front(front)
        } else {
            let mut set = CandidateSet::new().with_front(front);
            for symbol in eligible {
                set.insert(symbol);
            }
            set
        };
        Ok(Selection::Symbols(set))
    }
}

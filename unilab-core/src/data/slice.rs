use crate::domain::{Bar, Resolution, Symbol, Timestamp};
use crate::futures::MappingChangeEvent;
use chrono::Duration;
use std::collections::BTreeMap;

/// Data batch delivered to strategy logic for one step.
#[derive(Debug, Clone)]
pub struct Slice {
    pub time: Timestamp,
    pub start: Timestamp,
    /// Nominal resolution of the step. Each bar carries its own resolution,
    /// which is coarser for override or coarse-subscription bars.
    pub resolution: Resolution,
    pub warming_up: bool,
    pub bars: BTreeMap<Symbol, Bar>,
    pub symbol_changes: Vec<MappingChangeEvent>,
}

impl Slice {
    pub fn span(&self) -> Duration {
        self.time - self.start
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Bar> {
        self.bars.get(symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.bars.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty() && self.symbol_changes.is_empty()
    }
}

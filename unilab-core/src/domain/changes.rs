//! Security change batches: the add/remove delta of one time step.

use super::{Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Instruments that became tradable or stopped being tradable at `time`.
///
/// Built once by reconciliation and never mutated afterwards. A symbol never
/// appears in both sets of the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityChangeBatch {
    time: Timestamp,
    added: BTreeSet<Symbol>,
    removed: BTreeSet<Symbol>,
}

impl SecurityChangeBatch {
    /// Build a batch from the tradable sets before and after a reconciliation pass.
    pub fn between(
        time: Timestamp,
        previous: &BTreeSet<Symbol>,
        current: &BTreeSet<Symbol>,
    ) -> Self {
        Self {
            time,
            added: current.difference(previous).cloned().collect(),
            removed: previous.difference(current).cloned().collect(),
        }
    }

    pub fn empty(time: Timestamp) -> Self {
        Self { time, added: BTreeSet::new(), removed: BTreeSet::new() }
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn added(&self) -> &BTreeSet<Symbol> {
        &self.added
    }

    pub fn removed(&self) -> &BTreeSet<Symbol> {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn was_added(&self, symbol: &Symbol) -> bool {
        self.added.contains(symbol)
    }

    pub fn was_removed(&self, symbol: &Symbol) -> bool {
        self.removed.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn between_computes_both_directions() {
        let prev: BTreeSet<_> = [Symbol::equity("SPY"), Symbol::equity("AAPL")].into();
        let next: BTreeSet<_> = [Symbol::equity("SPY"), Symbol::equity("MSFT")].into();
        let batch = SecurityChangeBatch::between(t0(), &prev, &next);
        assert!(batch.was_added(&Symbol::equity("MSFT")));
        assert!(batch.was_removed(&Symbol::equity("AAPL")));
        assert!(!batch.was_added(&Symbol::equity("SPY")));
        assert!(!batch.was_removed(&Symbol::equity("SPY")));
        assert_eq!(batch.time(), t0());
    }

    #[test]
    fn identical_sets_are_empty() {
        let set: BTreeSet<_> = [Symbol::equity("SPY")].into();
        assert!(SecurityChangeBatch::between(t0(), &set, &set).is_empty());
        assert!(SecurityChangeBatch::empty(t0()).is_empty());
    }
}

//! Subscription registry: per-instrument ownership by selection sources.
//!
//! Each `(selector, symbol)` pair is one subscription. Several selectors may
//! subscribe to the same symbol; they share a single data feed whose
//! resolution is the finest any of them requested. A symbol is tradable
//! exactly while at least one subscription references it.
//!
//! Only the reconciliation pass mutates the registry during a tick; everything
//! else reads it.

use crate::domain::{Resolution, SelectorId, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("selector '{selector}' already subscribes to {symbol}")]
    DuplicateSubscription { selector: SelectorId, symbol: Symbol },

    #[error("unknown selector '{0}'")]
    UnknownSelector(SelectorId),

    #[error("selector '{0}' is already registered")]
    SelectorAlreadyRegistered(SelectorId),

    #[error("selector id '{0}' is reserved for explicit subscriptions")]
    ReservedSelector(SelectorId),
}

/// A single `(selector, symbol)` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub selector: SelectorId,
    pub symbol: Symbol,
    pub resolution: Resolution,
    pub added_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grant {
    resolution: Resolution,
    added_at: Timestamp,
}

/// Reference-counted subscription table.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    by_symbol: BTreeMap<Symbol, BTreeMap<SelectorId, Grant>>,
    by_selector: BTreeMap<SelectorId, BTreeSet<Symbol>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `selector`'s interest in `symbol`.
    ///
    /// A symbol already held by another selector gains one more owner; no
    /// second feed is created. The same selector adding the same symbol twice
    /// without a removal in between is an error.
    pub fn add(
        &mut self,
        selector: &SelectorId,
        symbol: &Symbol,
        resolution: Resolution,
        added_at: Timestamp,
    ) -> Result<(), SubscriptionError> {
        let owners = self.by_symbol.entry(symbol.clone()).or_default();
        if owners.contains_key(selector) {
            return Err(SubscriptionError::DuplicateSubscription {
                selector: selector.clone(),
                symbol: symbol.clone(),
            });
        }
        owners.insert(selector.clone(), Grant { resolution, added_at });
        self.by_selector.entry(selector.clone()).or_default().insert(symbol.clone());
        Ok(())
    }

    /// Drop `selector`'s subscription to `symbol`, returning it if it existed.
    ///
    /// The symbol stays tradable while other owners remain.
    pub fn remove(&mut self, selector: &SelectorId, symbol: &Symbol) -> Option<Subscription> {
        let owners = self.by_symbol.get_mut(symbol)?;
        let grant = owners.remove(selector)?;
        if owners.is_empty() {
            self.by_symbol.remove(symbol);
        }
        if let Some(symbols) = self.by_selector.get_mut(selector) {
            symbols.remove(symbol);
            if symbols.is_empty() {
                self.by_selector.remove(selector);
            }
        }
        Some(Subscription {
            selector: selector.clone(),
            symbol: symbol.clone(),
            resolution: grant.resolution,
            added_at: grant.added_at,
        })
    }

    /// Change the resolution an existing subscription requests.
    pub fn set_resolution(
        &mut self,
        selector: &SelectorId,
        symbol: &Symbol,
        resolution: Resolution,
    ) -> bool {
        match self.by_symbol.get_mut(symbol).and_then(|o| o.get_mut(selector)) {
            Some(grant) => {
                grant.resolution = resolution;
                true
            }
            None => false,
        }
    }

    pub fn is_tradable(&self, symbol: &Symbol) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    /// Finest resolution requested across all owners, if the symbol is subscribed.
    pub fn effective_resolution(&self, symbol: &Symbol) -> Option<Resolution> {
        self.by_symbol.get(symbol)?.values().map(|g| g.resolution).min()
    }

    pub fn reference_count(&self, symbol: &Symbol) -> usize {
        self.by_symbol.get(symbol).map_or(0, |o| o.len())
    }

    pub fn owners(&self, symbol: &Symbol) -> Vec<&SelectorId> {
        self.by_symbol.get(symbol).map(|o| o.keys().collect()).unwrap_or_default()
    }

    pub fn is_subscribed(&self, selector: &SelectorId, symbol: &Symbol) -> bool {
        self.by_symbol.get(symbol).is_some_and(|o| o.contains_key(selector))
    }

    pub fn added_at(&self, selector: &SelectorId, symbol: &Symbol) -> Option<Timestamp> {
        self.by_symbol.get(symbol)?.get(selector).map(|g| g.added_at)
    }

    pub fn resolution_for(&self, selector: &SelectorId, symbol: &Symbol) -> Option<Resolution> {
        self.by_symbol.get(symbol)?.get(selector).map(|g| g.resolution)
    }

    /// Symbols currently owned by `selector`.
    pub fn symbols_for(&self, selector: &SelectorId) -> BTreeSet<Symbol> {
        self.by_selector.get(selector).cloned().unwrap_or_default()
    }

    /// Selectors owning at least one subscription.
    pub fn selectors(&self) -> Vec<SelectorId> {
        self.by_selector.keys().cloned().collect()
    }

    pub fn tradable_set(&self) -> BTreeSet<Symbol> {
        self.by_symbol.keys().cloned().collect()
    }

    /// Total `(selector, symbol)` pairs.
    pub fn subscription_count(&self) -> usize {
        self.by_symbol.values().map(|o| o.len()).sum()
    }

    /// One `(symbol, effective resolution)` pair per distinct subscribed symbol.
    pub fn data_feeds(&self) -> Vec<(Symbol, Resolution)> {
        self.by_symbol
            .iter()
            .filter_map(|(symbol, owners)| {
                owners.values().map(|g| g.resolution).min().map(|r| (symbol.clone(), r))
            })
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.by_symbol
            .iter()
            .flat_map(|(symbol, owners)| {
                owners.iter().map(move |(selector, grant)| Subscription {
                    selector: selector.clone(),
                    symbol: symbol.clone(),
                    resolution: grant.resolution,
                    added_at: grant.added_at,
                })
            })
            .collect()
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
    fn shared_symbol_is_reference_counted() {
        let mut reg = SubscriptionRegistry::new();
        let spy = Symbol::equity("SPY");
        let a = SelectorId::new("a");
        let b = SelectorId::new("b");

        reg.add(&a, &spy, Resolution::Daily, t0()).unwrap();
        reg.add(&b, &spy, Resolution::Hour, t0()).unwrap();
        assert_eq!(reg.reference_count(&spy), 2);
        assert_eq!(reg.data_feeds().len(), 1);
        assert_eq!(reg.subscription_count(), 2);

        assert!(reg.remove(&a, &spy).is_some());
        assert!(reg.is_tradable(&spy));
        assert!(reg.remove(&b, &spy).is_some());
        assert!(!reg.is_tradable(&spy));
        assert!(reg.selectors().is_empty());
    }

    #[test]
    fn effective_resolution_is_finest() {
        let mut reg = SubscriptionRegistry::new();
        let spy = Symbol::equity("SPY");
        reg.add(&SelectorId::new("a"), &spy, Resolution::Daily, t0()).unwrap();
        reg.add(&SelectorId::new("b"), &spy, Resolution::Minute, t0()).unwrap();
        assert_eq!(reg.effective_resolution(&spy), Some(Resolution::Minute));

        reg.remove(&SelectorId::new("b"), &spy);
        assert_eq!(reg.effective_resolution(&spy), Some(Resolution::Daily));
        assert_eq!(reg.effective_resolution(&Symbol::equity("QQQ")), None);
    }

    #[test]
    fn duplicate_add_from_same_selector_fails() {
        let mut reg = SubscriptionRegistry::new();
        let spy = Symbol::equity("SPY");
        let a = SelectorId::new("a");
        reg.add(&a, &spy, Resolution::Daily, t0()).unwrap();
        let err = reg.add(&a, &spy, Resolution::Daily, t0()).unwrap_err();
        assert!(matches!(err, SubscriptionError::DuplicateSubscription { .. }));

        // After an intervening remove the same add is fine again.
        reg.remove(&a, &spy);
        assert!(reg.add(&a, &spy, Resolution::Daily, t0()).is_ok());
    }

    #[test]
    fn removing_unknown_is_noop() {
        let mut reg = SubscriptionRegistry::new();
        assert!(reg.remove(&SelectorId::new("a"), &Symbol::equity("SPY")).is_none());
    }

    #[test]
    fn set_resolution_updates_grant() {
        let mut reg = SubscriptionRegistry::new();
        let spy = Symbol::equity("SPY");
        let a = SelectorId::new("a");
        reg.add(&a, &spy, Resolution::Daily, t0()).unwrap();
        assert!(reg.set_resolution(&a, &spy, Resolution::Hour));
        assert_eq!(reg.resolution_for(&a, &spy), Some(Resolution::Hour));
        assert!(!reg.set_resolution(&SelectorId::new("b"), &spy, Resolution::Hour));
    }
}

//! Futures contract chains.
//!
//! A `ContractChain` answers which concrete contracts of a futures root are
//! listed on a given day, with the volume and open interest used by the
//! rollover mapping modes. `StaticContractChain` keeps everything in memory.

use crate::domain::Symbol;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A listed contract and its activity on the queried day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureContract {
    pub symbol: Symbol,
    /// Last trading day.
    pub expiry: NaiveDate,
    pub volume: u64,
    pub open_interest: u64,
}

impl FutureContract {
    pub fn new(root: &str, expiry: NaiveDate) -> Self {
        Self { symbol: Symbol::future(root, expiry), expiry, volume: 0, open_interest: 0 }
    }

    pub fn with_activity(mut self, volume: u64, open_interest: u64) -> Self {
        self.volume = volume;
        self.open_interest = open_interest;
        self
    }

    pub fn days_to_expiry(&self, date: NaiveDate) -> i64 {
        (self.expiry - date).num_days()
    }
}

pub trait ContractChain: Send + Sync {
    /// Contracts of `canonical`'s root that have not expired before `date`.
    fn contracts(&self, canonical: &Symbol, date: NaiveDate) -> Vec<FutureContract>;
}

/// In-memory chain keyed by root ticker.
///
/// Per-day activity overrides replace a contract's volume/open interest from
/// their date onwards.
#[derive(Debug, Clone, Default)]
pub struct StaticContractChain {
    contracts: BTreeMap<String, Vec<FutureContract>>,
    activity: BTreeMap<Symbol, BTreeMap<NaiveDate, (u64, u64)>>,
}

impl StaticContractChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contract(mut self, contract: FutureContract) -> Self {
        self.contracts.entry(contract.symbol.ticker.clone()).or_default().push(contract);
        self
    }

    pub fn with_activity(
        mut self,
        symbol: &Symbol,
        from: NaiveDate,
        volume: u64,
        open_interest: u64,
    ) -> Self {
        self.activity.entry(symbol.clone()).or_default().insert(from, (volume, open_interest));
        self
    }

    fn activity_on(&self, contract: &FutureContract, date: NaiveDate) -> (u64, u64) {
        self.activity
            .get(&contract.symbol)
            .and_then(|days| days.range(..=date).next_back().map(|(_, a)| *a))
            .unwrap_or((contract.volume, contract.open_interest))
    }
}

impl ContractChain for StaticContractChain {
    fn contracts(&self, canonical: &Symbol, date: NaiveDate) -> Vec<FutureContract> {
        let Some(listed) = self.contracts.get(&canonical.ticker) else {
            return Vec::new();
        };
        let mut out: Vec<FutureContract> = listed
            .iter()
            .filter(|c| c.symbol.market == canonical.market && c.expiry >= date)
            .map(|c| {
                let (volume, open_interest) = self.activity_on(c, date);
                FutureContract { volume, open_interest, ..c.clone() }
            })
            .collect();
        out.sort_by_key(|c| c.expiry);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn es_chain() -> StaticContractChain {
        StaticContractChain::new()
            .with_contract(FutureContract::new("ES", date(2014, 3, 21)))
            .with_contract(FutureContract::new("ES", date(2013, 12, 20)))
            .with_contract(FutureContract::new("NQ", date(2013, 12, 20)))
    }

    #[test]
    fn contracts_are_sorted_and_filtered_by_root() {
        let chain = es_chain();
        let listed = chain.contracts(&Symbol::canonical_future("ES"), date(2013, 10, 7));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].expiry, date(2013, 12, 20));
        assert!(listed.iter().all(|c| c.symbol.ticker == "ES"));
    }

    #[test]
    fn expired_contracts_drop_out() {
        let chain = es_chain();
        let listed = chain.contracts(&Symbol::canonical_future("ES"), date(2013, 12, 21));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].expiry, date(2014, 3, 21));
    }

    #[test]
    fn activity_overrides_apply_from_their_date() {
        let dec = Symbol::future("ES", date(2013, 12, 20));
        let chain = es_chain().with_activity(&dec, date(2013, 11, 1), 500, 900);
        let before = chain.contracts(&Symbol::canonical_future("ES"), date(2013, 10, 31));
        let after = chain.contracts(&Symbol::canonical_future("ES"), date(2013, 11, 2));
        assert_eq!(before[0].open_interest, 0);
        assert_eq!(after[0].open_interest, 900);
        assert_eq!(after[0].volume, 500);
    }

    #[test]
    fn unknown_root_is_empty() {
        let chain = es_chain();
        assert!(chain.contracts(&Symbol::canonical_future("CL"), date(2013, 10, 7)).is_empty());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default market for symbols created without an explicit one.
pub const DEFAULT_MARKET: &str = "usa";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equity,
    Future,
    Forex,
    Crypto,
    Index,
}

/// Immutable instrument identity.
///
/// A symbol carries no lifecycle state: whether it is tradable, which
/// selectors want it and at what resolution all live in the subscription
/// registry. Futures carry their expiry (last trading day); the canonical
/// continuous symbol of a futures root has none.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub asset_class: AssetClass,
    pub market: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
}

impl Symbol {
    pub fn new(
        ticker: impl Into<String>,
        asset_class: AssetClass,
        market: impl Into<String>,
        expiry: Option<NaiveDate>,
    ) -> Self {
        Self { ticker: ticker.into(), asset_class, market: market.into(), expiry }
    }

    pub fn equity(ticker: impl Into<String>) -> Self {
        Self::new(ticker, AssetClass::Equity, DEFAULT_MARKET, None)
    }

    /// A concrete futures contract of `root` expiring on `expiry`.
    pub fn future(root: impl Into<String>, expiry: NaiveDate) -> Self {
        Self::new(root, AssetClass::Future, DEFAULT_MARKET, Some(expiry))
    }

    /// The canonical (continuous) symbol of a futures root.
    pub fn canonical_future(root: impl Into<String>) -> Self {
        Self::new(root, AssetClass::Future, DEFAULT_MARKET, None)
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    /// True for the synthetic continuous symbol of a futures root.
    pub fn is_canonical(&self) -> bool {
        self.asset_class == AssetClass::Future && self.expiry.is_none()
    }

    /// True for a concrete, expiring futures contract.
    pub fn is_contract(&self) -> bool {
        self.asset_class == AssetClass::Future && self.expiry.is_some()
    }

    /// The canonical symbol sharing this contract's root and market.
    pub fn canonical(&self) -> Symbol {
        Symbol::new(self.ticker.clone(), self.asset_class, self.market.clone(), None)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.asset_class, self.expiry) {
            (AssetClass::Future, Some(expiry)) => write!(f, "{} {}", self.ticker, expiry),
            (AssetClass::Future, None) => write!(f, "/{}", self.ticker),
            _ => f.write_str(&self.ticker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec_2013() -> NaiveDate {
        NaiveDate::from_ymd_opt(2013, 12, 20).unwrap()
    }

    #[test]
    fn display_forms() {
        assert_eq!(Symbol::equity("SPY").to_string(), "SPY");
        assert_eq!(Symbol::future("ES", dec_2013()).to_string(), "ES 2013-12-20");
        assert_eq!(Symbol::canonical_future("ES").to_string(), "/ES");
    }

    #[test]
    fn canonical_and_contract_flags() {
        let contract = Symbol::future("ES", dec_2013());
        assert!(contract.is_contract());
        assert!(!contract.is_canonical());
        assert_eq!(contract.canonical(), Symbol::canonical_future("ES"));
        assert!(!Symbol::equity("SPY").is_canonical());
    }

    #[test]
    fn same_ticker_different_expiry_are_distinct() {
        let dec = Symbol::future("ES", dec_2013());
        let mar = Symbol::future("ES", NaiveDate::from_ymd_opt(2014, 3, 21).unwrap());
        assert_ne!(dec, mar);
        assert!(dec < mar);
    }

    #[test]
    fn market_override() {
        let btc = Symbol::new("BTCUSD", AssetClass::Crypto, "coinbase", None);
        assert_eq!(btc.market, "coinbase");
        assert_eq!(Symbol::equity("SPY").with_market("india").market, "india");
    }
}

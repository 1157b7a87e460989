//! Fundamental data collaborator for coarse/fine universe selection.
//!
//! The engine never parses fundamental files; it asks a `FundamentalSource`
//! for the rows of a given day. `StaticFundamentals` is an in-memory source
//! used by scenarios and tests.

use crate::domain::Symbol;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily coarse row: price and liquidity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoarseFundamental {
    pub symbol: Symbol,
    pub price: f64,
    pub volume: u64,
    pub dollar_volume: f64,
    pub has_fundamental_data: bool,
}

/// Fine row: company-level facts for symbols that passed the coarse filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineFundamental {
    pub symbol: Symbol,
    pub market_cap: f64,
    pub sector: String,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
}

pub trait FundamentalSource: Send + Sync {
    /// Coarse rows as of `date`. An unknown date yields `None`.
    fn coarse(&self, date: NaiveDate) -> Option<Vec<CoarseFundamental>>;

    /// Fine rows for `symbols` as of `date`; symbols without data are skipped.
    fn fine(&self, date: NaiveDate, symbols: &[Symbol]) -> Vec<FineFundamental>;
}

/// In-memory fundamentals.
///
/// Coarse rows are keyed by date; a day without its own rows uses the most
/// recent earlier day. Fine rows are static per symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticFundamentals {
    coarse: BTreeMap<NaiveDate, Vec<CoarseFundamental>>,
    fine: BTreeMap<Symbol, FineFundamental>,
}

impl StaticFundamentals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coarse(mut self, date: NaiveDate, rows: Vec<CoarseFundamental>) -> Self {
        self.coarse.insert(date, rows);
        self
    }

    pub fn with_fine(mut self, row: FineFundamental) -> Self {
        self.fine.insert(row.symbol.clone(), row);
        self
    }
}

impl FundamentalSource for StaticFundamentals {
    fn coarse(&self, date: NaiveDate) -> Option<Vec<CoarseFundamental>> {
        self.coarse.range(..=date).next_back().map(|(_, rows)| rows.clone())
    }

    fn fine(&self, _date: NaiveDate, symbols: &[Symbol]) -> Vec<FineFundamental> {
        symbols.iter().filter_map(|s| self.fine.get(s).cloned()).collect()
    }
}

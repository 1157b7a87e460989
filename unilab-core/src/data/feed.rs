//! Data feed trait and structured error types.
//!
//! The `DataFeed` trait abstracts over whatever produces bars (file replay,
//! a synthetic generator, a test double). The engine tells the feed which
//! `(symbol, resolution)` pairs the current step needs and gates what comes
//! back; it never parses data itself.

use crate::domain::{Bar, Resolution, Symbol, Timestamp};
use crate::futures::NormalizationMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One subscription the feed must satisfy for the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    pub symbol: Symbol,
    pub resolution: Resolution,
    /// Set for canonical continuous-future symbols only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<NormalizationMode>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unavailable: {0}")]
    Unavailable(String),

    #[error("no data for {symbol} at {resolution}")]
    NoData { symbol: Symbol, resolution: Resolution },

    #[error("feed error: {0}")]
    Other(String),
}

pub trait DataFeed: Send {
    /// Human-readable name of this feed.
    fn name(&self) -> &str;

    /// Bars for `requests` covering `(start, end]`. The engine calls this once
    /// per distinct interval in a step; coarse feeds get their bar's interval,
    /// not the step's.
    fn fetch(
        &mut self,
        requests: &[DataRequest],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Bar>, FeedError>;
}

/// Feed producing nothing. Useful when only the change stream matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFeed;

impl DataFeed for EmptyFeed {
    fn name(&self) -> &str {
        "empty"
    }

    fn fetch(
        &mut self,
        _requests: &[DataRequest],
        _start: Timestamp,
        _end: Timestamp,
    ) -> Result<Vec<Bar>, FeedError> {
        Ok(Vec::new())
    }
}

/// Feed emitting one flat bar per request spanning exactly the requested
/// interval.
///
/// Bars are stamped with the requested resolution, so the engine's
/// resolution gate always passes them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatFeed {
    pub price: f64,
}

impl DataFeed for FlatFeed {
    fn name(&self) -> &str {
        "flat"
    }

    fn fetch(
        &mut self,
        requests: &[DataRequest],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Bar>, FeedError> {
        let price = if self.price > 0.0 { self.price } else { 100.0 };
        Ok(requests
            .iter()
            .map(|r| Bar {
                symbol: r.symbol.clone(),
                start,
                end,
                resolution: r.resolution,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 0,
            })
            .collect())
    }
}

//! Deterministic synthetic data feed.
//!
//! Each requested `(symbol, step)` gets its own RNG, seeded from BLAKE3 over
//! the master seed, the symbol and the step end. Bars therefore depend only
//! on what was asked for, never on request order or on which other symbols
//! share the step, so identical scenarios produce identical data whether
//! they run alone or inside a parallel batch.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use unilab_core::data::{DataFeed, DataRequest, FeedError};
use unilab_core::domain::{Bar, Symbol, Timestamp};

use crate::config::FeedConfig;

pub struct SyntheticFeed {
    seed: u64,
    config: FeedConfig,
    /// Last close per symbol; the next bar opens there.
    last_close: BTreeMap<Symbol, f64>,
}

impl SyntheticFeed {
    pub fn new(seed: u64, config: FeedConfig) -> Self {
        Self { seed, config, last_close: BTreeMap::new() }
    }

    /// Derive the sub-seed for one symbol and step.
    pub fn sub_seed(&self, symbol: &Symbol, end: Timestamp) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.to_string().as_bytes());
        hasher.update(&end.and_utc().timestamp().to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    fn bar(&mut self, request: &DataRequest, start: Timestamp, end: Timestamp) -> Option<Bar> {
        let mut rng = StdRng::seed_from_u64(self.sub_seed(&request.symbol, end));
        if rng.gen::<f64>() < self.config.missing_rate {
            return None;
        }

        let vol = self.config.volatility;
        let open = *self.last_close.get(&request.symbol).unwrap_or(&self.config.base_price);
        let close = (open * (1.0 + rng.gen_range(-1.0..=1.0) * vol)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen::<f64>() * vol * 0.5);
        let low = (open.min(close) * (1.0 - rng.gen::<f64>() * vol * 0.5)).max(0.01);
        let volume = rng.gen_range(1_000..100_000);
        self.last_close.insert(request.symbol.clone(), close);

        Some(Bar {
            symbol: request.symbol.clone(),
            start,
            end,
            resolution: request.resolution,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

impl DataFeed for SyntheticFeed {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &mut self,
        requests: &[DataRequest],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Bar>, FeedError> {
        if end <= start {
            return Err(FeedError::Other(format!("empty interval ({start}, {end}]")));
        }
        Ok(requests.iter().filter_map(|r| self.bar(r, start, end)).collect())
    }
}

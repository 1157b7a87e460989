use super::{
    Cadence, CandidateSet, Selection, SelectionContext, SelectionError, UniverseSelector,
    UniverseSettings,
};
use crate::data::fundamentals::{CoarseFundamental, FineFundamental, FundamentalSource};
use crate::domain::Symbol;
use std::sync::Arc;

/// Coarse stage: picks symbols from the day's coarse rows.
pub type CoarseFilter =
    Box<dyn Fn(&[CoarseFundamental]) -> Result<Vec<Symbol>, String> + Send + Sync>;

/// Fine stage: narrows the coarse survivors using their fine rows.
pub type FineFilter =
    Box<dyn Fn(&[FineFundamental]) -> Result<Vec<Symbol>, String> + Send + Sync>;

/// Coarse/fine fundamental universe.
pub struct FundamentalSelector {
    source: Arc<dyn FundamentalSource>,
    coarse: CoarseFilter,
    fine: Option<FineFilter>,
    cadence: Cadence,
    settings: UniverseSettings,
}

impl FundamentalSelector {
    pub fn new(
        source: Arc<dyn FundamentalSource>,
        coarse: CoarseFilter,
        settings: UniverseSettings,
    ) -> Self {
        Self { source, coarse, fine: None, cadence: Cadence::Daily, settings }
    }

    pub fn with_fine(mut self, fine: FineFilter) -> Self {
        self.fine = Some(fine);
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Coarse filter keeping the `n` most liquid symbols with fundamental data.
    pub fn top_dollar_volume(n: usize) -> CoarseFilter {
        Box::new(move |rows| {
            let mut eligible: Vec<&CoarseFundamental> =
                rows.iter().filter(|r| r.has_fundamental_data && r.price > 0.0).collect();
            eligible.sort_by(|a, b| {
                b.dollar_volume
                    .total_cmp(&a.dollar_volume)
                    .then_with(|| a.symbol.cmp(&b.symbol))
            });
            Ok(eligible.into_iter().take(n).map(|r| r.symbol.clone()).collect())
        })
    }
}

impl UniverseSelector for FundamentalSelector {
    fn kind(&self) -> &'static str {
        "fundamental"
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }

    fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selection, SelectionError> {
        let date = ctx.time.date();
        let rows = self
            .source
            .coarse(date)
            .ok_or_else(|| SelectionError::DataUnavailable(format!("no coarse data for {date}")))?;

        let coarse = (self.coarse)(&rows).map_err(SelectionError::Rule)?;
        let selected = match &self.fine {
            None => coarse,
            Some(fine) => {
                let fine_rows = self.source.fine(date, &coarse);
                fine(&fine_rows).map_err(SelectionError::Rule)?
            }
        };
        Ok(Selection::Symbols(selected.into_iter().collect::<CandidateSet>()))
    }
}

use super::{
    Cadence, CandidateSet, Selection, SelectionContext, SelectionError, UniverseSelector,
    UniverseSettings,
};
use crate::domain::Symbol;
use crate::futures::{ContinuousSettings, ContinuousSpec, ContractChain};
use std::sync::Arc;

/// Continuous future: the canonical symbol plus whatever contract the
/// continuous contract mapper currently maps it to.
///
/// Evaluated every step so a remap is picked up on the step it happens.
pub struct ContinuousFutureSelector {
    canonical: Symbol,
    chain: Arc<dyn ContractChain>,
    continuous: ContinuousSettings,
    settings: UniverseSettings,
}

impl ContinuousFutureSelector {
    pub fn new(
        root: &str,
        chain: Arc<dyn ContractChain>,
        continuous: ContinuousSettings,
        settings: UniverseSettings,
    ) -> Self {
        Self { canonical: Symbol::canonical_future(root), chain, continuous, settings }
    }

    pub fn canonical(&self) -> &Symbol {
        &self.canonical
    }
}

impl UniverseSelector for ContinuousFutureSelector {
    fn kind(&self) -> &'static str {
        "continuous_future"
    }

    fn cadence(&self) -> Cadence {
        Cadence::EveryStep
    }

    fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selection, SelectionError> {
        let mut set = match ctx.mapped {
            Some(mapped) => CandidateSet::new().with_front(mapped.clone()),
            None => CandidateSet::new(),
        };
        set.insert(self.canonical.clone());
        Ok(Selection::Symbols(set))
    }

    fn continuous_spec(&self) -> Option<ContinuousSpec> {
        Some(ContinuousSpec {
            canonical: self.canonical.clone(),
            settings: self.continuous,
            chain: Arc::clone(&self.chain),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Resolution;
    use crate::futures::StaticContractChain;
    use chrono::NaiveDate;

    #[test]
    fn candidates_are_canonical_plus_mapped() {
        let sel = ContinuousFutureSelector::new(
            "ES",
            Arc::new(StaticContractChain::new()),
            ContinuousSettings::default(),
            UniverseSettings::new(Resolution::Minute),
        );
        let dec = Symbol::future("ES", NaiveDate::from_ymd_opt(2013, 12, 20).unwrap());
        let time = NaiveDate::from_ymd_opt(2013, 10, 7).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let Selection::Symbols(set) =
            sel.select(&SelectionContext { time, mapped: Some(&dec) }).unwrap()
        else {
            panic!("expected symbols");
        };
        assert_eq!(set.len(), 2);
        assert_eq!(set.front(), Some(&dec));
        assert!(set.contains(&Symbol::canonical_future("ES")));

        let Selection::Symbols(unmapped) =
            sel.select(&SelectionContext { time, mapped: None }).unwrap()
        else {
            panic!("expected symbols");
        };
        assert_eq!(unmapped.len(), 1);
        assert!(unmapped.front().is_none());
    }

    #[test]
    fn exposes_continuous_spec() {
        let settings = ContinuousSettings { depth_offset: 1, ..ContinuousSettings::default() };
        let sel = ContinuousFutureSelector::new(
            "NQ",
            Arc::new(StaticContractChain::new()),
            settings,
            UniverseSettings::default(),
        );
        let spec = sel.continuous_spec().unwrap();
        assert_eq!(spec.canonical, Symbol::canonical_future("NQ"));
        assert_eq!(spec.settings.depth_offset, 1);
        assert_eq!(sel.cadence(), Cadence::EveryStep);
    }
}

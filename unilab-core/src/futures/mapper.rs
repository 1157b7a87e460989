//! Continuous contract mapper.
//!
//! Tracks, per continuous-future source, which concrete contract the
//! canonical symbol currently maps to. The target is the contract at
//! `depth_offset` among the contracts still live under the configured
//! mapping mode. Remaps only move forward in expiry.
//!
//! The mapper only decides the mapping. The source then reports the mapped
//! contract as its front candidate, so a remap reaches the registry as an
//! ordinary remove/add through reconciliation and a contract that is also
//! subscribed explicitly stays tradable across it.

use super::chain::{ContractChain, FutureContract};
use crate::domain::{SelectorId, Symbol, Timestamp};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// When the mapped contract rolls to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Roll on the last trading day of the mapped contract.
    #[default]
    LastTradingDay,
    /// Roll on the first day of the mapped contract's expiry month.
    FirstDayMonth,
    /// Roll once the next contract's open interest exceeds the front's.
    OpenInterest,
    /// Roll once the next contract's volume exceeds the front's.
    Volume,
}

impl MappingMode {
    /// Whether a contract expiring on `expiry` is still a mapping candidate on `today`.
    fn is_live(self, expiry: NaiveDate, today: NaiveDate) -> bool {
        match self {
            MappingMode::FirstDayMonth => {
                (expiry.year(), expiry.month()) > (today.year(), today.month())
            }
            MappingMode::LastTradingDay | MappingMode::OpenInterest | MappingMode::Volume => {
                expiry > today
            }
        }
    }

    /// Index of the contract acting as "front" among sorted live contracts.
    fn front_index(self, live: &[FutureContract]) -> usize {
        match (self, live) {
            (MappingMode::OpenInterest, [front, next, ..]) if next.open_interest > front.open_interest => 1,
            (MappingMode::Volume, [front, next, ..]) if next.volume > front.volume => 1,
            _ => 0,
        }
    }
}

/// Price continuity adjustment applied by the pricing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    Raw,
    #[default]
    BackwardsRatio,
    BackwardsPanamaCanal,
    ForwardPanamaCanal,
}

/// Mapping configuration of one continuous-future source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContinuousSettings {
    /// 0 maps to the front contract, 1 to the next, and so on.
    #[serde(default)]
    pub depth_offset: usize,
    #[serde(default)]
    pub mapping_mode: MappingMode,
    #[serde(default)]
    pub normalization: NormalizationMode,
}

/// What a continuous source needs the mapper to track.
#[derive(Clone)]
pub struct ContinuousSpec {
    pub canonical: Symbol,
    pub settings: ContinuousSettings,
    pub chain: Arc<dyn ContractChain>,
}

impl fmt::Debug for ContinuousSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousSpec")
            .field("canonical", &self.canonical)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Current mapping state of one continuous source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousMapping {
    pub selector: SelectorId,
    pub canonical: Symbol,
    pub mapped: Option<Symbol>,
    pub last_mapped_at: Option<Timestamp>,
    pub settings: ContinuousSettings,
}

/// The mapped contract of a continuous source changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingChangeEvent {
    pub selector: SelectorId,
    pub canonical: Symbol,
    /// `None` for the initial mapping.
    pub old: Option<Symbol>,
    pub new: Symbol,
    pub time: Timestamp,
}

/// A remap attempt failed after the source was first mapped; the previous
/// contract stayed in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFailure {
    pub selector: SelectorId,
    pub time: Timestamp,
    pub message: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("cannot determine a unique contract for {canonical}: {reason}")]
    AmbiguousFrontContract { canonical: Symbol, reason: String },

    #[error("no continuous mapping registered for selector '{0}'")]
    UnknownSelector(SelectorId),
}

struct Tracked {
    mapping: ContinuousMapping,
    chain: Arc<dyn ContractChain>,
}

/// Mapping state for every continuous source, keyed by selector.
#[derive(Default)]
pub struct ContinuousContractMapper {
    tracked: BTreeMap<SelectorId, Tracked>,
}

impl ContinuousContractMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a continuous source. Re-registering resets its mapping.
    pub fn register(&mut self, selector: &SelectorId, spec: ContinuousSpec) {
        let mapping = ContinuousMapping {
            selector: selector.clone(),
            canonical: spec.canonical,
            mapped: None,
            last_mapped_at: None,
            settings: spec.settings,
        };
        self.tracked.insert(selector.clone(), Tracked { mapping, chain: spec.chain });
    }

    pub fn unregister(&mut self, selector: &SelectorId) -> Option<ContinuousMapping> {
        self.tracked.remove(selector).map(|t| t.mapping)
    }

    pub fn is_tracked(&self, selector: &SelectorId) -> bool {
        self.tracked.contains_key(selector)
    }

    pub fn selectors(&self) -> Vec<SelectorId> {
        self.tracked.keys().cloned().collect()
    }

    /// Contract currently mapped for `selector`.
    pub fn mapped(&self, selector: &SelectorId) -> Option<&Symbol> {
        self.tracked.get(selector)?.mapping.mapped.as_ref()
    }

    pub fn mapping(&self, selector: &SelectorId) -> Option<&ContinuousMapping> {
        self.tracked.get(selector).map(|t| &t.mapping)
    }

    /// Re-evaluate the mapping of `selector` at `time`.
    ///
    /// Returns the change event on a remap. On error the previous mapping is
    /// kept untouched.
    pub fn update(
        &mut self,
        selector: &SelectorId,
        time: Timestamp,
    ) -> Result<Option<MappingChangeEvent>, MappingError> {
        let tracked = self
            .tracked
            .get_mut(selector)
            .ok_or_else(|| MappingError::UnknownSelector(selector.clone()))?;
        let mapping = &mut tracked.mapping;
        let target = resolve_target(tracked.chain.as_ref(), mapping, time.date())?;

        if mapping.mapped.as_ref() == Some(&target) {
            return Ok(None);
        }
        // Never roll back to an earlier expiry.
        if let (Some(current), Some(candidate)) =
            (mapping.mapped.as_ref().and_then(|m| m.expiry), target.expiry)
        {
            if candidate < current {
                debug!(selector = %selector, target = %target, "ignoring backwards remap");
                return Ok(None);
            }
        }

        let old = mapping.mapped.replace(target.clone());
        mapping.last_mapped_at = Some(time);
        info!(
            selector = %selector,
            canonical = %mapping.canonical,
            old = ?old.as_ref().map(ToString::to_string),
            new = %target,
            "continuous contract mapped"
        );
        Ok(Some(MappingChangeEvent {
            selector: selector.clone(),
            canonical: mapping.canonical.clone(),
            old,
            new: target,
            time,
        }))
    }
}

fn resolve_target(
    chain: &dyn ContractChain,
    mapping: &ContinuousMapping,
    today: NaiveDate,
) -> Result<Symbol, MappingError> {
    let mode = mapping.settings.mapping_mode;
    let mut live: Vec<FutureContract> = chain
        .contracts(&mapping.canonical, today)
        .into_iter()
        .filter(|c| mode.is_live(c.expiry, today))
        .collect();
    live.sort_by_key(|c| c.expiry);

    if live.is_empty() {
        return Err(MappingError::AmbiguousFrontContract {
            canonical: mapping.canonical.clone(),
            reason: format!("no live contracts on {today}"),
        });
    }
    if live.windows(2).any(|w| w[0].expiry == w[1].expiry) {
        return Err(MappingError::AmbiguousFrontContract {
            canonical: mapping.canonical.clone(),
            reason: "several contracts share an expiry".into(),
        });
    }

    let index = mode.front_index(&live) + mapping.settings.depth_offset;
    live.get(index).map(|c| c.symbol.clone()).ok_or_else(|| {
        MappingError::AmbiguousFrontContract {
            canonical: mapping.canonical.clone(),
            reason: format!(
                "{} live contracts, depth offset {} needs more",
                live.len(),
                mapping.settings.depth_offset
            ),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::futures::chain::StaticContractChain;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> Timestamp {
        date(y, m, d).and_hms_opt(0, 0, 0).unwrap()
    }

    fn chain() -> Arc<dyn ContractChain> {
        Arc::new(
            StaticContractChain::new()
                .with_contract(FutureContract::new("ES", date(2013, 12, 20)).with_activity(100, 500))
                .with_contract(FutureContract::new("ES", date(2014, 3, 21)).with_activity(50, 300))
                .with_contract(FutureContract::new("ES", date(2014, 6, 20))),
        )
    }

    fn mapper(settings: ContinuousSettings) -> (ContinuousContractMapper, SelectorId) {
        let id = SelectorId::new("es");
        let mut m = ContinuousContractMapper::new();
        m.register(
            &id,
            ContinuousSpec { canonical: Symbol::canonical_future("ES"), settings, chain: chain() },
        );
        (m, id)
    }

    #[test]
    fn initial_mapping_is_front_month() {
        let (mut m, id) = mapper(ContinuousSettings::default());
        let event = m.update(&id, at(2013, 10, 7)).unwrap().unwrap();
        assert_eq!(event.old, None);
        assert_eq!(event.new, Symbol::future("ES", date(2013, 12, 20)));
        assert_eq!(m.mapped(&id), Some(&event.new));

        // Unchanged on the next day.
        assert!(m.update(&id, at(2013, 10, 8)).unwrap().is_none());
    }

    #[test]
    fn rolls_on_last_trading_day() {
        let (mut m, id) = mapper(ContinuousSettings::default());
        m.update(&id, at(2013, 12, 19)).unwrap();
        let event = m.update(&id, at(2013, 12, 20)).unwrap().unwrap();
        assert_eq!(event.old, Some(Symbol::future("ES", date(2013, 12, 20))));
        assert_eq!(event.new, Symbol::future("ES", date(2014, 3, 21)));
    }

    #[test]
    fn first_day_month_rolls_early() {
        let settings = ContinuousSettings {
            mapping_mode: MappingMode::FirstDayMonth,
            ..ContinuousSettings::default()
        };
        let (mut m, id) = mapper(settings);
        m.update(&id, at(2013, 11, 30)).unwrap();
        assert_eq!(m.mapped(&id), Some(&Symbol::future("ES", date(2013, 12, 20))));
        m.update(&id, at(2013, 12, 1)).unwrap();
        assert_eq!(m.mapped(&id), Some(&Symbol::future("ES", date(2014, 3, 21))));
    }

    #[test]
    fn depth_offset_selects_back_month() {
        let settings = ContinuousSettings { depth_offset: 1, ..ContinuousSettings::default() };
        let (mut m, id) = mapper(settings);
        m.update(&id, at(2013, 10, 7)).unwrap();
        assert_eq!(m.mapped(&id), Some(&Symbol::future("ES", date(2014, 3, 21))));
        // Stable while the front month lives.
        assert!(m.update(&id, at(2013, 11, 7)).unwrap().is_none());
        m.update(&id, at(2013, 12, 20)).unwrap();
        assert_eq!(m.mapped(&id), Some(&Symbol::future("ES", date(2014, 6, 20))));
    }

    #[test]
    fn open_interest_mode_follows_activity() {
        let settings = ContinuousSettings {
            mapping_mode: MappingMode::OpenInterest,
            ..ContinuousSettings::default()
        };
        let id = SelectorId::new("es");
        let dec = Symbol::future("ES", date(2013, 12, 20));
        let mar = Symbol::future("ES", date(2014, 3, 21));
        let chain = StaticContractChain::new()
            .with_contract(FutureContract::new("ES", date(2013, 12, 20)).with_activity(0, 500))
            .with_contract(FutureContract::new("ES", date(2014, 3, 21)).with_activity(0, 100))
            .with_activity(&mar, date(2013, 12, 10), 0, 800);
        let mut m = ContinuousContractMapper::new();
        m.register(
            &id,
            ContinuousSpec { canonical: Symbol::canonical_future("ES"), settings, chain: Arc::new(chain) },
        );

        m.update(&id, at(2013, 12, 9)).unwrap();
        assert_eq!(m.mapped(&id), Some(&dec));
        m.update(&id, at(2013, 12, 10)).unwrap();
        assert_eq!(m.mapped(&id), Some(&mar));
    }

    #[test]
    fn empty_chain_is_ambiguous_and_keeps_mapping() {
        let (mut m, id) = mapper(ContinuousSettings::default());
        m.update(&id, at(2014, 6, 1)).unwrap();
        let before = m.mapped(&id).cloned();
        let err = m.update(&id, at(2014, 7, 1)).unwrap_err();
        assert!(matches!(err, MappingError::AmbiguousFrontContract { .. }));
        assert_eq!(m.mapped(&id).cloned(), before);
    }

    #[test]
    fn depth_beyond_chain_is_ambiguous() {
        let settings = ContinuousSettings { depth_offset: 5, ..ContinuousSettings::default() };
        let (mut m, id) = mapper(settings);
        assert!(m.update(&id, at(2013, 10, 7)).is_err());
        assert_eq!(m.mapped(&id), None);
    }

    #[test]
    fn unknown_selector() {
        let mut m = ContinuousContractMapper::new();
        let err = m.update(&SelectorId::new("nope"), at(2013, 10, 7)).unwrap_err();
        assert_eq!(err, MappingError::UnknownSelector(SelectorId::new("nope")));
    }

    #[test]
    fn unregister_clears_mapped_accessor() {
        let (mut m, id) = mapper(ContinuousSettings::default());
        m.update(&id, at(2013, 10, 7)).unwrap();
        assert!(m.unregister(&id).is_some());
        assert_eq!(m.mapped(&id), None);
        assert!(!m.is_tracked(&id));
    }
}

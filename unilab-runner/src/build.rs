//! Turns scenario configuration into live engine components.
//!
//! Selectors are not `Clone` (they own boxed rule closures), so the scripted
//! strategy keeps the shared collaborators and builds each selector at the
//! moment it is registered.

use std::collections::BTreeMap;
use std::sync::Arc;

use unilab_core::data::{CoarseFundamental, FineFundamental, FundamentalSource, StaticFundamentals};
use unilab_core::domain::Symbol;
use unilab_core::futures::{ContinuousSettings, ContractChain, FutureContract, StaticContractChain};
use unilab_core::selection::{
    ContinuousFutureSelector, FineFilter, FundamentalSelector, FutureChainSelector,
    UniverseSelector, UniverseSettings, UserDefinedSelector,
};

use crate::config::{ConfigError, ScenarioConfig, ScheduleEntry, SelectorConfig, SourceConfig};

/// Shared in-memory collaborators of one scenario.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ContractChain>,
    pub fundamentals: Arc<dyn FundamentalSource>,
}

impl Collaborators {
    pub fn from_config(config: &ScenarioConfig) -> Self {
        let mut chain = StaticContractChain::new();
        for c in &config.contracts {
            let contract =
                FutureContract::new(&c.root, c.expiry).with_activity(c.volume, c.open_interest);
            let symbol = contract.symbol.clone();
            chain = chain.with_contract(contract);
            for a in &c.activity {
                chain = chain.with_activity(&symbol, a.from, a.volume, a.open_interest);
            }
        }

        let mut by_date: BTreeMap<_, Vec<CoarseFundamental>> = BTreeMap::new();
        for row in &config.coarse {
            by_date.entry(row.date).or_default().push(CoarseFundamental {
                symbol: Symbol::equity(&row.ticker),
                price: row.price,
                volume: row.volume,
                dollar_volume: row.price * row.volume as f64,
                has_fundamental_data: row.has_fundamental_data,
            });
        }
        let mut fundamentals = StaticFundamentals::new();
        for (date, rows) in by_date {
            fundamentals = fundamentals.with_coarse(date, rows);
        }
        for row in &config.fine {
            fundamentals = fundamentals.with_fine(FineFundamental {
                symbol: Symbol::equity(&row.ticker),
                market_cap: row.market_cap,
                sector: row.sector.clone(),
                pe_ratio: row.pe_ratio,
            });
        }

        Self { chain: Arc::new(chain), fundamentals: Arc::new(fundamentals) }
    }

    /// Build the selector described by `config`.
    pub fn build_selector(
        &self,
        config: &SelectorConfig,
    ) -> Result<Box<dyn UniverseSelector>, ConfigError> {
        let mut settings = UniverseSettings::new(config.resolution)
            .with_min_time_in_universe(config.min_time_in_universe()?);
        if let Some(policy) = config.failure_policy {
            settings = settings.with_failure_policy(policy);
        }

        let selector: Box<dyn UniverseSelector> = match &config.source {
            SourceConfig::Scheduled { cadence, schedule, fail_on } => {
                let mut schedule = schedule.clone();
                schedule.sort_by_key(|e| e.from);
                let fail_on = fail_on.clone();
                Box::new(UserDefinedSelector::new(cadence.to_cadence()?, settings, move |time| {
                    let today = time.date();
                    if fail_on.contains(&today) {
                        return Err(format!("scheduled failure on {today}"));
                    }
                    Ok(scheduled_tickers(&schedule, today))
                }))
            }
            SourceConfig::Fundamental { cadence, top, sector, min_market_cap } => {
                let mut selector = FundamentalSelector::new(
                    Arc::clone(&self.fundamentals),
                    FundamentalSelector::top_dollar_volume(*top),
                    settings,
                )
                .with_cadence(cadence.to_cadence()?);
                if sector.is_some() || min_market_cap.is_some() {
                    selector = selector.with_fine(fine_filter(sector.clone(), *min_market_cap));
                }
                Box::new(selector)
            }
            SourceConfig::FutureChain { root, min_days, max_days, front_only } => Box::new(
                FutureChainSelector::new(
                    Symbol::canonical_future(root.as_str()),
                    Arc::clone(&self.chain),
                    settings,
                )
                .with_expiry_window(*min_days, *max_days)
                .front_month_only(*front_only),
            ),
            SourceConfig::ContinuousFuture { root, depth_offset, mapping_mode, normalization } => {
                let continuous = ContinuousSettings {
                    depth_offset: *depth_offset,
                    mapping_mode: *mapping_mode,
                    normalization: *normalization,
                };
                Box::new(ContinuousFutureSelector::new(
                    root,
                    Arc::clone(&self.chain),
                    continuous,
                    settings,
                ))
            }
        };
        Ok(selector)
    }
}

/// Tickers of the latest schedule entry starting on or before `today`.
fn scheduled_tickers(schedule: &[ScheduleEntry], today: chrono::NaiveDate) -> Vec<Symbol> {
    schedule
        .iter()
        .rev()
        .find(|e| e.from <= today)
        .map(|e| e.tickers.iter().map(Symbol::equity).collect())
        .unwrap_or_default()
}

fn fine_filter(sector: Option<String>, min_market_cap: Option<f64>) -> FineFilter {
    Box::new(move |rows| {
        Ok(rows
            .iter()
            .filter(|r| sector.as_deref().map_or(true, |s| r.sector == s))
            .filter(|r| min_market_cap.map_or(true, |cap| r.market_cap >= cap))
            .map(|r| r.symbol.clone())
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CadenceConfig, CoarseRowConfig, ContractConfig, FineRowConfig};
    use chrono::NaiveDate;
    use unilab_core::domain::Resolution;
    use unilab_core::selection::{Selection, SelectionContext};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn scenario() -> ScenarioConfig {
        ScenarioConfig::from_toml(
            r#"
name = "build"
start = "2024-01-02T00:00:00"
end = "2024-01-06T00:00:00"
resolution = "daily"
"#,
        )
        .unwrap()
    }

    fn selector(id: &str, source: SourceConfig) -> SelectorConfig {
        SelectorConfig {
            id: id.into(),
            resolution: Resolution::Daily,
            min_time_in_universe_hours: 0,
            failure_policy: None,
            source,
        }
    }

    fn symbols(selection: Selection) -> Vec<Symbol> {
        match selection {
            Selection::Symbols(set) => set.symbols().iter().cloned().collect(),
            Selection::Unchanged => panic!("expected symbols"),
        }
    }

    #[test]
    fn scheduled_selector_follows_schedule_and_fails_on_demand() {
        let collaborators = Collaborators::from_config(&scenario());
        let built = collaborators.build_selector(&selector(
            "s",
            SourceConfig::Scheduled {
                cadence: CadenceConfig::Daily,
                schedule: vec![
                    ScheduleEntry { from: day(4), tickers: vec!["QQQ".into()] },
                    ScheduleEntry { from: day(1), tickers: vec!["SPY".into(), "IWM".into()] },
                ],
                fail_on: vec![day(5)],
            },
        ))
        .unwrap();
        let ctx = |d: u32| SelectionContext { time: day(d).and_hms_opt(0, 0, 0).unwrap(), mapped: None };

        assert_eq!(
            symbols(built.select(&ctx(2)).unwrap()),
            vec![Symbol::equity("IWM"), Symbol::equity("SPY")]
        );
        assert_eq!(symbols(built.select(&ctx(4)).unwrap()), vec![Symbol::equity("QQQ")]);
        assert!(built.select(&ctx(5)).is_err());
    }

    #[test]
    fn fundamental_selector_applies_sector_filter() {
        let mut config = scenario();
        config.coarse = vec![
            CoarseRowConfig { date: day(1), ticker: "AAPL".into(), price: 100.0, volume: 1000, has_fundamental_data: true },
            CoarseRowConfig { date: day(1), ticker: "XOM".into(), price: 100.0, volume: 900, has_fundamental_data: true },
            CoarseRowConfig { date: day(1), ticker: "TINY".into(), price: 1.0, volume: 10, has_fundamental_data: true },
        ];
        config.fine = vec![
            FineRowConfig { ticker: "AAPL".into(), market_cap: 3e12, sector: "Technology".into(), pe_ratio: None },
            FineRowConfig { ticker: "XOM".into(), market_cap: 4e11, sector: "Energy".into(), pe_ratio: None },
        ];
        let collaborators = Collaborators::from_config(&config);
        let built = collaborators.build_selector(&selector(
            "f",
            SourceConfig::Fundamental {
                cadence: CadenceConfig::Daily,
                top: 2,
                sector: Some("Energy".into()),
                min_market_cap: None,
            },
        ))
        .unwrap();
        let ctx = SelectionContext { time: day(3).and_hms_opt(0, 0, 0).unwrap(), mapped: None };

        assert_eq!(symbols(built.select(&ctx).unwrap()), vec![Symbol::equity("XOM")]);
    }

    #[test]
    fn contract_catalogue_feeds_chain() {
        let mut config = scenario();
        config.contracts = vec![ContractConfig {
            root: "ES".into(),
            expiry: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            volume: 10,
            open_interest: 20,
            activity: vec![],
        }];
        let collaborators = Collaborators::from_config(&config);
        let listed = collaborators.chain.contracts(&Symbol::canonical_future("ES"), day(2));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].open_interest, 20);
    }

    #[test]
    fn oversized_durations_are_config_errors() {
        let collaborators = Collaborators::from_config(&scenario());
        let mut held = selector("h", SourceConfig::Scheduled {
            cadence: CadenceConfig::Daily,
            schedule: vec![],
            fail_on: vec![],
        });
        held.min_time_in_universe_hours = i64::MAX;
        assert!(matches!(collaborators.build_selector(&held), Err(ConfigError::Invalid(_))));

        let interval = selector("i", SourceConfig::Scheduled {
            cadence: CadenceConfig::IntervalMinutes(i64::MAX),
            schedule: vec![],
            fail_on: vec![],
        });
        assert!(matches!(collaborators.build_selector(&interval), Err(ConfigError::Invalid(_))));
    }
}

use super::{
    Cadence, CandidateSet, Selection, SelectionContext, SelectionError, UniverseSelector,
    UniverseSettings,
};
use crate::domain::{Symbol, Timestamp};

type SelectFn = dyn Fn(Timestamp) -> Result<Vec<Symbol>, String> + Send + Sync;

/// Universe driven by an arbitrary function of time.
pub struct UserDefinedSelector {
    cadence: Cadence,
    settings: UniverseSettings,
    select_fn: Box<SelectFn>,
}

impl UserDefinedSelector {
    pub fn new<F>(cadence: Cadence, settings: UniverseSettings, select_fn: F) -> Self
    where
        F: Fn(Timestamp) -> Result<Vec<Symbol>, String> + Send + Sync + 'static,
    {
        Self { cadence, settings, select_fn: Box::new(select_fn) }
    }

    /// A universe that always selects the same symbols.
    pub fn fixed(symbols: Vec<Symbol>, settings: UniverseSettings) -> Self {
        Self::new(Cadence::Daily, settings, move |_| Ok(symbols.clone()))
    }
}

impl UniverseSelector for UserDefinedSelector {
    fn kind(&self) -> &'static str {
        "user_defined"
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }

    fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selection, SelectionError> {
        let symbols = (self.select_fn)(ctx.time).map_err(SelectionError::Rule)?;
        Ok(Selection::Symbols(symbols.into_iter().collect::<CandidateSet>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Resolution;
    use chrono::{Datelike, NaiveDate};

    fn ctx(day: u32) -> SelectionContext<'static> {
        SelectionContext {
            time: NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            mapped: None,
        }
    }

    #[test]
    fn closure_sees_time() {
        let sel = UserDefinedSelector::new(
            Cadence::Daily,
            UniverseSettings::new(Resolution::Daily),
            |t| {
                if t.day() == 1 {
                    Ok(vec![Symbol::equity("SPY")])
                } else {
                    Ok(vec![])
                }
            },
        );
        assert_eq!(
            sel.select(&ctx(1)).unwrap(),
            Selection::Symbols([Symbol::equity("SPY")].into_iter().collect())
        );
        assert_eq!(sel.select(&ctx(2)).unwrap(), Selection::Symbols(CandidateSet::new()));
    }

    #[test]
    fn closure_error_becomes_rule_failure() {
        let sel = UserDefinedSelector::new(Cadence::Daily, UniverseSettings::default(), |_| {
            Err("boom".to_string())
        });
        assert_eq!(sel.select(&ctx(1)), Err(SelectionError::Rule("boom".into())));
    }

    #[test]
    fn fixed_selector() {
        let sel = UserDefinedSelector::fixed(
            vec![Symbol::equity("AAPL"), Symbol::equity("MSFT")],
            UniverseSettings::default(),
        );
        match sel.select(&ctx(5)).unwrap() {
            Selection::Symbols(set) => assert_eq!(set.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sel.kind(), "user_defined");
    }
}

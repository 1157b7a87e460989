//! Property tests for lifecycle invariants.
//!
//! Uses proptest to verify:
//! 1. Idempotent reconciliation: a repeated pass yields an empty batch
//! 2. Tradable set: equals the union of every source's candidates
//! 3. Batch consistency: previous + added - removed == current, sets disjoint
//! 4. Reference counting: one reference per source holding the symbol
//! 5. Cadence: a daily source fires once per distinct calendar day
//! 6. Ordering: data is only accepted right after its own change batch

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use unilab_core::domain::{Resolution, SelectorId, Symbol, Timestamp};
use unilab_core::engine::ChangeNotifier;
use unilab_core::reconcile::reconcile;
use unilab_core::registry::SubscriptionRegistry;
use unilab_core::selection::{Cadence, CandidateSet, SourceCandidates};

const TICKERS: [&str; 6] = ["SPY", "QQQ", "AAPL", "MSFT", "IWM", "TLT"];

fn base() -> Timestamp {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// Candidate sets for three sources, each a subset of `TICKERS`.
fn arb_sources() -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    prop::collection::vec(prop::collection::btree_set(0..TICKERS.len(), 0..=TICKERS.len()), 3)
}

/// Several consecutive steps of candidate sets.
fn arb_history() -> impl Strategy<Value = Vec<Vec<BTreeSet<usize>>>> {
    prop::collection::vec(arb_sources(), 1..12)
}

fn to_sources(sets: &[BTreeSet<usize>]) -> Vec<SourceCandidates> {
    sets.iter()
        .enumerate()
        .map(|(i, set)| SourceCandidates {
            selector: SelectorId::new(format!("u{i}")),
            candidates: set.iter().map(|&t| Symbol::equity(TICKERS[t])).collect::<CandidateSet>(),
            resolution: Resolution::Daily,
            overrides: BTreeMap::new(),
            min_time_in_universe: Duration::zero(),
            fired: true,
        })
        .collect()
}

fn union(sets: &[BTreeSet<usize>]) -> BTreeSet<Symbol> {
    sets.iter().flatten().map(|&t| Symbol::equity(TICKERS[t])).collect()
}

// ── 1-4. Reconciliation ──────────────────────────────────────────────

proptest! {
    #[test]
    fn second_pass_is_empty(history in arb_history()) {
        let mut registry = SubscriptionRegistry::new();
        for (step, sets) in history.iter().enumerate() {
            let time = base() + Duration::days(step as i64);
            let sources = to_sources(sets);
            reconcile(&mut registry, &sources, time).unwrap();
            let again = reconcile(&mut registry, &sources, time).unwrap();
            prop_assert!(again.changes.is_empty());
            prop_assert!(again.subscribed.is_empty());
            prop_assert!(again.unsubscribed.is_empty());
        }
    }

    #[test]
    fn tradable_set_is_union_of_candidates(history in arb_history()) {
        let mut registry = SubscriptionRegistry::new();
        for (step, sets) in history.iter().enumerate() {
            let time = base() + Duration::days(step as i64);
            reconcile(&mut registry, &to_sources(sets), time).unwrap();
            prop_assert_eq!(registry.tradable_set(), union(sets));
        }
    }

    #[test]
    fn batches_replay_to_tradable_set(history in arb_history()) {
        let mut registry = SubscriptionRegistry::new();
        let mut replayed: BTreeSet<Symbol> = BTreeSet::new();
        for (step, sets) in history.iter().enumerate() {
            let time = base() + Duration::days(step as i64);
            let r = reconcile(&mut registry, &to_sources(sets), time).unwrap();
            prop_assert!(r.changes.added().is_disjoint(r.changes.removed()));
            for s in r.changes.removed() {
                prop_assert!(replayed.remove(s));
            }
            for s in r.changes.added() {
                prop_assert!(replayed.insert(s.clone()));
            }
            prop_assert_eq!(&replayed, &registry.tradable_set());
        }
    }

    #[test]
    fn reference_count_matches_holders(sets in arb_sources()) {
        let mut registry = SubscriptionRegistry::new();
        reconcile(&mut registry, &to_sources(&sets), base()).unwrap();
        for (t, ticker) in TICKERS.iter().enumerate() {
            let holders = sets.iter().filter(|s| s.contains(&t)).count();
            let symbol = Symbol::equity(*ticker);
            prop_assert_eq!(registry.reference_count(&symbol), holders);
            prop_assert_eq!(registry.is_tradable(&symbol), holders > 0);
        }
        // One shared feed per tradable symbol, however many sources hold it.
        prop_assert_eq!(registry.data_feeds().len(), union(&sets).len());
    }
}

// ── 5. Cadence ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn daily_cadence_fires_once_per_day(offsets in prop::collection::btree_set(0i64..(24 * 20), 1..60)) {
        let cadence = Cadence::Daily;
        let mut last = None;
        let mut fired_before = false;
        let mut fired_days = Vec::new();
        for h in &offsets {
            let time = base() + Duration::hours(*h);
            if cadence.is_due(last, fired_before, time) {
                last = cadence.period_key(time);
                fired_before = true;
                fired_days.push(time.date());
            }
        }
        let distinct: BTreeSet<_> = offsets.iter().map(|h| (base() + Duration::hours(*h)).date()).collect();
        prop_assert_eq!(fired_days.len(), distinct.len());
        prop_assert_eq!(fired_days.into_iter().collect::<BTreeSet<_>>(), distinct);
    }
}

// ── 6. Ordering ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn notifier_accepts_only_change_then_data(ops in prop::collection::vec((any::<bool>(), 0i64..6), 1..40)) {
        // Each op is (is_data, step). The notifier must agree with a simple
        // model of the two-phase contract.
        let mut notifier = ChangeNotifier::new();
        let mut last_changes: Option<i64> = None;
        let mut last_data: Option<i64> = None;
        for (is_data, step) in ops {
            let time = base() + Duration::hours(step);
            if is_data {
                let ok = last_changes == Some(step) && last_data != Some(step);
                prop_assert_eq!(notifier.begin_data(time).is_ok(), ok);
                if ok {
                    last_data = Some(step);
                }
            } else {
                let ok = last_changes.map_or(true, |c| step > c && last_data == Some(c));
                prop_assert_eq!(notifier.begin_changes(time).is_ok(), ok);
                if ok {
                    last_changes = Some(step);
                }
            }
        }
    }
}

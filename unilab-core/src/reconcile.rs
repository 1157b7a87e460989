//! Reconciliation: merges every source's candidates into one change batch.
//!
//! For each source, subscriptions it no longer wants are dropped and new
//! ones are added, then tradability is recomputed from the registry as a
//! whole. A symbol one source lets go of while another still selects it keeps
//! a non-zero reference count and never appears in the batch.

use crate::domain::{SecurityChangeBatch, SelectorId, Symbol, Timestamp};
use crate::registry::{Subscription, SubscriptionError, SubscriptionRegistry};
use crate::selection::SourceCandidates;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Everything one reconciliation pass changed.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub changes: SecurityChangeBatch,
    /// Subscriptions created this pass.
    pub subscribed: Vec<Subscription>,
    /// Subscriptions dropped this pass.
    pub unsubscribed: Vec<Subscription>,
    /// Deselected symbols a source keeps because of its minimum time in universe.
    pub held: Vec<(SelectorId, Symbol)>,
}

/// Apply `sources` to `registry` at `time`.
///
/// Selectors present in the registry but absent from `sources` are treated
/// as removed and lose all their subscriptions. Running the same pass twice
/// yields an empty batch the second time.
pub fn reconcile(
    registry: &mut SubscriptionRegistry,
    sources: &[SourceCandidates],
    time: Timestamp,
) -> Result<Reconciliation, SubscriptionError> {
    reconcile_with_retired(registry, &[], sources, time)
}

/// Like [`reconcile`], but every selector in `retired` first loses all its
/// subscriptions even when a source with the same id is present. A universe
/// removed and re-added within one step therefore starts over: fresh
/// `added_at` times, no minimum-time hold carried across.
pub fn reconcile_with_retired(
    registry: &mut SubscriptionRegistry,
    retired: &[SelectorId],
    sources: &[SourceCandidates],
    time: Timestamp,
) -> Result<Reconciliation, SubscriptionError> {
    let previous = registry.tradable_set();
    let by_id: BTreeMap<&SelectorId, &SourceCandidates> =
        sources.iter().map(|s| (&s.selector, s)).collect();

    let mut subscribed = Vec::new();
    let mut unsubscribed = Vec::new();
    let mut held = Vec::new();

    for selector in registry.selectors() {
        if by_id.contains_key(&selector) && !retired.contains(&selector) {
            continue;
        }
        for symbol in registry.symbols_for(&selector) {
            unsubscribed.extend(registry.remove(&selector, &symbol));
        }
    }

    for source in sources {
        let id = &source.selector;
        let current = registry.symbols_for(id);
        let wanted = source.candidates.symbols();

        for symbol in current.difference(wanted) {
            let young = registry
                .added_at(id, symbol)
                .is_some_and(|added| time - added < source.min_time_in_universe);
            if young {
                held.push((id.clone(), symbol.clone()));
                continue;
            }
            unsubscribed.extend(registry.remove(id, symbol));
        }

        for symbol in wanted {
            let resolution = source.resolution_for(symbol);
            if current.contains(symbol) {
                if registry.resolution_for(id, symbol) != Some(resolution) {
                    registry.set_resolution(id, symbol, resolution);
                }
                continue;
            }
            registry.add(id, symbol, resolution, time)?;
            subscribed.push(Subscription {
                selector: id.clone(),
                symbol: symbol.clone(),
                resolution,
                added_at: time,
            });
        }
    }

    let current: BTreeSet<Symbol> = registry.tradable_set();
    let changes = SecurityChangeBatch::between(time, &previous, &current);
    if !subscribed.is_empty() || !unsubscribed.is_empty() {
        debug!(
            time = %time,
            subscribed = subscribed.len(),
            unsubscribed = unsubscribed.len(),
            added = changes.added().len(),
            removed = changes.removed().len(),
            "reconciled"
        );
    }

    Ok(Reconciliation { changes, subscribed, unsubscribed, held })
}

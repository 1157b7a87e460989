//! Change notifier: two-phase delivery of each step to strategy logic.
//!
//! Phase 1 hands over the step's change batch, phase 2 its data. The
//! notifier tracks which phase each timestamp has reached and refuses any
//! call that would break the order:
//! 1. change batches arrive in strictly increasing time, one per timestamp
//! 2. data for a timestamp only after that timestamp's change batch
//! 3. data at most once per timestamp

use super::context::{Strategy, StrategyContext, StrategyError};
use crate::data::Slice;
use crate::domain::{SecurityChangeBatch, Timestamp};
use thiserror::Error;
use tracing::{debug, info};

/// Delivery order was broken. Downstream state can no longer be trusted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("ordering violation at {time}: {detail}")]
pub struct OrderingViolation {
    pub time: Timestamp,
    pub detail: String,
}

impl OrderingViolation {
    fn new(time: Timestamp, detail: impl Into<String>) -> Self {
        Self { time, detail: detail.into() }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Ordering(#[from] OrderingViolation),

    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    last_changes: Option<Timestamp>,
    last_data: Option<Timestamp>,
    delivered: usize,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open phase 1 for `time`.
    pub fn begin_changes(&mut self, time: Timestamp) -> Result<(), OrderingViolation> {
        if let Some(last) = self.last_changes {
            if time <= last {
                return Err(OrderingViolation::new(
                    time,
                    format!("change batch after the batch for {last}"),
                ));
            }
        }
        if let (Some(last_changes), last_data) = (self.last_changes, self.last_data) {
            if last_data != Some(last_changes) {
                return Err(OrderingViolation::new(
                    time,
                    format!("step {last_changes} never received its data batch"),
                ));
            }
        }
        self.last_changes = Some(time);
        Ok(())
    }

    /// Open phase 2 for `time`.
    pub fn begin_data(&mut self, time: Timestamp) -> Result<(), OrderingViolation> {
        if self.last_changes != Some(time) {
            return Err(OrderingViolation::new(time, "data batch observed before its change batch"));
        }
        if self.last_data == Some(time) {
            return Err(OrderingViolation::new(time, "data batch delivered twice"));
        }
        self.last_data = Some(time);
        Ok(())
    }

    /// Phase 1: deliver `batch`. Empty batches advance the phase without a callback.
    pub fn deliver_changes(
        &mut self,
        batch: &SecurityChangeBatch,
        strategy: &mut dyn Strategy,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<(), DeliveryError> {
        self.begin_changes(batch.time())?;
        if batch.is_empty() {
            return Ok(());
        }
        info!(
            time = %batch.time(),
            added = batch.added().len(),
            removed = batch.removed().len(),
            "securities changed"
        );
        self.delivered += 1;
        strategy.on_securities_changed(batch, ctx)?;
        Ok(())
    }

    /// Phase 2: deliver the step's data.
    pub fn deliver_data(
        &mut self,
        slice: &Slice,
        strategy: &mut dyn Strategy,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<(), DeliveryError> {
        self.begin_data(slice.time)?;
        debug!(
            time = %slice.time,
            resolution = %slice.resolution,
            bars = slice.len(),
            warming_up = slice.warming_up,
            "data batch"
        );
        strategy.on_data(slice, ctx)?;
        Ok(())
    }

    /// Number of non-empty change batches handed to strategy logic.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn last_time(&self) -> Option<Timestamp> {
        self.last_changes
    }
}

use super::context::StrategyError;
use super::notifier::{DeliveryError, OrderingViolation};
use super::state::ConfigError;
use crate::data::FeedError;
use crate::domain::{SelectorId, Timestamp};
use crate::futures::MappingError;
use crate::registry::SubscriptionError;
use thiserror::Error;

/// Conditions that abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ordering(#[from] OrderingViolation),

    #[error("no contract could be mapped for selector '{selector}' at {time}: {source}")]
    Mapping { selector: SelectorId, time: Timestamp, source: MappingError },

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("data feed '{feed}' failed at {time}: {source}")]
    Feed { feed: String, time: Timestamp, source: FeedError },

    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("strategy failed at {time}: {source}")]
    Strategy { time: Timestamp, source: StrategyError },
}

impl EngineError {
    pub(crate) fn from_delivery(time: Timestamp, err: DeliveryError) -> Self {
        match err {
            DeliveryError::Ordering(v) => EngineError::Ordering(v),
            DeliveryError::Strategy(source) => EngineError::Strategy { time, source },
        }
    }

    /// Whether the run stopped because an engine invariant was broken.
    pub fn is_invariant_breach(&self) -> bool {
        matches!(self, EngineError::Ordering(_))
    }
}

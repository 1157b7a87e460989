use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the reserved source holding explicit single-instrument subscriptions.
pub const MANUAL_SELECTOR: &str = "manual";

/// Identity of a selection source (a universe or the manual subscription set).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SelectorId(pub String);

impl SelectorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The source that owns subscriptions added one instrument at a time.
    pub fn manual() -> Self {
        Self(MANUAL_SELECTOR.to_string())
    }

    pub fn is_manual(&self) -> bool {
        self.0 == MANUAL_SELECTOR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SelectorId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Order intent ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic ID generator for order intents.
#[derive(Debug, Default, Clone)]
pub struct IdGen {
    next_order: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(self.next_order)
    }
}

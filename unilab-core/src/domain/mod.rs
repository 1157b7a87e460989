//! Domain types for UniLab

pub mod bar;
pub mod changes;
pub mod ids;
pub mod resolution;
pub mod symbol;

pub use bar::Bar;
pub use changes::SecurityChangeBatch;
pub use ids::{IdGen, OrderId, SelectorId, MANUAL_SELECTOR};
pub use resolution::Resolution;
pub use symbol::{AssetClass, Symbol, DEFAULT_MARKET};

/// Simulation timestamp (exchange-local, no zone).
pub type Timestamp = chrono::NaiveDateTime;

//! Lifecycle engine: the step scheduler and the state it drives.
//!
//! The engine owns the subscription registry, selector runner, continuous
//! mapper, warmup controller and change notifier, and walks them through a
//! fixed phase order every step (see `loop_runner`). Strategy logic sees the
//! engine only through `StrategyContext`.

pub mod clock;
pub mod context;
pub mod error;
pub mod loop_runner;
pub mod notifier;
pub mod state;
pub mod warmup;

pub use clock::{SimulationClock, TimeStep};
pub use context::{OrderIntent, OrderRejection, PendingMutation, Strategy, StrategyContext, StrategyError};
pub use error::EngineError;
pub use loop_runner::Engine;
pub use notifier::{ChangeNotifier, DeliveryError, OrderingViolation};
pub use state::{ConfigError, DataBatchSummary, EngineConfig, EngineState, RunResult, TickReport};
pub use warmup::{WarmupController, WarmupLength, WarmupSpec, WarmupWindow};

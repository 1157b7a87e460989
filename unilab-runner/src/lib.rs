//! UniLab Runner: scenario orchestration on top of the lifecycle engine.
//!
//! This crate builds on `unilab-core` to provide:
//! - TOML scenario configuration with content-addressed run ids
//! - A scripted strategy that replays time-stamped universe and order actions
//! - A deterministic synthetic data feed
//! - Single and batch (parallel) scenario runs
//! - JSON, CSV, and Markdown export with schema versioning

pub mod build;
pub mod config;
pub mod export;
pub mod feed;
pub mod report;
pub mod runner;
pub mod strategy;

pub use build::Collaborators;
pub use config::{ConfigError, RunId, ScenarioConfig};
pub use export::{
    export_changes_csv, export_data_batches_csv, export_json, export_mappings_csv,
    export_orders_csv, import_json, load_artifacts, save_artifacts,
};
pub use feed::SyntheticFeed;
pub use report::{ReportSummary, RunReport, SCHEMA_VERSION};
pub use runner::{run_batch, run_scenario, RunError};
pub use strategy::{ScriptLog, ScriptedStrategy};

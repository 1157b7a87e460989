//! UniLab Core: universe selection, subscription lifecycle, and the step scheduler.
//!
//! This crate contains everything that decides which instruments exist at each
//! simulation step and in what order strategy logic hears about them:
//! - Domain types (symbols, resolutions, bars, change batches)
//! - Subscription registry with per-instrument reference counting
//! - Pluggable selection sources and the cadence-driven selector runner
//! - Reconciliation of overlapping sources into one change batch per step
//! - Continuous futures contract mapping
//! - Warmup controller and simulation clock
//! - Two-phase change/data notification enforced by a single scheduler
//!
//! No I/O happens here. Data arrives through the `DataFeed` trait.

pub mod data;
pub mod domain;
pub mod engine;
pub mod futures;
pub mod reconcile;
pub mod registry;
pub mod selection;

//! Run report: the persisted outcome of one scenario run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use unilab_core::domain::Resolution;
use unilab_core::engine::RunResult;

use crate::config::{RunId, ScenarioConfig};
use crate::strategy::ScriptLog;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Default schema version for deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub scenario: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub resolution: Resolution,
    pub seed: u64,
    pub result: RunResult,
    pub script: ScriptLog,
}

impl RunReport {
    pub fn new(config: &ScenarioConfig, result: RunResult, script: ScriptLog) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: config.run_id(),
            scenario: config.name.clone(),
            start: config.start,
            end: config.end,
            resolution: config.resolution,
            seed: config.seed,
            result,
            script,
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let r = &self.result;
        let accepted = r.order_intents.iter().filter(|o| o.is_accepted()).count();
        ReportSummary {
            ticks: r.ticks,
            change_batches: r.change_batches.len(),
            additions: r.change_batches.iter().map(|b| b.added().len()).sum(),
            removals: r.change_batches.iter().map(|b| b.removed().len()).sum(),
            remaps: r.mapping_events.len(),
            mapping_failures: r.mapping_failures.len(),
            selection_failures: r.selection_failures.len(),
            orders_accepted: accepted,
            orders_rejected: r.order_intents.len() - accepted,
            warmup_batches: r.warmup_batches(),
            bars: r.total_bars(),
            gated_bars: r.total_gated(),
            final_tradable: r.final_tradable.len(),
            final_subscriptions: r.final_subscriptions.len(),
            final_data_feeds: r.final_data_feeds,
        }
    }

    /// Human-readable Markdown report.
    pub fn to_markdown(&self) -> String {
        let s = self.summary();
        let mut md = String::with_capacity(2048);

        md.push_str(&format!("# Lifecycle Report: {}\n\n", self.scenario));

        md.push_str("## Metadata\n\n");
        md.push_str("| Field | Value |\n");
        md.push_str("| --- | --- |\n");
        md.push_str(&format!("| Run ID | {} |\n", self.run_id));
        md.push_str(&format!("| Period | {} to {} |\n", self.start, self.end));
        md.push_str(&format!("| Resolution | {} |\n", self.resolution));
        md.push_str(&format!("| Seed | {} |\n", self.seed));
        if let Some(t) = self.result.warmup_ended_at {
            md.push_str(&format!("| Warmup Ended | {t} ({} batches) |\n", s.warmup_batches));
        }
        md.push('\n');

        md.push_str("## Summary\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("| --- | --- |\n");
        md.push_str(&format!("| Steps | {} |\n", s.ticks));
        md.push_str(&format!(
            "| Change Batches | {} (+{} / -{}) |\n",
            s.change_batches, s.additions, s.removals
        ));
        md.push_str(&format!("| Remaps | {} ({} failed) |\n", s.remaps, s.mapping_failures));
        md.push_str(&format!("| Selection Failures | {} |\n", s.selection_failures));
        md.push_str(&format!(
            "| Orders | {} accepted, {} rejected |\n",
            s.orders_accepted, s.orders_rejected
        ));
        md.push_str(&format!("| Bars | {} ({} gated) |\n", s.bars, s.gated_bars));
        md.push_str(&format!(
            "| Final State | {} tradable, {} subscriptions, {} feeds |\n",
            s.final_tradable, s.final_subscriptions, s.final_data_feeds
        ));
        md.push('\n');

        if !self.result.change_batches.is_empty() {
            md.push_str("## Security Changes\n\n");
            md.push_str("| Time | Added | Removed |\n");
            md.push_str("| --- | --- | --- |\n");
            for batch in &self.result.change_batches {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    batch.time(),
                    join(batch.added().iter()),
                    join(batch.removed().iter())
                ));
            }
            md.push('\n');
        }

        if !self.result.mapping_events.is_empty() {
            md.push_str("## Contract Mapping\n\n");
            md.push_str("| Time | Canonical | From | To |\n");
            md.push_str("| --- | --- | --- | --- |\n");
            for e in &self.result.mapping_events {
                let old = e.old.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "-".into());
                md.push_str(&format!("| {} | {} | {} | {} |\n", e.time, e.canonical, old, e.new));
            }
            md.push('\n');
        }

        if !self.result.mapping_failures.is_empty() {
            md.push_str("## Mapping Failures\n\n");
            for f in &self.result.mapping_failures {
                md.push_str(&format!("- {} `{}`: {}\n", f.time, f.selector, f.message));
            }
            md.push('\n');
        }

        if !self.result.selection_failures.is_empty() {
            md.push_str("## Selection Failures\n\n");
            for f in &self.result.selection_failures {
                let note = if f.deselected { " (deselected)" } else { "" };
                md.push_str(&format!(
                    "- {} `{}` #{}: {}{}\n",
                    f.time, f.selector, f.consecutive_failures, f.message, note
                ));
            }
            md.push('\n');
        }

        md
    }
}

fn join<'a, T: std::fmt::Display + 'a>(items: impl Iterator<Item = &'a T>) -> String {
    let parts: Vec<String> = items.map(|i| i.to_string()).collect();
    if parts.is_empty() {
        "-".into()
    } else {
        parts.join(", ")
    }
}

/// Headline numbers of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub ticks: usize,
    pub change_batches: usize,
    pub additions: usize,
    pub removals: usize,
    pub remaps: usize,
    pub mapping_failures: usize,
    pub selection_failures: usize,
    pub orders_accepted: usize,
    pub orders_rejected: usize,
    pub warmup_batches: usize,
    pub bars: usize,
    pub gated_bars: usize,
    pub final_tradable: usize,
    pub final_subscriptions: usize,
    pub final_data_feeds: usize,
}

//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for run reports:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: change batches, data batches, mapping events and order intents
//! - **Markdown**: the human-readable report from `RunReport::to_markdown`
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use unilab_core::domain::SecurityChangeBatch;
use unilab_core::engine::{DataBatchSummary, OrderIntent};
use unilab_core::futures::MappingChangeEvent;

use crate::report::{RunReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RunReport` to pretty JSON.
pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a `RunReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One row per symbol change. Columns: time, change, symbol.
pub fn export_changes_csv(batches: &[SecurityChangeBatch]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "change", "symbol"])?;
    for batch in batches {
        let time = batch.time().to_string();
        for symbol in batch.removed() {
            wtr.write_record([time.as_str(), "removed", &symbol.to_string()])?;
        }
        for symbol in batch.added() {
            wtr.write_record([time.as_str(), "added", &symbol.to_string()])?;
        }
    }
    finish(wtr)
}

/// Columns: time, start, resolution, warming_up, bars, gated
pub fn export_data_batches_csv(batches: &[DataBatchSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "start", "resolution", "warming_up", "bars", "gated"])?;
    for b in batches {
        wtr.write_record([
            b.time.to_string(),
            b.start.to_string(),
            b.resolution.to_string(),
            b.warming_up.to_string(),
            b.bars.to_string(),
            b.gated.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Columns: time, selector, canonical, old, new
pub fn export_mappings_csv(events: &[MappingChangeEvent]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "selector", "canonical", "old", "new"])?;
    for e in events {
        wtr.write_record([
            e.time.to_string(),
            e.selector.to_string(),
            e.canonical.to_string(),
            e.old.as_ref().map(|s| s.to_string()).unwrap_or_default(),
            e.new.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Columns: id, time, symbol, quantity, status
pub fn export_orders_csv(orders: &[OrderIntent]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["id", "time", "symbol", "quantity", "status"])?;
    for o in orders {
        let status = match &o.rejection {
            None => "accepted".to_string(),
            Some(r) => format!("rejected: {r}"),
        };
        wtr.write_record([
            o.id.map(|id| id.to_string()).unwrap_or_default(),
            o.time.to_string(),
            o.symbol.to_string(),
            format!("{:.4}", o.quantity),
            status,
        ])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single run.
///
/// Creates a directory named `{scenario}_{run_id prefix}/` under `output_dir`
/// containing:
/// - `manifest.json`: the full `RunReport`
/// - `changes.csv`, `data_batches.csv`, `mappings.csv`, `orders.csv`
/// - `report.md`
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = report.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("{}_{}", report.scenario, prefix));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let r = &report.result;
    let files = [
        ("manifest.json", export_json(report)?),
        ("changes.csv", export_changes_csv(&r.change_batches)?),
        ("data_batches.csv", export_data_batches_csv(&r.data_batches)?),
        ("mappings.csv", export_mappings_csv(&r.mapping_events)?),
        ("orders.csv", export_orders_csv(&r.order_intents)?),
        ("report.md", report.to_markdown()),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `RunReport` from an artifact directory's manifest.json.
///
/// Rejects unknown schema versions.
pub fn load_artifacts(dir: &Path) -> Result<RunReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use unilab_core::domain::{Symbol, Timestamp};

    fn at(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn changes_csv_lists_removals_before_additions() {
        let before: BTreeSet<Symbol> = [Symbol::equity("SPY")].into_iter().collect();
        let after: BTreeSet<Symbol> = [Symbol::equity("QQQ")].into_iter().collect();
        let csv = export_changes_csv(&[SecurityChangeBatch::between(at(3), &before, &after)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,change,symbol");
        assert_eq!(lines[1], "2024-01-03 00:00:00,removed,SPY");
        assert_eq!(lines[2], "2024-01-03 00:00:00,added,QQQ");
    }

    #[test]
    fn orders_csv_marks_rejections() {
        let orders = vec![OrderIntent {
            id: None,
            time: at(3),
            symbol: Symbol::equity("SPY"),
            quantity: 5.0,
            rejection: Some(unilab_core::engine::OrderRejection::WarmingUp(Symbol::equity("SPY"))),
        }];
        let csv = export_orders_csv(&orders).unwrap();
        assert!(csv.contains("rejected: cannot trade SPY while warming up"));
    }
}

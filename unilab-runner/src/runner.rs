//! Scenario runner: wires configuration, scripted strategy, feed and engine.
//!
//! Two entry points:
//! - `run_scenario()`: one scenario, one engine, single-threaded.
//! - `run_batch()`: independent scenarios in parallel with Rayon (or
//!   sequentially). Each run owns its engine, so results do not depend on
//!   the mode.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};
use unilab_core::engine::{Engine, EngineError};

use crate::config::{ConfigError, ScenarioConfig};
use crate::feed::SyntheticFeed;
use crate::report::RunReport;
use crate::strategy::ScriptedStrategy;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Run a single scenario to completion.
pub fn run_scenario(config: &ScenarioConfig) -> Result<RunReport, RunError> {
    config.validate()?;
    let engine = Engine::new(config.engine_config()?)?;
    let mut strategy = ScriptedStrategy::from_config(config);
    let mut feed = SyntheticFeed::new(config.seed, config.feed.clone());

    info!(scenario = %config.name, run_id = %config.run_id(), "running scenario");
    let result = engine.run(&mut strategy, &mut feed)?;

    let pending = strategy.remaining_actions();
    if pending > 0 {
        warn!(scenario = %config.name, pending, "scripted actions scheduled after the run ended");
    }
    Ok(RunReport::new(config, result, strategy.into_log()))
}

/// Run several scenarios. Results come back in input order.
pub fn run_batch(configs: &[ScenarioConfig], parallel: bool) -> Vec<Result<RunReport, RunError>> {
    if parallel {
        configs.par_iter().map(run_scenario).collect()
    } else {
        configs.iter().map(run_scenario).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str) -> ScenarioConfig {
        ScenarioConfig::from_toml(&format!(
            r#"
name = "{name}"
start = "2024-01-02T00:00:00"
end = "2024-01-04T00:00:00"
resolution = "daily"

[[subscriptions]]
ticker = "SPY"
resolution = "daily"
"#
        ))
        .unwrap()
    }

    #[test]
    fn run_scenario_produces_report() {
        let report = run_scenario(&scenario("one")).unwrap();
        assert_eq!(report.scenario, "one");
        assert_eq!(report.result.ticks, 2);
        assert_eq!(report.script.slices, 2);
        assert_eq!(report.result.total_bars(), 2);
    }

    #[test]
    fn invalid_config_is_reported_before_running() {
        let mut config = scenario("bad");
        config.end = config.start;
        assert!(matches!(run_scenario(&config), Err(RunError::Config(_))));
    }

    #[test]
    fn batch_preserves_input_order() {
        let configs = vec![scenario("a"), scenario("b"), scenario("c")];
        let names: Vec<String> = run_batch(&configs, true)
            .into_iter()
            .map(|r| r.unwrap().scenario)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

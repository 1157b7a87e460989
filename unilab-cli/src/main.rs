//! UniLab CLI: run, batch and validate lifecycle scenarios.
//!
//! Commands:
//! - `run`: execute one scenario from a TOML file and optionally save artifacts
//! - `batch`: execute several scenarios, in parallel unless `--sequential`
//! - `validate`: parse and check a scenario without running it
//! - `example`: print a bundled scenario to stdout

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use unilab_runner::{run_batch, run_scenario, save_artifacts, RunReport, ScenarioConfig};

const EXAMPLES: [(&str, &str); 3] = [
    ("reselection", include_str!("../../scenarios/reselection.toml")),
    ("continuous", include_str!("../../scenarios/continuous.toml")),
    ("warmup", include_str!("../../scenarios/warmup.toml")),
];

#[derive(Parser)]
#[command(
    name = "unilab",
    about = "UniLab CLI: universe selection and security lifecycle simulator"
)]
struct Cli {
    /// Debug-level logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a scenario from a TOML file.
    Run {
        /// Path to the scenario TOML.
        #[arg(long)]
        config: PathBuf,

        /// Save manifest, CSV and Markdown artifacts under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Execute several scenarios.
    Batch {
        /// Scenario TOML files.
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Run one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Save artifacts for every successful run under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Parse and validate a scenario without running it.
    Validate {
        /// Path to the scenario TOML.
        #[arg(long)]
        config: PathBuf,
    },
    /// Print a bundled scenario: reselection, continuous, warmup.
    Example {
        name: String,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let outcome = match cli.command {
        Commands::Run { config, output_dir } => run_cmd(&config, output_dir.as_deref()),
        Commands::Batch { configs, sequential, output_dir } => {
            batch_cmd(&configs, sequential, output_dir.as_deref())
        }
        Commands::Validate { config } => validate_cmd(&config),
        Commands::Example { name } => example_cmd(&name),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load(path: &Path) -> Result<ScenarioConfig> {
    ScenarioConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn run_cmd(path: &Path, output_dir: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let report = run_scenario(&config).with_context(|| format!("running '{}'", config.name))?;
    print_summary(&report);

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&report, dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn batch_cmd(paths: &[PathBuf], sequential: bool, output_dir: Option<&Path>) -> Result<()> {
    let configs = paths.iter().map(|p| load(p)).collect::<Result<Vec<_>>>()?;
    info!(scenarios = configs.len(), parallel = !sequential, "starting batch");

    let mut failed = 0usize;
    for (config, outcome) in configs.iter().zip(run_batch(&configs, !sequential)) {
        match outcome {
            Ok(report) => {
                print_line(&report);
                if let Some(dir) = output_dir {
                    let run_dir = save_artifacts(&report, dir)?;
                    println!("Artifacts saved to: {}", run_dir.display());
                }
            }
            Err(err) => {
                failed += 1;
                error!(scenario = %config.name, "{err}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} scenarios failed", configs.len());
    }
    Ok(())
}

fn validate_cmd(path: &Path) -> Result<()> {
    let config = load(path)?;
    config.validate().with_context(|| format!("validating '{}'", config.name))?;
    let engine = config.engine_config()?;

    println!("Scenario '{}' is valid", config.name);
    println!("Run ID:     {}", config.run_id());
    println!("Period:     {} to {} ({})", config.start, config.end, config.resolution);
    println!("Selectors:  {}", config.selectors.len());
    println!("Explicit:   {}", config.subscriptions.len());
    println!("Actions:    {}", config.actions.len());
    if let Some(window) = engine.warmup_window()? {
        println!("Warmup:     {} to {}", window.start, window.end);
    }
    Ok(())
}

fn example_cmd(name: &str) -> Result<()> {
    match EXAMPLES.iter().find(|(n, _)| *n == name) {
        Some((_, toml)) => {
            print!("{toml}");
            Ok(())
        }
        None => {
            let names: Vec<&str> = EXAMPLES.iter().map(|(n, _)| *n).collect();
            bail!("unknown example '{name}'. Valid: {}", names.join(", "))
        }
    }
}

fn print_line(report: &RunReport) {
    let s = report.summary();
    println!(
        "{:<20} {:>5} steps  +{:<4} -{:<4} remaps {:<3} failures {:<3} orders {}/{}",
        report.scenario,
        s.ticks,
        s.additions,
        s.removals,
        s.remaps,
        s.selection_failures,
        s.orders_accepted,
        s.orders_accepted + s.orders_rejected
    );
}

fn print_summary(report: &RunReport) {
    let s = report.summary();
    println!();
    println!("=== Lifecycle Run: {} ===", report.scenario);
    println!("Run ID:         {}", report.run_id);
    println!("Period:         {} to {}", report.start, report.end);
    println!("Steps:          {} ({} warmup)", s.ticks, s.warmup_batches);
    if let Some(t) = report.result.warmup_ended_at {
        println!("Warmup Ended:   {t}");
    }
    println!();
    println!("--- Lifecycle ---");
    println!(
        "Changes:        {} batches (+{} / -{})",
        s.change_batches, s.additions, s.removals
    );
    println!("Remaps:         {} ({} failed)", s.remaps, s.mapping_failures);
    println!("Sel. Failures:  {}", s.selection_failures);
    println!(
        "Orders:         {} accepted, {} rejected",
        s.orders_accepted, s.orders_rejected
    );
    println!("Bars:           {} ({} gated)", s.bars, s.gated_bars);
    println!(
        "Final:          {} tradable, {} subscriptions, {} feeds",
        s.final_tradable, s.final_subscriptions, s.final_data_feeds
    );
    if report.script.missed_removals > 0 {
        println!();
        println!(
            "WARNING: {} scripted removals targeted symbols that were not subscribed",
            report.script.missed_removals
        );
    }
}

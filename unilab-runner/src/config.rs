//! Serializable scenario configuration.
//!
//! A scenario captures everything needed to reproduce one lifecycle run:
//! - Run window, nominal resolution, warmup and failure policy
//! - Universe selector definitions and explicit subscriptions
//! - The in-memory collaborators selectors read (contract catalogue, fundamentals)
//! - A time-stamped strategy script and the synthetic feed settings
//!
//! Timestamps and dates are quoted strings (`"2024-01-02T00:00:00"`,
//! `"2024-01-02"`) so they deserialize through chrono rather than TOML's own
//! datetime type.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use unilab_core::domain::{Resolution, Symbol, MANUAL_SELECTOR};
use unilab_core::engine::{EngineConfig, WarmupSpec};
use unilab_core::futures::{MappingMode, NormalizationMode};
use unilab_core::selection::{Cadence, FailurePolicy};

/// Unique identifier for a scenario run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize scenario: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid engine configuration: {0}")]
    Engine(#[from] unilab_core::engine::ConfigError),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// One complete lifecycle scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,

    /// First live instant; warmup (if any) runs before it.
    pub start: NaiveDateTime,

    pub end: NaiveDateTime,

    /// Nominal resolution the clock steps at once warmup is over.
    pub resolution: Resolution,

    /// Seed for the synthetic feed.
    #[serde(default)]
    pub seed: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Quantity to order for every newly added instrument, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_on_add: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup: Option<WarmupConfig>,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub selectors: Vec<SelectorConfig>,

    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,

    #[serde(default)]
    pub contracts: Vec<ContractConfig>,

    #[serde(default)]
    pub coarse: Vec<CoarseRowConfig>,

    #[serde(default)]
    pub fine: Vec<FineRowConfig>,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl ScenarioConfig {
    /// Load a scenario from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    /// Parse a scenario from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Deterministic hash of the full scenario.
    ///
    /// Two scenarios with identical content share a RunId, whatever file
    /// they were loaded from.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    /// Engine configuration for this scenario.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::new(self.start, self.end, self.resolution)
            .with_failure_policy(self.failure_policy);
        if let Some(warmup) = &self.warmup {
            config = config.with_warmup(warmup.to_spec()?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("scenario name is empty".into()));
        }
        self.engine_config()?;

        let roots: BTreeSet<&str> = self.contracts.iter().map(|c| c.root.as_str()).collect();
        let mut ids = BTreeSet::new();
        let inline = self.actions.iter().filter_map(|a| match &a.action {
            Action::AddUniverse { selector } => Some(selector),
            _ => None,
        });
        for selector in self.selectors.iter().chain(inline) {
            if selector.id.trim().is_empty() || selector.id == MANUAL_SELECTOR {
                return Err(ConfigError::Invalid(format!(
                    "selector id '{}' is empty or reserved",
                    selector.id
                )));
            }
            if !ids.insert(selector.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate selector id '{}'", selector.id)));
            }
            selector.validate(&roots, !self.coarse.is_empty())?;
        }

        for action in &self.actions {
            if let Action::Order { quantity, .. } = action.action {
                if !quantity.is_finite() || quantity == 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "order at {} has invalid quantity {quantity}",
                        action.at
                    )));
                }
            }
        }
        if self.feed.volatility < 0.0 || !(0.0..=1.0).contains(&self.feed.missing_rate) {
            return Err(ConfigError::Invalid("feed volatility or missing_rate out of range".into()));
        }
        Ok(())
    }
}

/// Build a symbol from a ticker and optional expiry.
///
/// `"/ES"` names the canonical continuous future of root `ES`; a ticker with
/// an expiry names a concrete contract; anything else is an equity.
pub fn parse_symbol(ticker: &str, expiry: Option<NaiveDate>) -> Symbol {
    match (expiry, ticker.strip_prefix('/')) {
        (Some(expiry), _) => Symbol::future(ticker.trim_start_matches('/'), expiry),
        (None, Some(root)) => Symbol::canonical_future(root),
        (None, None) => Symbol::equity(ticker),
    }
}

fn default_resolution() -> Resolution {
    Resolution::Minute
}

fn default_max_days() -> i64 {
    90
}

fn default_true() -> bool {
    true
}

// ── Warmup ───────────────────────────────────────────────────────────

/// Exactly one of `bars`, `days` or `hours`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WarmupConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bars: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<i64>,

    /// Data resolution during warmup; defaults to each subscription's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl WarmupConfig {
    pub fn to_spec(&self) -> Result<WarmupSpec, ConfigError> {
        let spec = match (self.bars, self.days, self.hours) {
            (Some(bars), None, None) => WarmupSpec::bars(bars),
            (None, Some(days), None) => WarmupSpec::period(
                Duration::try_days(days).ok_or_else(|| out_of_range("warmup days", days))?,
            ),
            (None, None, Some(hours)) => WarmupSpec::period(
                Duration::try_hours(hours).ok_or_else(|| out_of_range("warmup hours", hours))?,
            ),
            _ => {
                return Err(ConfigError::Invalid(
                    "warmup needs exactly one of bars, days or hours".into(),
                ))
            }
        };
        Ok(match self.resolution {
            Some(resolution) => spec.with_resolution(resolution),
            None => spec,
        })
    }
}

// ── Feed ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_base_price")]
    pub base_price: f64,

    /// Maximum relative move per bar.
    #[serde(default = "default_volatility")]
    pub volatility: f64,

    /// Probability that a requested bar is missing.
    #[serde(default)]
    pub missing_rate: f64,
}

fn default_base_price() -> f64 {
    100.0
}

fn default_volatility() -> f64 {
    0.01
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_price: default_base_price(),
            volatility: default_volatility(),
            missing_rate: 0.0,
        }
    }
}

// ── Selectors ────────────────────────────────────────────────────────

/// Serializable cadence.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CadenceConfig {
    EveryStep,
    Hourly,
    #[default]
    Daily,
    Weekly,
    MonthStart,
    IntervalMinutes(i64),
}

impl CadenceConfig {
    pub fn to_cadence(self) -> Result<Cadence, ConfigError> {
        Ok(match self {
            CadenceConfig::EveryStep => Cadence::EveryStep,
            CadenceConfig::Hourly => Cadence::Hourly,
            CadenceConfig::Daily => Cadence::Daily,
            CadenceConfig::Weekly => Cadence::Weekly,
            CadenceConfig::MonthStart => Cadence::MonthStart,
            CadenceConfig::IntervalMinutes(m) if m > 0 => Cadence::Interval(
                Duration::try_minutes(m).ok_or_else(|| out_of_range("cadence interval minutes", m))?,
            ),
            CadenceConfig::IntervalMinutes(m) => {
                return Err(ConfigError::Invalid(format!("non-positive cadence interval {m}")))
            }
        })
    }
}

fn out_of_range(what: &str, value: i64) -> ConfigError {
    ConfigError::Invalid(format!("{what} {value} is out of range"))
}

/// A universe selector and its subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorConfig {
    pub id: String,

    /// Resolution requested for every selected symbol.
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,

    #[serde(default)]
    pub min_time_in_universe_hours: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,

    #[serde(flatten)]
    pub source: SourceConfig,
}

impl SelectorConfig {
    /// Minimum time a selected symbol stays in this universe.
    pub fn min_time_in_universe(&self) -> Result<Duration, ConfigError> {
        if self.min_time_in_universe_hours < 0 {
            return Err(ConfigError::Invalid(format!(
                "selector '{}' has a negative minimum time in universe",
                self.id
            )));
        }
        Duration::try_hours(self.min_time_in_universe_hours).ok_or_else(|| {
            out_of_range("minimum time in universe hours", self.min_time_in_universe_hours)
        })
    }

    fn validate(&self, roots: &BTreeSet<&str>, has_coarse: bool) -> Result<(), ConfigError> {
        self.min_time_in_universe()?;
        match &self.source {
            SourceConfig::Scheduled { cadence, .. } | SourceConfig::Fundamental { cadence, .. } => {
                if let Err(ConfigError::Invalid(reason)) = cadence.to_cadence() {
                    return Err(ConfigError::Invalid(format!("selector '{}': {reason}", self.id)));
                }
            }
            _ => {}
        }
        match &self.source {
            SourceConfig::Fundamental { .. } if !has_coarse => Err(ConfigError::Invalid(format!(
                "fundamental selector '{}' needs coarse rows",
                self.id
            ))),
            SourceConfig::FutureChain { root, min_days, max_days, .. } => {
                if min_days > max_days {
                    return Err(ConfigError::Invalid(format!(
                        "selector '{}' has an empty expiry window",
                        self.id
                    )));
                }
                require_root(&self.id, root, roots)
            }
            SourceConfig::ContinuousFuture { root, .. } => require_root(&self.id, root, roots),
            _ => Ok(()),
        }
    }
}

fn require_root(id: &str, root: &str, roots: &BTreeSet<&str>) -> Result<(), ConfigError> {
    if roots.contains(root) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("selector '{id}' references unknown futures root '{root}'")))
    }
}

/// Where a selector's candidates come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Fixed ticker lists that change on given dates.
    Scheduled {
        #[serde(default)]
        cadence: CadenceConfig,
        #[serde(default)]
        schedule: Vec<ScheduleEntry>,
        /// Days on which the rule reports a failure instead of candidates.
        #[serde(default)]
        fail_on: Vec<NaiveDate>,
    },

    /// Top-N by dollar volume, optionally narrowed by sector and market cap.
    Fundamental {
        #[serde(default)]
        cadence: CadenceConfig,
        top: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_market_cap: Option<f64>,
    },

    /// Contracts of a root inside a days-to-expiry window.
    FutureChain {
        root: String,
        #[serde(default)]
        min_days: i64,
        #[serde(default = "default_max_days")]
        max_days: i64,
        #[serde(default)]
        front_only: bool,
    },

    /// Canonical continuous future plus its mapped contract.
    ContinuousFuture {
        root: String,
        #[serde(default)]
        depth_offset: usize,
        #[serde(default)]
        mapping_mode: MappingMode,
        #[serde(default)]
        normalization: NormalizationMode,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    /// Tickers apply from this day until the next entry.
    pub from: NaiveDate,
    pub tickers: Vec<String>,
}

// ── Subscriptions and collaborators ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionConfig {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
}

impl SubscriptionConfig {
    pub fn symbol(&self) -> Symbol {
        parse_symbol(&self.ticker, self.expiry)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractConfig {
    pub root: String,
    pub expiry: NaiveDate,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub open_interest: u64,
    /// Activity changes from a given day onwards.
    #[serde(default)]
    pub activity: Vec<ActivityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityConfig {
    pub from: NaiveDate,
    pub volume: u64,
    pub open_interest: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoarseRowConfig {
    pub date: NaiveDate,
    pub ticker: String,
    pub price: f64,
    pub volume: u64,
    #[serde(default = "default_true")]
    pub has_fundamental_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FineRowConfig {
    pub ticker: String,
    pub market_cap: f64,
    pub sector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,
}

// ── Strategy script ──────────────────────────────────────────────────

/// An action the scripted strategy performs at the first step at or after `at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionConfig {
    pub at: NaiveDateTime,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddSecurity {
        ticker: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiry: Option<NaiveDate>,
        #[serde(default = "default_resolution")]
        resolution: Resolution,
    },
    RemoveSecurity {
        ticker: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiry: Option<NaiveDate>,
    },
    AddUniverse {
        selector: SelectorConfig,
    },
    RemoveUniverse {
        id: String,
    },
    Order {
        ticker: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiry: Option<NaiveDate>,
        quantity: f64,
    },
}

//! Runner Configuration
//!
//! Loaded once at startup from a YAML file layered with `DIGIT_RUNNER__*`
//! environment overrides. The venue API token only ever comes from
//! `DERIV_API_TOKEN`.

use crate::detector::StrategyConfig;
use crate::digit::{ExtractionMode, MAX_PRECISION};
use crate::guard::LimitsConfig;
use crate::hedge::{HedgeConfig, HedgeLeg};
use crate::staking::{StakeSchedule, StakingConfig, StakingPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tick_feed::DerivConfig;

/// Environment variable holding the venue API token
pub const API_TOKEN_ENV: &str = "DERIV_API_TOKEN";
/// Prefix for environment overrides, e.g. `DIGIT_RUNNER__HEARTBEAT_SECS`
pub const ENV_PREFIX: &str = "DIGIT_RUNNER";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("No instances configured")]
    NoInstances,

    #[error("Duplicate instance name: {0}")]
    DuplicateInstance(String),

    #[error("Instance {instance}: {reason}")]
    Invalid { instance: String, reason: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Load(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Load(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

/// Whether instances share one outstanding-decision slot
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PendingScope {
    /// One outstanding decision per symbol
    #[default]
    PerSymbol,
    /// One outstanding decision across all symbols
    Global,
}

/// What resolves an outstanding decision
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlementSource {
    /// Explicit settlement events from the venue
    #[default]
    Venue,
    /// The first tick after placement (single-tick contracts)
    NextTick,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SymbolConfig {
    pub symbol: String,
    /// Decimal places the venue quotes this symbol with
    #[serde(default = "default_precision")]
    pub precision: u32,
}

/// One independent engine: its streams, detector, staking and limits
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InstanceConfig {
    pub name: String,
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub extraction: ExtractionMode,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Past ticks fetched per symbol before trading; 0 disables
    #[serde(default = "default_warmup_ticks")]
    pub warmup_ticks: usize,
    #[serde(default)]
    pub pending_scope: PendingScope,
    #[serde(default)]
    pub settlement: SettlementSource,
    /// Win payout as a fraction of stake when settling locally
    #[serde(default = "default_payout_ratio")]
    pub payout_ratio: Decimal,
    #[serde(default = "default_duration_ticks")]
    pub duration_ticks: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub staking: StakingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Trade every trigger as a follow/reverse pair on linked ladders
    #[serde(default)]
    pub hedge: Option<HedgeConfig>,
}

impl InstanceConfig {
    /// Instance with default settings for everything but its streams
    pub fn new(name: impl Into<String>, symbols: Vec<SymbolConfig>) -> Self {
        Self {
            name: name.into(),
            symbols,
            extraction: ExtractionMode::default(),
            history_capacity: default_history_capacity(),
            warmup_ticks: default_warmup_ticks(),
            pending_scope: PendingScope::default(),
            settlement: SettlementSource::default(),
            payout_ratio: default_payout_ratio(),
            duration_ticks: default_duration_ticks(),
            currency: default_currency(),
            staking: StakingConfig::default(),
            limits: LimitsConfig::default(),
            strategy: StrategyConfig::default(),
            hedge: None,
        }
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.symbol.clone()).collect()
    }

    /// History ticks to request per symbol
    pub fn warmup_count(&self) -> usize {
        self.warmup_ticks.min(self.history_capacity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            instance: self.name.clone(),
            reason,
        };

        if self.symbols.is_empty() {
            return Err(invalid("at least one symbol is required".to_string()));
        }
        let mut seen = HashSet::new();
        for s in &self.symbols {
            if !seen.insert(s.symbol.as_str()) {
                return Err(invalid(format!("symbol {} listed twice", s.symbol)));
            }
            if s.precision > MAX_PRECISION {
                return Err(invalid(format!(
                    "precision {} for {} exceeds {}",
                    s.precision, s.symbol, MAX_PRECISION
                )));
            }
        }

        self.validate_staking().map_err(invalid)?;
        self.validate_limits().map_err(invalid)?;
        self.validate_strategy().map_err(invalid)?;
        self.validate_hedge().map_err(invalid)?;

        if self.payout_ratio <= Decimal::ZERO {
            return Err(invalid("payout_ratio must be positive".to_string()));
        }
        if self.duration_ticks == 0 {
            return Err(invalid("duration_ticks must be at least 1".to_string()));
        }
        if self.settlement == SettlementSource::NextTick && self.duration_ticks != 1 {
            return Err(invalid(
                "next_tick settlement only applies to single-tick contracts".to_string(),
            ));
        }

        let window = self.strategy.build(&self.symbol_names()).min_window();
        if self.history_capacity < window {
            return Err(invalid(format!(
                "history_capacity {} is smaller than the {} digits the strategy needs",
                self.history_capacity, window
            )));
        }

        Ok(())
    }

    fn validate_staking(&self) -> Result<(), String> {
        let staking = &self.staking;
        match &staking.schedule {
            StakeSchedule::Multiplier { multiplier } => {
                if staking.base_stake <= Decimal::ZERO {
                    return Err("base_stake must be positive".to_string());
                }
                if *multiplier < Decimal::ONE {
                    return Err("multiplier must be at least 1".to_string());
                }
            }
            StakeSchedule::Ladder { stakes } => {
                if stakes.is_empty() {
                    return Err("stake ladder is empty".to_string());
                }
                if stakes.iter().any(|s| *s <= Decimal::ZERO) {
                    return Err("stake ladder entries must be positive".to_string());
                }
            }
        }
        if staking.stake_precision > MAX_PRECISION {
            return Err("stake_precision is too large".to_string());
        }

        // Stakes only grow with the level, so the top one bounds them all
        let policy = StakingPolicy::new(staking.clone());
        policy
            .stake_for_level(policy.max_levels())
            .map_err(|e| format!("stake at level {}: {}", policy.max_levels(), e))?;
        Ok(())
    }

    fn validate_limits(&self) -> Result<(), String> {
        if self.limits.take_profit <= Decimal::ZERO {
            return Err("take_profit must be positive".to_string());
        }
        if self.limits.stop_loss >= Decimal::ZERO {
            return Err("stop_loss must be negative".to_string());
        }
        if self.limits.max_trades == Some(0) {
            return Err("max_trades must be at least 1".to_string());
        }
        Ok(())
    }

    fn validate_strategy(&self) -> Result<(), String> {
        match &self.strategy {
            StrategyConfig::RunLength(c) => {
                if c.rules.is_empty() {
                    return Err("run_length needs at least one rule".to_string());
                }
                for rule in &c.rules {
                    if rule.threshold == 0 {
                        return Err("run threshold must be at least 1".to_string());
                    }
                    check_barrier(rule.contract, rule.barrier)?;
                }
            }
            StrategyConfig::Sequence(c) => {
                c.key_length()?;
            }
            StrategyConfig::Gap(c) => {
                if c.marker_pairs().map_or(true, |m| m.is_empty()) {
                    return Err("gap markers must be two-digit strings".to_string());
                }
                if c.marker_source == crate::detector::MarkerSource::Quote
                    && self.symbols.iter().any(|s| s.precision < 2)
                {
                    return Err("quote markers need a precision of at least 2".to_string());
                }
                check_barrier(c.contract, c.barrier)?;
            }
            StrategyConfig::Frequency(_) => {
                if self.symbols.len() < 2 {
                    return Err("frequency matching needs at least two symbols".to_string());
                }
            }
        }
        Ok(())
    }

    fn validate_hedge(&self) -> Result<(), String> {
        let Some(hedge) = &self.hedge else {
            return Ok(());
        };
        hedge.validate()?;

        if self.pending_scope != PendingScope::PerSymbol {
            return Err("hedged pairs need per_symbol pending scope".to_string());
        }
        if self.symbols.len() != 1 {
            return Err("hedged pairs trade exactly one symbol".to_string());
        }
        if let Some(contract) = self
            .strategy
            .contracts()
            .into_iter()
            .find(|c| HedgeLeg::Follow.contract(*c).is_none())
        {
            return Err(format!("{} has no opposite contract to hedge with", contract));
        }
        Ok(())
    }
}

fn check_barrier(contract: tick_feed::ContractKind, barrier: Option<u8>) -> Result<(), String> {
    match barrier {
        None if contract.needs_barrier() => Err(format!("{} requires a barrier", contract)),
        Some(b) if b > 9 => Err(format!("barrier {} is not a digit", b)),
        _ => Ok(()),
    }
}

/// Top-level runner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub venue: DerivConfig,
    #[serde(default)]
    pub trading_mode: TradingMode,
    /// Where state snapshots and journals are written
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// How long a stopping instance waits for an in-flight settlement
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    pub instances: Vec<InstanceConfig>,
}

impl RunnerConfig {
    /// Load from a file with environment overrides, then validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: RunnerConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.venue.api_token = std::env::var(API_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML directly, without environment layering
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instances.is_empty() {
            return Err(ConfigError::NoInstances);
        }
        let mut names = HashSet::new();
        for instance in &self.instances {
            if !names.insert(instance.name.as_str()) {
                return Err(ConfigError::DuplicateInstance(instance.name.clone()));
            }
            instance.validate()?;
        }
        Ok(())
    }

    /// Configured state directory, else the platform data dir
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join("digit-runner"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

fn default_precision() -> u32 { 2 }
fn default_history_capacity() -> usize { 100 }
fn default_warmup_ticks() -> usize { 100 }
fn default_payout_ratio() -> Decimal { Decimal::new(95, 2) }
fn default_duration_ticks() -> u32 { 1 }
fn default_currency() -> String { "USD".to_string() }
fn default_heartbeat_secs() -> u64 { 30 }
fn default_shutdown_grace_secs() -> u64 { 15 }

//! Digit Runner Library
//!
//! Last-digit pattern detection, martingale staking and per-instance trade
//! orchestration on top of the `tick-feed` venue transport.

pub mod config;
pub mod detector;
pub mod digit;
pub mod engine;
pub mod error;
pub mod guard;
pub mod hedge;
pub mod history;
pub mod paper;
pub mod profit;
pub mod runner;
pub mod staking;
pub mod state;
pub mod types;

// Re-export main types for convenience
pub use config::{
    ConfigError, InstanceConfig, PendingScope, RunnerConfig, SettlementSource, SymbolConfig,
    TradingMode,
};
pub use detector::{Detector, StrategyConfig, TickContext};
pub use digit::{extract, extract_pair, ExtractionMode};
pub use engine::{
    Engine, EngineAction, EngineSnapshot, EngineStatus, PendingDecision, ResolvedDecision,
    SlotState,
};
pub use error::{EngineError, Result};
pub use guard::{should_stop, LimitsConfig, TerminationGuard};
pub use hedge::{HedgeConfig, HedgeLeg, LinkedLadder};
pub use history::DigitHistory;
pub use paper::PaperVenue;
pub use profit::ProfitState;
pub use runner::{InstanceRunner, RunSettings, RunSummary};
pub use staking::{StakeSchedule, StakingConfig, StakingPolicy, StakingState};
pub use state::StateManager;
pub use types::{Outcome, StopReason, TriggerEvent};

//! Core types shared by detectors, staking and the decision engine

use serde::{Deserialize, Serialize};
use tick_feed::ContractKind;

/// Binary result of a resolved contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn is_win(self) -> bool {
        matches!(self, Outcome::Win)
    }
}

/// A detector's request to trade on the current digit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Symbol the contract is bought on
    pub symbol: String,
    pub contract: ContractKind,
    /// Barrier or predicted digit for barrier contracts
    pub barrier: Option<u8>,
    /// Detector that fired
    pub detector: String,
    /// Other stream involved in a cross-stream match
    pub partner: Option<String>,
    /// Detector-specific rule that fired, handed back with the outcome
    pub rule: Option<usize>,
}

impl TriggerEvent {
    pub fn new(
        symbol: impl Into<String>,
        contract: ContractKind,
        barrier: Option<u8>,
        detector: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            contract,
            barrier,
            detector: detector.into(),
            partner: None,
            rule: None,
        }
    }

    pub fn with_partner(mut self, partner: impl Into<String>) -> Self {
        self.partner = Some(partner.into());
        self
    }

    pub fn with_rule(mut self, rule: usize) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// Why an engine stopped trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TakeProfit,
    StopLoss,
    MaxTrades,
    /// Operator interrupt or lost venue connection
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::TakeProfit => "take profit reached",
            StopReason::StopLoss => "stop loss reached",
            StopReason::MaxTrades => "trade limit reached",
            StopReason::Shutdown => "shutdown requested",
        };
        f.write_str(s)
    }
}

//! Take-profit / stop-loss termination guard

use crate::types::StopReason;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Profit limits for an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_take_profit")]
    pub take_profit: Decimal,
    /// Negative
    #[serde(default = "default_stop_loss")]
    pub stop_loss: Decimal,
    #[serde(default)]
    pub max_trades: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            take_profit: default_take_profit(),
            stop_loss: default_stop_loss(),
            max_trades: None,
        }
    }
}

fn default_take_profit() -> Decimal { Decimal::from(10) }
fn default_stop_loss() -> Decimal { Decimal::from(-50) }

/// Stop when `profit >= take_profit` or `profit <= stop_loss`
pub fn should_stop(profit: Decimal, take_profit: Decimal, stop_loss: Decimal) -> bool {
    profit >= take_profit || profit <= stop_loss
}

#[derive(Debug, Clone)]
pub struct TerminationGuard {
    limits: LimitsConfig,
}

impl TerminationGuard {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Reason to stop given fully updated profit and trade count
    pub fn evaluate(&self, profit: Decimal, trade_count: u64) -> Option<StopReason> {
        if should_stop(profit, self.limits.take_profit, self.limits.stop_loss) {
            return Some(if profit >= self.limits.take_profit {
                StopReason::TakeProfit
            } else {
                StopReason::StopLoss
            });
        }
        match self.limits.max_trades {
            Some(max) if trade_count >= max => Some(StopReason::MaxTrades),
            _ => None,
        }
    }
}

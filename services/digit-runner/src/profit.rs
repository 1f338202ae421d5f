//! Cumulative profit and streak statistics

use crate::types::Outcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running totals for an engine, changed only by resolved outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitState {
    pub cumulative_profit: Decimal,
    pub trade_count: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub current_win_streak: u32,
    pub current_loss_streak: u32,
    pub max_win_streak: u32,
    pub max_loss_streak: u32,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
}

impl ProfitState {
    /// Add one resolved outcome and its signed amount
    pub fn record(&mut self, outcome: Outcome, amount: Decimal) {
        self.cumulative_profit += amount;
        self.trade_count += 1;

        match outcome {
            Outcome::Win => {
                self.win_count += 1;
                self.current_win_streak += 1;
                self.current_loss_streak = 0;
                self.max_win_streak = self.max_win_streak.max(self.current_win_streak);
            }
            Outcome::Loss => {
                self.loss_count += 1;
                self.current_loss_streak += 1;
                self.current_win_streak = 0;
                self.max_loss_streak = self.max_loss_streak.max(self.current_loss_streak);
            }
        }

        self.best_trade = Some(self.best_trade.map_or(amount, |b| b.max(amount)));
        self.worst_trade = Some(self.worst_trade.map_or(amount, |w| w.min(amount)));
    }

    /// Wins as a percentage of resolved trades
    pub fn win_rate(&self) -> Decimal {
        if self.trade_count == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.win_count) * Decimal::ONE_HUNDRED / Decimal::from(self.trade_count))
            .round_dp(2)
    }
}

//! Hedged pair staking
//!
//! A hedged instance trades every trigger twice on the same symbol. The
//! reverse leg buys the detector's contract (betting the run breaks), the
//! follow leg buys its opposite (betting the run continues). Both legs share
//! one round index into their own stake ladders:
//!
//! - a follow win moves both legs up one round, capped at the last
//! - a reverse win takes both legs back to the first round
//! - a loss on either leg keeps the round

use crate::staking::ResetReason;
use crate::types::Outcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tick_feed::ContractKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeLeg {
    Follow,
    Reverse,
}

impl HedgeLeg {
    pub const ALL: [HedgeLeg; 2] = [HedgeLeg::Follow, HedgeLeg::Reverse];

    pub fn as_str(self) -> &'static str {
        match self {
            HedgeLeg::Follow => "follow",
            HedgeLeg::Reverse => "reverse",
        }
    }

    /// Contract this leg buys when the detector asks for `trigger`
    pub fn contract(self, trigger: ContractKind) -> Option<ContractKind> {
        match self {
            HedgeLeg::Reverse => Some(trigger),
            HedgeLeg::Follow => trigger.opposite(),
        }
    }

    /// Slot key for this leg on `symbol`
    pub fn slot(self, symbol: &str) -> String {
        format!("{}/{}", symbol, self.as_str())
    }
}

impl fmt::Display for HedgeLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stake ladders of a hedged pair, one entry per round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeConfig {
    #[serde(default = "default_follow_stakes")]
    pub follow_stakes: Vec<Decimal>,
    #[serde(default = "default_reverse_stakes")]
    pub reverse_stakes: Vec<Decimal>,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            follow_stakes: default_follow_stakes(),
            reverse_stakes: default_reverse_stakes(),
        }
    }
}

impl HedgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.follow_stakes.is_empty() {
            return Err("hedge ladders are empty".to_string());
        }
        if self.follow_stakes.len() != self.reverse_stakes.len() {
            return Err(format!(
                "hedge ladders differ in length ({} follow, {} reverse)",
                self.follow_stakes.len(),
                self.reverse_stakes.len()
            ));
        }
        if self
            .follow_stakes
            .iter()
            .chain(&self.reverse_stakes)
            .any(|s| *s <= Decimal::ZERO)
        {
            return Err("hedge stakes must be positive".to_string());
        }
        Ok(())
    }
}

fn ladder(cents: &[i64]) -> Vec<Decimal> {
    cents.iter().map(|c| Decimal::new(*c, 2)).collect()
}

fn default_follow_stakes() -> Vec<Decimal> {
    ladder(&[35, 45, 110, 260, 610, 1420, 3320, 7800, 18200])
}

fn default_reverse_stakes() -> Vec<Decimal> {
    ladder(&[45, 64, 157, 372, 872, 2031, 4748, 11154, 26026])
}

#[derive(Debug, Clone)]
pub struct LinkedLadder {
    config: HedgeConfig,
}

impl LinkedLadder {
    pub fn new(config: HedgeConfig) -> Self {
        Self { config }
    }

    pub fn rounds(&self) -> usize {
        self.config.follow_stakes.len()
    }

    fn last_round(&self) -> usize {
        self.rounds().saturating_sub(1)
    }

    /// Stake for `leg` at `round`; rounds past the end use the last entry
    pub fn stake(&self, leg: HedgeLeg, round: usize) -> Decimal {
        let stakes = match leg {
            HedgeLeg::Follow => &self.config.follow_stakes,
            HedgeLeg::Reverse => &self.config.reverse_stakes,
        };
        stakes
            .get(round.min(self.last_round()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Shared round after `leg` resolves with `outcome`
    pub fn advance(
        &self,
        round: usize,
        leg: HedgeLeg,
        outcome: Outcome,
    ) -> (usize, Option<ResetReason>) {
        match (leg, outcome) {
            (HedgeLeg::Follow, Outcome::Win) => ((round + 1).min(self.last_round()), None),
            (HedgeLeg::Reverse, Outcome::Win) => (0, Some(ResetReason::Win)),
            (_, Outcome::Loss) => (round, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HedgeLeg::{Follow, Reverse};
    use Outcome::{Loss, Win};

    fn three_rounds() -> LinkedLadder {
        LinkedLadder::new(HedgeConfig {
            follow_stakes: ladder(&[100, 200, 400]),
            reverse_stakes: ladder(&[150, 300, 600]),
        })
    }

    #[test]
    fn test_round_transitions() {
        let ladder = three_rounds();

        assert_eq!(ladder.advance(0, Follow, Win), (1, None));
        assert_eq!(ladder.advance(1, Follow, Loss), (1, None));
        assert_eq!(ladder.advance(1, Reverse, Loss), (1, None));
        assert_eq!(ladder.advance(2, Reverse, Win), (0, Some(ResetReason::Win)));

        // Follow wins stop climbing at the last round
        assert_eq!(ladder.advance(2, Follow, Win), (2, None));
    }

    #[test]
    fn test_stakes_per_leg() {
        let ladder = three_rounds();
        assert_eq!(ladder.stake(Follow, 1), Decimal::TWO);
        assert_eq!(ladder.stake(Reverse, 1), Decimal::from(3));
        assert_eq!(ladder.stake(Reverse, 9), Decimal::from(6));
    }

    #[test]
    fn test_leg_contracts() {
        assert_eq!(Reverse.contract(ContractKind::DigitEven), Some(ContractKind::DigitEven));
        assert_eq!(Follow.contract(ContractKind::DigitEven), Some(ContractKind::DigitOdd));
        assert_eq!(Follow.contract(ContractKind::DigitOver), None);
        assert_eq!(Follow.slot("1HZ10V"), "1HZ10V/follow");
    }

    #[test]
    fn test_validate() {
        let config = HedgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.follow_stakes.len(), 9);

        let uneven = HedgeConfig {
            reverse_stakes: ladder(&[45]),
            ..HedgeConfig::default()
        };
        assert!(uneven.validate().is_err());

        let zero = HedgeConfig {
            follow_stakes: ladder(&[0]),
            reverse_stakes: ladder(&[45]),
        };
        assert!(zero.validate().is_err());
    }
}

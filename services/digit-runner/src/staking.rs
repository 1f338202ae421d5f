//! Martingale staking policy
//!
//! Pure state machine over (stake, consecutive losses, outcome). The engine
//! owns one `StakingState` per decision slot and replaces it with the state
//! returned by [`StakingPolicy::next`] on every resolved outcome.

use crate::error::{EngineError, Result};
use crate::types::Outcome;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// How stakes grow with consecutive losses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StakeSchedule {
    /// `base * multiplier ^ level`
    Multiplier { multiplier: Decimal },
    /// Explicit stake per level; level 0 is the base stake
    Ladder { stakes: Vec<Decimal> },
}

/// What happens when losses run past the last level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Zero the loss counter and go back to the base stake
    #[default]
    ResetToBase,
    /// Keep counting losses, stake stays at the last level
    HoldAtCap,
}

/// Staking parameters for an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingConfig {
    #[serde(default = "default_base_stake")]
    pub base_stake: Decimal,
    #[serde(default = "default_schedule")]
    pub schedule: StakeSchedule,
    /// Highest loss level; ignored for ladders, which use their length
    #[serde(default = "default_max_levels")]
    pub max_levels: u32,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Decimal places stakes are rounded to
    #[serde(default = "default_stake_precision")]
    pub stake_precision: u32,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            base_stake: default_base_stake(),
            schedule: default_schedule(),
            max_levels: default_max_levels(),
            overflow: OverflowPolicy::default(),
            stake_precision: default_stake_precision(),
        }
    }
}

fn default_base_stake() -> Decimal { Decimal::ONE }
fn default_schedule() -> StakeSchedule {
    StakeSchedule::Multiplier {
        multiplier: Decimal::new(204, 2),
    }
}
fn default_max_levels() -> u32 { 5 }
fn default_stake_precision() -> u32 { 2 }

/// Current stake and loss streak for one decision slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingState {
    pub current_stake: Decimal,
    pub consecutive_losses: u32,
}

/// Why a step went back to the base stake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    Win,
    LevelCapExceeded,
}

/// Result of applying one outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeStep {
    pub state: StakingState,
    pub reset: Option<ResetReason>,
}

#[derive(Debug, Clone)]
pub struct StakingPolicy {
    config: StakingConfig,
}

impl StakingPolicy {
    pub fn new(config: StakingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Highest loss level before the overflow policy applies
    pub fn max_levels(&self) -> u32 {
        match &self.config.schedule {
            StakeSchedule::Multiplier { .. } => self.config.max_levels,
            StakeSchedule::Ladder { stakes } => stakes.len().saturating_sub(1) as u32,
        }
    }

    pub fn base_stake(&self) -> Decimal {
        match &self.config.schedule {
            StakeSchedule::Ladder { stakes } => stakes.first().copied().unwrap_or(self.config.base_stake),
            StakeSchedule::Multiplier { .. } => self.config.base_stake,
        }
    }

    /// State before any outcome
    pub fn initial(&self) -> StakingState {
        StakingState {
            current_stake: self.round(self.base_stake()),
            consecutive_losses: 0,
        }
    }

    /// Stake for a loss level, capped at `max_levels`
    pub fn stake_for_level(&self, level: u32) -> Result<Decimal> {
        let level = level.min(self.max_levels());
        let stake = match &self.config.schedule {
            StakeSchedule::Multiplier { multiplier } => {
                let mut stake = self.config.base_stake;
                for _ in 0..level {
                    stake = stake
                        .checked_mul(*multiplier)
                        .ok_or(EngineError::StakeOverflow(level))?;
                }
                stake
            }
            StakeSchedule::Ladder { stakes } => stakes
                .get(level as usize)
                .copied()
                .ok_or(EngineError::StakeOverflow(level))?,
        };

        let stake = self.round(stake);
        if stake <= Decimal::ZERO {
            return Err(EngineError::NonPositiveStake(stake));
        }
        Ok(stake)
    }

    /// Apply one outcome
    pub fn next(&self, state: &StakingState, outcome: Outcome) -> Result<StakeStep> {
        if outcome.is_win() {
            return Ok(StakeStep {
                state: self.initial(),
                reset: Some(ResetReason::Win),
            });
        }

        let losses = state.consecutive_losses.saturating_add(1);
        if losses <= self.max_levels() {
            return Ok(StakeStep {
                state: StakingState {
                    current_stake: self.stake_for_level(losses)?,
                    consecutive_losses: losses,
                },
                reset: None,
            });
        }

        match self.config.overflow {
            OverflowPolicy::ResetToBase => Ok(StakeStep {
                state: self.initial(),
                reset: Some(ResetReason::LevelCapExceeded),
            }),
            OverflowPolicy::HoldAtCap => Ok(StakeStep {
                state: StakingState {
                    current_stake: self.stake_for_level(self.max_levels())?,
                    consecutive_losses: losses,
                },
                reset: None,
            }),
        }
    }

    fn round(&self, stake: Decimal) -> Decimal {
        stake.round_dp_with_strategy(
            self.config.stake_precision,
            RoundingStrategy::MidpointAwayFromZero,
        )
    }
}

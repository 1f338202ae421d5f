//! Pattern and streak detectors
//!
//! Each detector sees one digit at a time per symbol and reports at most one
//! trigger for it. Mutual exclusion with outstanding decisions belongs to the
//! engine, so detectors never know whether their trigger was acted on.

pub mod frequency;
pub mod gap;
pub mod run_length;
pub mod sequence;

use crate::history::DigitHistory;
use crate::types::{Outcome, TriggerEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tick_feed::ContractKind;

pub use frequency::{FrequencyConfig, FrequencyDetector};
pub use gap::{GapConfig, GapDetector, MarkerSource};
pub use run_length::{DigitClass, RunLengthConfig, RunLengthDetector, RunRule, StreakState};
pub use sequence::{SequenceConfig, SequenceDetector, SequencePreset};

/// Everything a detector may look at for one digit
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub symbol: &'a str,
    pub digit: u8,
    /// Last two decimals of this quote (tens, units), when precision allows
    pub pair: Option<[u8; 2]>,
    pub sequence: u64,
    /// History for `symbol`, already holding `digit`
    pub history: &'a DigitHistory,
    /// Histories of every stream in the instance
    pub streams: &'a HashMap<String, DigitHistory>,
}

/// A trigger condition over the digit stream
pub trait Detector: Send + Sync {
    /// Short name used in logs and trigger payloads
    fn name(&self) -> &str;

    /// Observe one digit; returns a trigger when the condition holds
    fn on_digit(&mut self, ctx: &TickContext<'_>) -> Option<TriggerEvent>;

    /// Resolution of a decision this detector triggered on `symbol`.
    ///
    /// `rule` is the [`TriggerEvent::rule`] of the trigger that opened it.
    fn on_outcome(&mut self, _symbol: &str, _rule: Option<usize>, _outcome: Outcome) {}

    /// Digits of history needed before the detector can fire
    fn min_window(&self) -> usize {
        1
    }
}

/// Detector selection and parameters for an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    RunLength(RunLengthConfig),
    Sequence(SequenceConfig),
    Gap(GapConfig),
    Frequency(FrequencyConfig),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::RunLength(RunLengthConfig::default())
    }
}

impl StrategyConfig {
    /// Build the detector; `symbols` is the instance's configured order
    pub fn build(&self, symbols: &[String]) -> Box<dyn Detector> {
        match self {
            StrategyConfig::RunLength(c) => Box::new(RunLengthDetector::new(c.clone())),
            StrategyConfig::Sequence(c) => Box::new(SequenceDetector::new(c)),
            StrategyConfig::Gap(c) => Box::new(GapDetector::new(c.clone())),
            StrategyConfig::Frequency(c) => {
                Box::new(FrequencyDetector::new(c.clone(), symbols.to_vec()))
            }
        }
    }

    /// Every contract the detector can ask for
    pub fn contracts(&self) -> Vec<ContractKind> {
        match self {
            StrategyConfig::RunLength(c) => c.rules.iter().map(|r| r.contract).collect(),
            StrategyConfig::Sequence(c) => vec![c.contract],
            StrategyConfig::Gap(c) => vec![c.contract],
            StrategyConfig::Frequency(c) => vec![c.contract],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::RunLength(_) => "run_length",
            StrategyConfig::Sequence(_) => "sequence",
            StrategyConfig::Gap(_) => "gap",
            StrategyConfig::Frequency(_) => "frequency",
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Feeds digits for one or more symbols through a detector
    pub struct Feed {
        pub streams: HashMap<String, DigitHistory>,
        sequences: HashMap<String, u64>,
        capacity: usize,
    }

    impl Feed {
        pub fn new(capacity: usize) -> Self {
            Self {
                streams: HashMap::new(),
                sequences: HashMap::new(),
                capacity,
            }
        }

        pub fn push_pair(
            &mut self,
            detector: &mut dyn Detector,
            symbol: &str,
            digit: u8,
            pair: Option<[u8; 2]>,
        ) -> Option<TriggerEvent> {
            let capacity = self.capacity;
            self.streams
                .entry(symbol.to_string())
                .or_insert_with(|| DigitHistory::new(capacity))
                .push(digit);
            let seq = self.sequences.entry(symbol.to_string()).or_insert(0);
            *seq += 1;
            let sequence = *seq;

            let ctx = TickContext {
                symbol,
                digit,
                pair,
                sequence,
                history: &self.streams[symbol],
                streams: &self.streams,
            };
            detector.on_digit(&ctx)
        }

        pub fn push(
            &mut self,
            detector: &mut dyn Detector,
            symbol: &str,
            digit: u8,
        ) -> Option<TriggerEvent> {
            self.push_pair(detector, symbol, digit, None)
        }
    }
}

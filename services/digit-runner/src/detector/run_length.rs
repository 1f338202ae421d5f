//! Consecutive-run detector (odd, even or digit-set runs)

use super::{Detector, TickContext};
use crate::types::{Outcome, TriggerEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tick_feed::ContractKind;
use tracing::debug;

/// Digits a run is made of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitClass {
    Odd,
    Even,
    Set(Vec<u8>),
}

impl DigitClass {
    pub fn contains(&self, digit: u8) -> bool {
        match self {
            DigitClass::Odd => digit % 2 == 1,
            DigitClass::Even => digit % 2 == 0,
            DigitClass::Set(digits) => digits.contains(&digit),
        }
    }
}

/// A run class and the contract to buy when its run reaches the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRule {
    pub class: DigitClass,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    pub contract: ContractKind,
    #[serde(default)]
    pub barrier: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLengthConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<RunRule>,
}

impl Default for RunLengthConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

fn default_threshold() -> usize { 3 }

/// Three odds buy even, three evens buy odd
fn default_rules() -> Vec<RunRule> {
    vec![
        RunRule {
            class: DigitClass::Odd,
            threshold: default_threshold(),
            contract: ContractKind::DigitEven,
            barrier: None,
        },
        RunRule {
            class: DigitClass::Even,
            threshold: default_threshold(),
            contract: ContractKind::DigitOdd,
            barrier: None,
        },
    ]
}

/// Run tracking for one class on one symbol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreakState {
    pub run_length: usize,
    pub triggered: bool,
    pub broken_by_loss: bool,
}

impl StreakState {
    fn reset(&mut self) {
        *self = StreakState::default();
    }
}

pub struct RunLengthDetector {
    config: RunLengthConfig,
    /// Per symbol, one state per rule
    streaks: HashMap<String, Vec<StreakState>>,
}

impl RunLengthDetector {
    pub fn new(config: RunLengthConfig) -> Self {
        Self {
            config,
            streaks: HashMap::new(),
        }
    }

    pub fn streaks(&self, symbol: &str) -> Option<&[StreakState]> {
        self.streaks.get(symbol).map(Vec::as_slice)
    }
}

impl Detector for RunLengthDetector {
    fn name(&self) -> &str {
        "run_length"
    }

    fn on_digit(&mut self, ctx: &TickContext<'_>) -> Option<TriggerEvent> {
        let rules = &self.config.rules;
        let streaks = self
            .streaks
            .entry(ctx.symbol.to_string())
            .or_insert_with(|| vec![StreakState::default(); rules.len()]);

        let mut fired = None;
        for (idx, (rule, streak)) in rules.iter().zip(streaks.iter_mut()).enumerate() {
            if !rule.class.contains(ctx.digit) {
                streak.reset();
                continue;
            }

            streak.run_length += 1;
            if streak.run_length >= rule.threshold
                && !streak.triggered
                && !streak.broken_by_loss
                && fired.is_none()
            {
                streak.triggered = true;
                fired = Some(idx);
            }
        }

        let idx = fired?;
        let rule = &rules[idx];
        debug!(
            "{} run of {:?} reached {} on {}",
            ctx.symbol, rule.class, rule.threshold, ctx.digit
        );

        Some(TriggerEvent::new(ctx.symbol, rule.contract, rule.barrier, self.name()).with_rule(idx))
    }

    fn on_outcome(&mut self, symbol: &str, rule: Option<usize>, outcome: Outcome) {
        let Some(idx) = rule else {
            return;
        };
        let Some(streak) = self.streaks.get_mut(symbol).and_then(|s| s.get_mut(idx)) else {
            return;
        };

        match outcome {
            // A win starts the count over, so a continuing run can fire again
            Outcome::Win => streak.reset(),
            // A loss keeps the run open but silent until it breaks
            Outcome::Loss => {
                if streak.run_length > 0 {
                    streak.broken_by_loss = true;
                }
            }
        }
    }

    fn min_window(&self) -> usize {
        self.config
            .rules
            .iter()
            .map(|r| r.threshold)
            .max()
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::Feed;

    fn odd_only() -> RunLengthConfig {
        RunLengthConfig {
            rules: vec![RunRule {
                class: DigitClass::Odd,
                threshold: 3,
                contract: ContractKind::DigitEven,
                barrier: None,
            }],
        }
    }

    #[test]
    fn test_fires_once_per_run() {
        let mut detector = RunLengthDetector::new(odd_only());
        let mut feed = Feed::new(10);

        let fired: Vec<usize> = [1, 3, 5, 2, 7, 9, 1]
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| feed.push(&mut detector, "R_10", d).map(|_| i))
            .collect();

        // Index 2 completes the first run; 2 breaks it; 7, 9, 1 is a new run
        assert_eq!(fired, vec![2, 6]);
    }

    #[test]
    fn test_no_retrigger_while_run_continues() {
        let mut detector = RunLengthDetector::new(odd_only());
        let mut feed = Feed::new(10);

        let trigger = feed.push(&mut detector, "R_10", 1);
        assert!(trigger.is_none());
        feed.push(&mut detector, "R_10", 3);
        let trigger = feed.push(&mut detector, "R_10", 5).unwrap();
        assert_eq!(trigger.contract, ContractKind::DigitEven);
        assert_eq!(trigger.symbol, "R_10");

        for d in [7, 9, 1, 3] {
            assert!(feed.push(&mut detector, "R_10", d).is_none());
        }
        assert_eq!(detector.streaks("R_10").unwrap()[0].run_length, 7);
    }

    #[test]
    fn test_win_restarts_count() {
        let mut detector = RunLengthDetector::new(odd_only());
        let mut feed = Feed::new(10);

        for d in [1, 3, 5] {
            feed.push(&mut detector, "R_10", d);
        }
        detector.on_outcome("R_10", Some(0), Outcome::Win);

        assert!(feed.push(&mut detector, "R_10", 7).is_none());
        assert!(feed.push(&mut detector, "R_10", 9).is_none());
        assert!(feed.push(&mut detector, "R_10", 1).is_some());
    }

    #[test]
    fn test_loss_keeps_run_silent_until_broken() {
        let mut detector = RunLengthDetector::new(odd_only());
        let mut feed = Feed::new(10);

        for d in [1, 3, 5] {
            feed.push(&mut detector, "R_10", d);
        }
        detector.on_outcome("R_10", Some(0), Outcome::Loss);
        assert!(detector.streaks("R_10").unwrap()[0].broken_by_loss);

        for d in [7, 9, 1] {
            assert!(feed.push(&mut detector, "R_10", d).is_none());
        }

        // Breaking the run clears the loss flag
        feed.push(&mut detector, "R_10", 2);
        assert_eq!(detector.streaks("R_10").unwrap()[0], StreakState::default());
        for d in [1, 3] {
            assert!(feed.push(&mut detector, "R_10", d).is_none());
        }
        assert!(feed.push(&mut detector, "R_10", 5).is_some());
    }

    #[test]
    fn test_outcome_applies_to_its_own_rule() {
        let mut detector = RunLengthDetector::new(RunLengthConfig::default());
        let mut feed = Feed::new(10);

        let odd = [1, 3, 5]
            .iter()
            .filter_map(|&d| feed.push(&mut detector, "R_10", d))
            .last()
            .unwrap();
        let even = [2, 4, 6]
            .iter()
            .filter_map(|&d| feed.push(&mut detector, "R_10", d))
            .last()
            .unwrap();
        assert_eq!(odd.rule, Some(0));
        assert_eq!(even.rule, Some(1));

        // The odd decision settles while the even run is still going
        detector.on_outcome("R_10", odd.rule, Outcome::Win);
        assert!(detector.streaks("R_10").unwrap()[1].triggered);
        for d in [8, 0, 2] {
            assert!(feed.push(&mut detector, "R_10", d).is_none());
        }

        // Outcomes without a rule are ignored
        detector.on_outcome("R_10", None, Outcome::Loss);
        assert!(!detector.streaks("R_10").unwrap()[1].broken_by_loss);
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut detector = RunLengthDetector::new(odd_only());
        let mut feed = Feed::new(10);

        feed.push(&mut detector, "R_10", 1);
        feed.push(&mut detector, "R_25", 1);
        feed.push(&mut detector, "R_10", 3);
        feed.push(&mut detector, "R_25", 2);
        assert!(feed.push(&mut detector, "R_10", 5).is_some());
        assert!(feed.push(&mut detector, "R_25", 3).is_none());
    }

    #[test]
    fn test_set_class_and_default_rules() {
        let config = RunLengthConfig {
            rules: vec![RunRule {
                class: DigitClass::Set(vec![4, 5]),
                threshold: 2,
                contract: ContractKind::DigitOver,
                barrier: Some(5),
            }],
        };
        let mut detector = RunLengthDetector::new(config);
        let mut feed = Feed::new(10);

        assert!(feed.push(&mut detector, "R_50", 4).is_none());
        let trigger = feed.push(&mut detector, "R_50", 5).unwrap();
        assert_eq!(trigger.contract, ContractKind::DigitOver);
        assert_eq!(trigger.barrier, Some(5));

        // Even runs map to DIGITODD by default
        let mut detector = RunLengthDetector::new(RunLengthConfig::default());
        let mut feed = Feed::new(10);
        feed.push(&mut detector, "R_10", 2);
        feed.push(&mut detector, "R_10", 4);
        let trigger = feed.push(&mut detector, "R_10", 6).unwrap();
        assert_eq!(trigger.contract, ContractKind::DigitOdd);
        assert_eq!(detector.min_window(), 3);
    }
}

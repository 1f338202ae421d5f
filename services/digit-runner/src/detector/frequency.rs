//! Cross-stream digit-frequency match detector

use super::{Detector, TickContext};
use crate::history::DigitHistory;
use crate::types::TriggerEvent;
use serde::{Deserialize, Serialize};
use tick_feed::ContractKind;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyConfig {
    /// Digits each window must hold before it takes part in a match
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_contract")]
    pub contract: ContractKind,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            contract: default_contract(),
        }
    }
}

fn default_min_samples() -> usize { 50 }
fn default_contract() -> ContractKind { ContractKind::DigitDiff }

pub struct FrequencyDetector {
    config: FrequencyConfig,
    /// Partner search order
    symbols: Vec<String>,
}

impl FrequencyDetector {
    pub fn new(config: FrequencyConfig, symbols: Vec<String>) -> Self {
        Self { config, symbols }
    }

    fn ready(&self, history: &DigitHistory) -> bool {
        history.len() >= self.config.min_samples.max(1)
    }
}

impl Detector for FrequencyDetector {
    fn name(&self) -> &str {
        "frequency"
    }

    fn on_digit(&mut self, ctx: &TickContext<'_>) -> Option<TriggerEvent> {
        if !self.ready(ctx.history) {
            return None;
        }

        let (highest, lowest) = ctx.history.extremes()?;
        if ctx.digit != highest {
            return None;
        }

        let partner = self.symbols.iter().find(|other| {
            if other.as_str() == ctx.symbol {
                return false;
            }
            let Some(history) = ctx.streams.get(other.as_str()) else {
                return false;
            };
            self.ready(history)
                && history.extremes() == Some((highest, lowest))
                && history.latest() == Some(highest)
        })?;

        debug!(
            "{} pairs with {}: highest {} lowest {}",
            ctx.symbol, partner, highest, lowest
        );

        Some(
            TriggerEvent::new(ctx.symbol, self.config.contract, Some(lowest), self.name())
                .with_partner(partner.clone()),
        )
    }

    fn min_window(&self) -> usize {
        self.config.min_samples.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::Feed;

    fn symbols() -> Vec<String> {
        vec!["R_10".to_string(), "R_25".to_string(), "R_50".to_string()]
    }

    fn detector(min_samples: usize) -> FrequencyDetector {
        FrequencyDetector::new(
            FrequencyConfig {
                min_samples,
                contract: ContractKind::DigitDiff,
            },
            symbols(),
        )
    }

    /// Seven 7s, one of 1-6 and 8-9 each; 0 never appears
    fn seed(feed: &mut Feed, detector: &mut FrequencyDetector, symbol: &str) {
        for d in [7, 1, 7, 2, 7, 3, 7, 4, 7, 5, 7, 6, 7, 8, 9] {
            feed.push(detector, symbol, d);
        }
    }

    #[test]
    fn test_pair_match() {
        let mut detector = detector(10);
        let mut feed = Feed::new(100);

        seed(&mut feed, &mut detector, "R_10");
        seed(&mut feed, &mut detector, "R_25");

        // Partner's live digit is 9, not its most frequent
        assert!(feed.push(&mut detector, "R_10", 7).is_none());

        let trigger = feed.push(&mut detector, "R_25", 7).unwrap();
        assert_eq!(trigger.symbol, "R_25");
        assert_eq!(trigger.partner.as_deref(), Some("R_10"));
        assert_eq!(trigger.contract, ContractKind::DigitDiff);
        assert_eq!(trigger.barrier, Some(0));
    }

    #[test]
    fn test_needs_min_samples() {
        let mut detector = detector(50);
        let mut feed = Feed::new(100);

        seed(&mut feed, &mut detector, "R_10");
        seed(&mut feed, &mut detector, "R_25");
        feed.push(&mut detector, "R_10", 7);
        assert!(feed.push(&mut detector, "R_25", 7).is_none());
    }

    #[test]
    fn test_mismatched_extremes() {
        let mut detector = detector(10);
        let mut feed = Feed::new(100);

        seed(&mut feed, &mut detector, "R_10");
        for d in [3, 1, 3, 2, 3, 0, 3, 4, 3, 5, 3, 6, 3, 8, 9] {
            feed.push(&mut detector, "R_50", d);
        }
        feed.push(&mut detector, "R_10", 7);
        assert!(feed.push(&mut detector, "R_50", 3).is_none());
    }
}

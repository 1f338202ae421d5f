//! Fixed digit-sequence lookup detector

use super::{Detector, TickContext};
use crate::types::TriggerEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tick_feed::ContractKind;
use tracing::debug;

/// Built-in pattern tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePreset {
    /// Three identical digits predict that digit again
    Triples,
}

impl SequencePreset {
    pub fn table(self) -> BTreeMap<String, u8> {
        match self {
            SequencePreset::Triples => (0..10u8)
                .map(|d| (d.to_string().repeat(3), d))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default)]
    pub preset: Option<SequencePreset>,
    /// Digit-string key (most recent last) to predicted digit
    #[serde(default)]
    pub table: BTreeMap<String, u8>,
    #[serde(default = "default_contract")]
    pub contract: ContractKind,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            preset: Some(SequencePreset::Triples),
            table: BTreeMap::new(),
            contract: default_contract(),
        }
    }
}

impl SequenceConfig {
    /// Preset entries overlaid with the explicit table
    pub fn resolved_table(&self) -> BTreeMap<String, u8> {
        let mut table = self.preset.map(SequencePreset::table).unwrap_or_default();
        table.extend(self.table.iter().map(|(k, v)| (k.clone(), *v)));
        table
    }

    /// Shared key length, or a description of what is wrong with the table
    pub fn key_length(&self) -> Result<usize, String> {
        let table = self.resolved_table();
        let mut lengths = table.keys().map(String::len);
        let first = lengths
            .next()
            .ok_or_else(|| "sequence table is empty".to_string())?;

        if first == 0 || lengths.any(|len| len != first) {
            return Err("sequence keys must all have the same non-zero length".to_string());
        }
        if let Some(key) = table.keys().find(|k| !k.bytes().all(|b| b.is_ascii_digit())) {
            return Err(format!("sequence key {:?} contains non-digits", key));
        }
        if let Some((key, _)) = table.iter().find(|(_, v)| **v > 9) {
            return Err(format!("sequence key {:?} maps to a non-digit", key));
        }
        Ok(first)
    }
}

fn default_contract() -> ContractKind { ContractKind::DigitMatch }

pub struct SequenceDetector {
    table: HashMap<Vec<u8>, u8>,
    key_len: usize,
    contract: ContractKind,
}

impl SequenceDetector {
    /// Keys that fail validation are skipped; config validation rejects them first
    pub fn new(config: &SequenceConfig) -> Self {
        let resolved = config.resolved_table();
        let key_len = config.key_length().unwrap_or(0);

        let table = resolved
            .into_iter()
            .filter(|(k, _)| k.len() == key_len)
            .filter_map(|(k, v)| {
                k.bytes()
                    .map(|b| b.is_ascii_digit().then(|| b - b'0'))
                    .collect::<Option<Vec<u8>>>()
                    .map(|key| (key, v))
            })
            .collect();

        Self {
            table,
            key_len,
            contract: config.contract,
        }
    }
}

impl Detector for SequenceDetector {
    fn name(&self) -> &str {
        "sequence"
    }

    fn on_digit(&mut self, ctx: &TickContext<'_>) -> Option<TriggerEvent> {
        if self.key_len == 0 || ctx.history.len() < self.key_len {
            return None;
        }

        let key = ctx.history.last(self.key_len);
        let predicted = *self.table.get(&key)?;
        debug!("{} sequence {:?} predicts {}", ctx.symbol, key, predicted);

        Some(TriggerEvent::new(
            ctx.symbol,
            self.contract,
            Some(predicted),
            self.name(),
        ))
    }

    fn min_window(&self) -> usize {
        self.key_len.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::Feed;

    fn table(entries: &[(&str, u8)]) -> SequenceConfig {
        SequenceConfig {
            preset: None,
            table: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            contract: ContractKind::DigitMatch,
        }
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let config = table(&[("012", 3)]);
        let mut detector = SequenceDetector::new(&config);
        let mut feed = Feed::new(10);

        feed.push(&mut detector, "R_10", 0);
        feed.push(&mut detector, "R_10", 1);
        let trigger = feed.push(&mut detector, "R_10", 2).unwrap();
        assert_eq!(trigger.contract, ContractKind::DigitMatch);
        assert_eq!(trigger.barrier, Some(3));

        let mut detector = SequenceDetector::new(&config);
        let mut feed = Feed::new(10);
        feed.push(&mut detector, "R_10", 0);
        feed.push(&mut detector, "R_10", 1);
        assert!(feed.push(&mut detector, "R_10", 3).is_none());
    }

    #[test]
    fn test_needs_full_window() {
        let config = table(&[("01234", 5)]);
        let mut detector = SequenceDetector::new(&config);
        let mut feed = Feed::new(10);

        for d in [1, 2, 3] {
            assert!(feed.push(&mut detector, "R_100", d).is_none());
        }
        assert!(feed.push(&mut detector, "R_100", 4).is_none());
        assert_eq!(detector.min_window(), 5);
    }

    #[test]
    fn test_triples_preset() {
        let config = SequenceConfig::default();
        assert_eq!(config.key_length(), Ok(3));

        let mut detector = SequenceDetector::new(&config);
        let mut feed = Feed::new(5);
        feed.push(&mut detector, "1HZ10V", 7);
        feed.push(&mut detector, "1HZ10V", 7);
        let trigger = feed.push(&mut detector, "1HZ10V", 7).unwrap();
        assert_eq!(trigger.barrier, Some(7));
    }

    #[test]
    fn test_key_validation() {
        assert!(table(&[("012", 3), ("01", 2)]).key_length().is_err());
        assert!(table(&[("0a2", 3)]).key_length().is_err());
        assert!(table(&[("012", 12)]).key_length().is_err());
        assert!(table(&[]).key_length().is_err());
    }
}

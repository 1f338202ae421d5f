//! Gap-since-marker detector

use super::{Detector, TickContext};
use crate::types::TriggerEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tick_feed::ContractKind;
use tracing::debug;

/// Where the two marker digits are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSource {
    /// Last two decimals of a single quote
    #[default]
    Quote,
    /// Last digits of two consecutive ticks
    Consecutive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapConfig {
    /// Two-digit marker patterns such as "45"
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
    #[serde(default)]
    pub marker_source: MarkerSource,
    /// Fires once the gap strictly exceeds this many ticks
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    /// Live digit must be one of these
    #[serde(default = "default_trigger_digits")]
    pub trigger_digits: Vec<u8>,
    /// No trigger until a marker has been seen
    #[serde(default = "default_require_marker")]
    pub require_marker: bool,
    #[serde(default = "default_contract")]
    pub contract: ContractKind,
    #[serde(default = "default_barrier")]
    pub barrier: Option<u8>,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            marker_source: MarkerSource::default(),
            threshold: default_threshold(),
            trigger_digits: default_trigger_digits(),
            require_marker: default_require_marker(),
            contract: default_contract(),
            barrier: default_barrier(),
        }
    }
}

impl GapConfig {
    /// Markers as digit pairs; `None` if any marker is not exactly two digits
    pub fn marker_pairs(&self) -> Option<Vec<[u8; 2]>> {
        self.markers
            .iter()
            .map(|m| match m.as_bytes() {
                [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => Some([a - b'0', b - b'0']),
                _ => None,
            })
            .collect()
    }
}

fn default_markers() -> Vec<String> { vec!["45".to_string(), "54".to_string()] }
fn default_threshold() -> u64 { 10 }
fn default_trigger_digits() -> Vec<u8> { vec![4, 5] }
fn default_require_marker() -> bool { true }
fn default_contract() -> ContractKind { ContractKind::DigitUnder }
fn default_barrier() -> Option<u8> { Some(4) }

#[derive(Debug, Default)]
struct GapState {
    /// Ticks seen on this symbol, 1-based
    index: u64,
    last_marker: Option<u64>,
}

pub struct GapDetector {
    config: GapConfig,
    markers: Vec<[u8; 2]>,
    states: HashMap<String, GapState>,
}

impl GapDetector {
    pub fn new(config: GapConfig) -> Self {
        let markers = config.marker_pairs().unwrap_or_default();
        Self {
            config,
            markers,
            states: HashMap::new(),
        }
    }

    /// Ticks strictly between the last marker and the latest tick
    pub fn gap(&self, symbol: &str) -> Option<u64> {
        let state = self.states.get(symbol)?;
        let marker = state.last_marker?;
        (state.index - marker).checked_sub(1)
    }

    fn marker_at(&self, ctx: &TickContext<'_>) -> Option<[u8; 2]> {
        match self.config.marker_source {
            MarkerSource::Quote => ctx.pair,
            MarkerSource::Consecutive => match ctx.history.last(2)[..] {
                [prev, cur] => Some([prev, cur]),
                _ => None,
            },
        }
    }
}

impl Detector for GapDetector {
    fn name(&self) -> &str {
        "gap"
    }

    fn on_digit(&mut self, ctx: &TickContext<'_>) -> Option<TriggerEvent> {
        let is_marker = self
            .marker_at(ctx)
            .map_or(false, |pair| self.markers.contains(&pair));

        let state = self.states.entry(ctx.symbol.to_string()).or_default();
        state.index += 1;
        if is_marker {
            debug!("{} marker at tick {}", ctx.symbol, state.index);
            state.last_marker = Some(state.index);
            return None;
        }

        let gap = match state.last_marker {
            Some(marker) => state.index - marker - 1,
            None if self.config.require_marker => return None,
            None => u64::MAX,
        };

        if gap <= self.config.threshold || !self.config.trigger_digits.contains(&ctx.digit) {
            return None;
        }

        debug!("{} gap of {} ticks on digit {}", ctx.symbol, gap, ctx.digit);
        Some(TriggerEvent::new(
            ctx.symbol,
            self.config.contract,
            self.config.barrier,
            self.name(),
        ))
    }

    fn min_window(&self) -> usize {
        match self.config.marker_source {
            MarkerSource::Quote => 1,
            MarkerSource::Consecutive => 2,
        }
    }
}

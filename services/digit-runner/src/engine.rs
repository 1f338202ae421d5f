//! Decision engine
//!
//! Wires digit extraction, history, the detector, staking and the termination
//! guard into one synchronous state machine per instance. Each decision slot
//! (a symbol, the single global slot, or one leg of a hedged pair) moves
//! `Idle -> AwaitingSettlement -> Idle`; the engine as a whole ends in
//! `Stopped`.
//!
//! The engine never performs I/O. Every input returns the actions the caller
//! must carry out, in order.

use crate::config::{InstanceConfig, PendingScope, SettlementSource};
use crate::detector::{Detector, TickContext};
use crate::digit::{self, ExtractionMode};
use crate::guard::TerminationGuard;
use crate::hedge::{HedgeLeg, LinkedLadder};
use crate::history::DigitHistory;
use crate::profit::ProfitState;
use crate::staking::{ResetReason, StakeStep, StakingPolicy, StakingState};
use crate::types::{Outcome, StopReason, TriggerEvent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tick_feed::{ContractKind, ContractStatus, Settlement, Tick, TickHistory, TradeRequest};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Slot key used when all symbols share one outstanding decision
pub const GLOBAL_SLOT: &str = "*";

/// Resolved contract ids remembered for duplicate detection
const RESOLVED_MEMORY: usize = 10_000;

/// Work the caller must do after feeding the engine an input
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Send this request to the venue
    PlaceTrade(TradeRequest),
    /// A decision resolved; journal it
    Resolved(ResolvedDecision),
    /// Stop the feed and close the venue; emitted once
    Terminate(StopReason),
}

/// A placed decision waiting for its outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingDecision {
    pub decision_id: Uuid,
    pub symbol: String,
    pub contract: ContractKind,
    pub barrier: Option<u8>,
    pub stake: Decimal,
    pub placed_at_sequence: u64,
    pub placed_at: DateTime<Utc>,
    /// Set once the venue acknowledges the buy
    pub contract_id: Option<String>,
    /// Exit digit seen before the ack arrived (next-tick settlement)
    pub observed_exit: Option<u8>,
    pub detector: String,
    pub partner: Option<String>,
    /// Detector rule that fired, returned to the detector on resolution
    pub rule: Option<usize>,
    /// Leg and shared round when trading as a hedged pair
    pub leg: Option<HedgeLeg>,
    pub round: Option<usize>,
}

/// Journal record for a resolved decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDecision {
    pub decision_id: Uuid,
    pub contract_id: Option<String>,
    pub symbol: String,
    pub contract: ContractKind,
    pub barrier: Option<u8>,
    pub stake: Decimal,
    pub outcome: Outcome,
    pub profit: Decimal,
    pub exit_digit: Option<u8>,
    pub cumulative_profit: Decimal,
    pub next_stake: Decimal,
    pub consecutive_losses: u32,
    pub stake_reset: Option<ResetReason>,
    pub detector: String,
    pub leg: Option<HedgeLeg>,
    pub round: Option<usize>,
    pub resolved_at: DateTime<Utc>,
}

/// Externally visible state of one decision slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    AwaitingSettlement,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum EngineStatus {
    Running,
    Stopped(StopReason),
}

#[derive(Debug, Clone)]
struct Slot {
    staking: StakingState,
    pending: Option<PendingDecision>,
    leg: Option<HedgeLeg>,
}

impl Slot {
    fn new(staking: StakingState, leg: Option<HedgeLeg>) -> Self {
        Self {
            staking,
            pending: None,
            leg,
        }
    }
}

/// Serializable view of the engine for state snapshots
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub instance: String,
    pub status: EngineStatus,
    pub profit: ProfitState,
    pub win_rate: Decimal,
    /// Shared round of a hedged pair
    pub hedge_round: Option<usize>,
    pub slots: Vec<SlotSnapshot>,
    /// Most recent digits per symbol, oldest first
    pub recent_digits: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub slot: String,
    pub state: SlotState,
    pub staking: StakingState,
    pub pending: Option<PendingDecision>,
}

pub struct Engine {
    name: String,
    precisions: HashMap<String, u32>,
    extraction: ExtractionMode,
    scope: PendingScope,
    settlement: SettlementSource,
    payout_ratio: Decimal,
    duration_ticks: u32,
    currency: String,
    streams: HashMap<String, DigitHistory>,
    last_sequence: HashMap<String, u64>,
    detector: Box<dyn Detector>,
    policy: StakingPolicy,
    hedge: Option<LinkedLadder>,
    hedge_round: usize,
    guard: TerminationGuard,
    slots: BTreeMap<String, Slot>,
    profit: ProfitState,
    resolved: HashSet<String>,
    resolved_order: VecDeque<String>,
    status: EngineStatus,
}

impl Engine {
    /// Build an engine from a validated instance config
    pub fn new(config: &InstanceConfig) -> Self {
        let symbols = config.symbol_names();
        let detector = config.strategy.build(&symbols);
        Self::with_detector(config, detector)
    }

    /// Build an engine around a custom detector
    pub fn with_detector(config: &InstanceConfig, detector: Box<dyn Detector>) -> Self {
        let policy = StakingPolicy::new(config.staking.clone());
        let initial = policy.initial();
        let hedge = config.hedge.clone().map(LinkedLadder::new);

        let mut slots = BTreeMap::new();
        match (config.pending_scope, &hedge) {
            (PendingScope::Global, _) => {
                slots.insert(GLOBAL_SLOT.to_string(), Slot::new(initial, None));
            }
            (PendingScope::PerSymbol, Some(ladder)) => {
                for symbol in config.symbol_names() {
                    for leg in HedgeLeg::ALL {
                        let staking = StakingState {
                            current_stake: ladder.stake(leg, 0),
                            consecutive_losses: 0,
                        };
                        slots.insert(leg.slot(&symbol), Slot::new(staking, Some(leg)));
                    }
                }
            }
            (PendingScope::PerSymbol, None) => {
                for symbol in config.symbol_names() {
                    slots.insert(symbol, Slot::new(initial.clone(), None));
                }
            }
        }

        let streams = config
            .symbols
            .iter()
            .map(|s| (s.symbol.clone(), DigitHistory::new(config.history_capacity)))
            .collect();

        Self {
            name: config.name.clone(),
            precisions: config
                .symbols
                .iter()
                .map(|s| (s.symbol.clone(), s.precision))
                .collect(),
            extraction: config.extraction,
            scope: config.pending_scope,
            settlement: config.settlement,
            payout_ratio: config.payout_ratio,
            duration_ticks: config.duration_ticks,
            currency: config.currency.clone(),
            streams,
            last_sequence: HashMap::new(),
            detector,
            policy,
            hedge,
            hedge_round: 0,
            guard: TerminationGuard::new(config.limits.clone()),
            slots,
            profit: ProfitState::default(),
            resolved: HashSet::new(),
            resolved_order: VecDeque::new(),
            status: EngineStatus::Running,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.status, EngineStatus::Stopped(_))
    }

    pub fn profit(&self) -> &ProfitState {
        &self.profit
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn history(&self, symbol: &str) -> Option<&DigitHistory> {
        self.streams.get(symbol)
    }

    /// Staking state of the slot `symbol` trades in (the follow leg when hedged)
    pub fn staking(&self, symbol: &str) -> Option<&StakingState> {
        let key = self.slot_keys(symbol).into_iter().next()?;
        self.slots.get(&key).map(|s| &s.staking)
    }

    /// Staking state of one leg of a hedged pair
    pub fn leg_staking(&self, symbol: &str, leg: HedgeLeg) -> Option<&StakingState> {
        self.slots.get(&leg.slot(symbol)).map(|s| &s.staking)
    }

    /// Shared round of a hedged instance
    pub fn hedge_round(&self) -> Option<usize> {
        self.hedge.as_ref().map(|_| self.hedge_round)
    }

    /// State of the slots `symbol` trades in; awaiting if any is outstanding
    pub fn slot_state(&self, symbol: &str) -> SlotState {
        let awaiting = self
            .slot_keys(symbol)
            .iter()
            .filter_map(|key| self.slots.get(key))
            .any(|slot| slot.pending.is_some());
        match awaiting {
            true => SlotState::AwaitingSettlement,
            false if self.is_stopped() => SlotState::Stopped,
            false => SlotState::Idle,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingDecision> {
        self.slots.values().filter_map(|s| s.pending.as_ref())
    }

    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    /// Slots a trigger on `symbol` opens decisions in
    fn slot_keys(&self, symbol: &str) -> Vec<String> {
        match (self.scope, &self.hedge) {
            (PendingScope::Global, _) => vec![GLOBAL_SLOT.to_string()],
            (PendingScope::PerSymbol, Some(_)) => {
                HedgeLeg::ALL.iter().map(|leg| leg.slot(symbol)).collect()
            }
            (PendingScope::PerSymbol, None) => vec![symbol.to_string()],
        }
    }

    /// Fill a stream from venue history without consulting the detector.
    ///
    /// Only streams that have not seen a live tick yet are seeded, so digits
    /// stay in arrival order. Returns the number of digits added.
    pub fn seed_history(&mut self, history: &TickHistory) -> usize {
        let symbol = history.symbol.as_str();
        let Some(&precision) = self.precisions.get(symbol) else {
            debug!("Ignoring history for untracked symbol {}", symbol);
            return 0;
        };
        if self.last_sequence.contains_key(symbol) {
            info!("[{}] {} is already live, skipping history", self.name, symbol);
            return 0;
        }
        let Some(stream) = self.streams.get_mut(symbol) else {
            return 0;
        };

        let mut seeded = 0;
        let mut last = None;
        for tick in &history.ticks {
            if last.map_or(false, |l| tick.sequence <= l) {
                continue;
            }
            match digit::extract(tick.quote, precision, self.extraction) {
                Ok(digit) => {
                    stream.push(digit);
                    seeded += 1;
                    last = Some(tick.sequence);
                }
                Err(e) => warn!("Skipping historical quote {} for {}: {}", tick.quote, symbol, e),
            }
        }

        // Live ticks replaying the tail of the history are dropped as stale
        if let Some(last) = last {
            self.last_sequence.insert(symbol.to_string(), last);
        }
        info!("[{}] Seeded {} with {} historical digits", self.name, symbol, seeded);
        seeded
    }

    /// Feed one tick
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<EngineAction> {
        let Some(&precision) = self.precisions.get(&tick.symbol) else {
            debug!("Ignoring tick for untracked symbol {}", tick.symbol);
            return Vec::new();
        };

        if let Some(&last) = self.last_sequence.get(&tick.symbol) {
            if tick.sequence <= last {
                debug!(
                    "Dropping stale tick {} for {} (last {})",
                    tick.sequence, tick.symbol, last
                );
                return Vec::new();
            }
        }
        self.last_sequence.insert(tick.symbol.clone(), tick.sequence);

        let (digit, pair) = match (
            digit::extract(tick.quote, precision, self.extraction),
            digit::extract_pair(tick.quote, precision, self.extraction),
        ) {
            (Ok(d), Ok(p)) => (d, p),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Cannot extract digit from {} {}: {}", tick.symbol, tick.quote, e);
                return Vec::new();
            }
        };

        if let Some(history) = self.streams.get_mut(&tick.symbol) {
            history.push(digit);
        }

        let mut actions = Vec::new();

        if !self.is_stopped() {
            let trigger = self.streams.get(&tick.symbol).and_then(|history| {
                let ctx = TickContext {
                    symbol: &tick.symbol,
                    digit,
                    pair,
                    sequence: tick.sequence,
                    history,
                    streams: &self.streams,
                };
                self.detector.on_digit(&ctx)
            });

            if let Some(trigger) = trigger {
                for key in self.slot_keys(&trigger.symbol) {
                    actions.extend(self.open_decision(&key, &trigger, tick.sequence));
                }
            }
        }

        if self.settlement == SettlementSource::NextTick {
            actions.extend(self.observe_exit(&tick.symbol, tick.sequence, digit));
        }

        actions
    }

    fn open_decision(
        &mut self,
        key: &str,
        trigger: &TriggerEvent,
        sequence: u64,
    ) -> Option<EngineAction> {
        let slot = self.slots.get_mut(key)?;

        if let Some(pending) = &slot.pending {
            debug!(
                "Dropping {} trigger on {}: decision {} outstanding on {}",
                trigger.detector, trigger.symbol, pending.decision_id, pending.symbol
            );
            return None;
        }

        let stake = slot.staking.current_stake;
        if stake <= Decimal::ZERO {
            debug_assert!(false, "non-positive stake {}", stake);
            warn!("Refusing to trade non-positive stake {} on {}", stake, trigger.symbol);
            return None;
        }

        let contract = match slot.leg {
            Some(leg) => leg.contract(trigger.contract)?,
            None => trigger.contract,
        };

        let pending = PendingDecision {
            decision_id: Uuid::new_v4(),
            symbol: trigger.symbol.clone(),
            contract,
            barrier: trigger.barrier,
            stake,
            placed_at_sequence: sequence,
            placed_at: Utc::now(),
            contract_id: None,
            observed_exit: None,
            detector: trigger.detector.clone(),
            partner: trigger.partner.clone(),
            rule: trigger.rule,
            leg: slot.leg,
            round: slot.leg.map(|_| self.hedge_round),
        };

        let request = TradeRequest {
            decision_id: pending.decision_id,
            symbol: pending.symbol.clone(),
            contract: pending.contract,
            barrier: pending.barrier,
            stake,
            duration_ticks: self.duration_ticks,
            currency: self.currency.clone(),
        };

        info!(
            "[{}] {}{} on {} barrier={:?} stake={} (losses {}, trigger {}{})",
            self.name,
            pending
                .leg
                .map(|leg| format!("{} ", leg))
                .unwrap_or_default(),
            pending.contract,
            pending.symbol,
            pending.barrier,
            stake,
            slot.staking.consecutive_losses,
            pending.detector,
            pending
                .partner
                .as_deref()
                .map(|p| format!(" with {}", p))
                .unwrap_or_default()
        );

        slot.pending = Some(pending);
        Some(EngineAction::PlaceTrade(request))
    }

    /// Next-tick settlement: the first tick after placement carries the outcome
    fn observe_exit(&mut self, symbol: &str, sequence: u64, digit: u8) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        for key in self.slot_keys(symbol) {
            actions.extend(self.observe_exit_in(&key, symbol, sequence, digit));
        }
        actions
    }

    fn observe_exit_in(
        &mut self,
        key: &str,
        symbol: &str,
        sequence: u64,
        digit: u8,
    ) -> Vec<EngineAction> {
        let Some(slot) = self.slots.get_mut(key) else {
            return Vec::new();
        };
        let Some(pending) = slot.pending.as_mut() else {
            return Vec::new();
        };
        if pending.symbol != symbol
            || sequence <= pending.placed_at_sequence
            || pending.observed_exit.is_some()
        {
            return Vec::new();
        }

        if pending.contract_id.is_none() {
            debug!(
                "Exit digit {} for {} seen before ack, holding",
                digit, pending.decision_id
            );
            pending.observed_exit = Some(digit);
            return Vec::new();
        }

        self.settle_on_digit(key, digit)
    }

    fn settle_on_digit(&mut self, key: &str, digit: u8) -> Vec<EngineAction> {
        let Some(pending) = self.slots.get(key).and_then(|s| s.pending.as_ref()) else {
            return Vec::new();
        };

        let won = match pending.contract.wins(digit, pending.barrier) {
            Some(won) => won,
            None => {
                debug_assert!(false, "{} without barrier", pending.contract);
                warn!("{} has no barrier, counting as a loss", pending.decision_id);
                false
            }
        };

        let (outcome, amount) = if won {
            let payout = (pending.stake * self.payout_ratio)
                .round_dp(self.policy.config().stake_precision);
            (Outcome::Win, payout)
        } else {
            (Outcome::Loss, -pending.stake)
        };

        self.resolve(key, outcome, amount, Some(digit))
    }

    /// Venue acknowledged a buy
    pub fn on_placement_ack(&mut self, decision_id: Uuid, contract_id: &str) -> Vec<EngineAction> {
        let Some(key) = self.slot_of(decision_id) else {
            warn!("Ack for unknown decision {} (contract {})", decision_id, contract_id);
            return Vec::new();
        };
        let Some(pending) = self.slots.get_mut(&key).and_then(|s| s.pending.as_mut()) else {
            return Vec::new();
        };

        if let Some(existing) = &pending.contract_id {
            debug!("Duplicate ack for {} ({})", decision_id, existing);
            return Vec::new();
        }

        info!("[{}] Decision {} placed as contract {}", self.name, decision_id, contract_id);
        pending.contract_id = Some(contract_id.to_string());
        let observed = pending.observed_exit;

        match observed {
            Some(digit) if self.settlement == SettlementSource::NextTick => {
                self.settle_on_digit(&key, digit)
            }
            _ => Vec::new(),
        }
    }

    /// Venue rejected a buy; roll the slot back without touching stake or profit.
    ///
    /// Without a decision id the single unacknowledged decision is rolled back.
    pub fn on_placement_error(&mut self, decision_id: Option<Uuid>, message: &str) -> bool {
        let key = match decision_id {
            Some(id) => self.slot_of(id),
            None => {
                let mut unacked = self
                    .slots
                    .iter()
                    .filter(|(_, s)| s.pending.as_ref().map_or(false, |p| p.contract_id.is_none()))
                    .map(|(k, _)| k.clone());
                match (unacked.next(), unacked.next()) {
                    (Some(key), None) => Some(key),
                    _ => None,
                }
            }
        };

        let Some(key) = key else {
            warn!("Placement error for unknown decision {:?}: {}", decision_id, message);
            return false;
        };

        let Some(slot) = self.slots.get_mut(&key) else {
            return false;
        };
        if slot.pending.as_ref().map_or(false, |p| p.contract_id.is_some()) {
            warn!("Placement error after ack ignored: {}", message);
            return false;
        }

        if let Some(pending) = slot.pending.take() {
            warn!(
                "[{}] Placement of {} on {} rejected: {}",
                self.name, pending.decision_id, pending.symbol, message
            );
        }
        true
    }

    /// Venue settlement or open-contract update
    pub fn on_settlement(&mut self, settlement: &Settlement) -> Vec<EngineAction> {
        if self.settlement == SettlementSource::NextTick {
            debug!("Ignoring venue settlement for {} (next-tick mode)", settlement.contract_id);
            return Vec::new();
        }

        let outcome = match (settlement.is_settled, settlement.status) {
            (true, ContractStatus::Won) => Outcome::Win,
            (true, ContractStatus::Lost) => Outcome::Loss,
            _ => return Vec::new(),
        };

        let key = self.slots.iter().find_map(|(k, s)| {
            s.pending
                .as_ref()
                .filter(|p| p.contract_id.as_deref() == Some(settlement.contract_id.as_str()))
                .map(|_| k.clone())
        });

        match key {
            Some(key) => self.resolve(&key, outcome, settlement.profit, None),
            None if self.resolved.contains(&settlement.contract_id) => {
                debug!("Duplicate settlement for {}", settlement.contract_id);
                Vec::new()
            }
            None => {
                warn!("Settlement for unknown contract {}", settlement.contract_id);
                Vec::new()
            }
        }
    }

    /// Operator-requested stop; no effect once stopped
    pub fn stop(&mut self, reason: StopReason) -> Vec<EngineAction> {
        if self.is_stopped() {
            return Vec::new();
        }
        info!("[{}] Stopping: {}", self.name, reason);
        self.status = EngineStatus::Stopped(reason);
        vec![EngineAction::Terminate(reason)]
    }

    fn slot_of(&self, decision_id: Uuid) -> Option<String> {
        self.slots.iter().find_map(|(k, s)| {
            s.pending
                .as_ref()
                .filter(|p| p.decision_id == decision_id)
                .map(|_| k.clone())
        })
    }

    /// Apply an outcome to the slot's pending decision
    fn resolve(
        &mut self,
        key: &str,
        outcome: Outcome,
        amount: Decimal,
        exit_digit: Option<u8>,
    ) -> Vec<EngineAction> {
        let Some(slot) = self.slots.get_mut(key) else {
            return Vec::new();
        };
        let Some(pending) = slot.pending.take() else {
            return Vec::new();
        };

        self.profit.record(outcome, amount);
        let step = self.step_staking(key, outcome);

        if let Some(contract_id) = &pending.contract_id {
            self.remember_resolved(contract_id.clone());
        }
        // The follow leg trades against the detector's own call
        if pending.leg != Some(HedgeLeg::Follow) {
            self.detector.on_outcome(&pending.symbol, pending.rule, outcome);
        }

        info!(
            "[{}] {:?} on {} ({}): {} | total {} | next stake {}",
            self.name,
            outcome,
            pending.symbol,
            pending.contract,
            amount,
            self.profit.cumulative_profit,
            step.state.current_stake
        );

        let mut actions = vec![EngineAction::Resolved(ResolvedDecision {
            decision_id: pending.decision_id,
            contract_id: pending.contract_id.clone(),
            symbol: pending.symbol.clone(),
            contract: pending.contract,
            barrier: pending.barrier,
            stake: pending.stake,
            outcome,
            profit: amount,
            exit_digit,
            cumulative_profit: self.profit.cumulative_profit,
            next_stake: step.state.current_stake,
            consecutive_losses: step.state.consecutive_losses,
            stake_reset: step.reset,
            detector: pending.detector.clone(),
            leg: pending.leg,
            round: pending.round,
            resolved_at: Utc::now(),
        })];

        if self.is_stopped() {
            info!("[{}] In-flight decision {} settled after stop", self.name, pending.decision_id);
            return actions;
        }

        if let Some(reason) = self
            .guard
            .evaluate(self.profit.cumulative_profit, self.profit.trade_count)
        {
            info!(
                "[{}] {} at {} after {} trades",
                self.name, reason, self.profit.cumulative_profit, self.profit.trade_count
            );
            self.status = EngineStatus::Stopped(reason);
            actions.push(EngineAction::Terminate(reason));
        }

        actions
    }

    /// Move the slot's stake on after an outcome and return its new state
    fn step_staking(&mut self, key: &str, outcome: Outcome) -> StakeStep {
        let leg = self.slots.get(key).and_then(|s| s.leg);

        if let (Some(leg), Some(ladder)) = (leg, self.hedge.as_ref()) {
            let (round, reset) = ladder.advance(self.hedge_round, leg, outcome);
            if round != self.hedge_round {
                info!(
                    "[{}] {} {:?} moves the pair from round {} to {}",
                    self.name,
                    leg,
                    outcome,
                    self.hedge_round + 1,
                    round + 1
                );
            }
            self.hedge_round = round;

            for slot in self.slots.values_mut() {
                if let Some(other) = slot.leg {
                    slot.staking.current_stake = ladder.stake(other, round);
                }
            }

            let Some(slot) = self.slots.get_mut(key) else {
                return StakeStep {
                    state: self.policy.initial(),
                    reset,
                };
            };
            slot.staking.consecutive_losses = match outcome {
                Outcome::Win => 0,
                Outcome::Loss => slot.staking.consecutive_losses.saturating_add(1),
            };
            return StakeStep {
                state: slot.staking.clone(),
                reset,
            };
        }

        let Some(slot) = self.slots.get_mut(key) else {
            return StakeStep {
                state: self.policy.initial(),
                reset: None,
            };
        };
        let step = match self.policy.next(&slot.staking, outcome) {
            Ok(step) => step,
            Err(e) => {
                debug_assert!(false, "staking failed: {}", e);
                warn!("Staking failed ({}), returning to base stake", e);
                StakeStep {
                    state: self.policy.initial(),
                    reset: None,
                }
            }
        };
        if step.reset == Some(ResetReason::LevelCapExceeded) {
            info!("[{}] Loss cap exceeded, stake back to base", self.name);
        }
        slot.staking = step.state.clone();
        step
    }

    fn remember_resolved(&mut self, contract_id: String) {
        if self.resolved.insert(contract_id.clone()) {
            self.resolved_order.push_back(contract_id);
        }
        while self.resolved_order.len() > RESOLVED_MEMORY {
            if let Some(old) = self.resolved_order.pop_front() {
                self.resolved.remove(&old);
            }
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            instance: self.name.clone(),
            status: self.status,
            profit: self.profit.clone(),
            win_rate: self.profit.win_rate(),
            hedge_round: self.hedge_round(),
            slots: self
                .slots
                .iter()
                .map(|(key, slot)| SlotSnapshot {
                    slot: key.clone(),
                    state: match (&slot.pending, self.status) {
                        (Some(_), _) => SlotState::AwaitingSettlement,
                        (None, EngineStatus::Stopped(_)) => SlotState::Stopped,
                        (None, EngineStatus::Running) => SlotState::Idle,
                    },
                    staking: slot.staking.clone(),
                    pending: slot.pending.clone(),
                })
                .collect(),
            recent_digits: self
                .streams
                .iter()
                .map(|(symbol, history)| (symbol.clone(), history.last(20)))
                .collect(),
        }
    }
}

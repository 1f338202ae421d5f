//! Paper trading venue
//!
//! Accepts every buy, then settles it against the live tick stream the same
//! way the venue would: the exit digit is the last digit of the tick
//! `duration_ticks` after placement. Acks and settlements are delivered on
//! the venue's own event channel.

use crate::config::InstanceConfig;
use crate::digit::{self, ExtractionMode};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tick_feed::{
    ContractKind, ContractStatus, DerivClient, FeedError, FeedEvent, Settlement, Tick,
    TradeRequest, TradeVenue,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct PaperContract {
    contract_id: String,
    symbol: String,
    contract: ContractKind,
    barrier: Option<u8>,
    stake: Decimal,
    /// Ticks still to see before the exit tick
    remaining: u32,
}

pub struct PaperVenue {
    precisions: HashMap<String, u32>,
    extraction: ExtractionMode,
    payout_ratio: Decimal,
    stake_precision: u32,
    events_tx: mpsc::Sender<FeedEvent>,
    open: Mutex<Vec<PaperContract>>,
    next_id: AtomicU64,
    /// Tick source to unsubscribe and close on shutdown
    feed: Option<Arc<DerivClient>>,
}

impl PaperVenue {
    /// Create a paper venue for an instance.
    ///
    /// Returns the venue and the receiving end of its event channel.
    pub fn new(config: &InstanceConfig) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (events_tx, events_rx) = mpsc::channel(1024);
        let venue = Self {
            precisions: config
                .symbols
                .iter()
                .map(|s| (s.symbol.clone(), s.precision))
                .collect(),
            extraction: config.extraction,
            payout_ratio: config.payout_ratio,
            stake_precision: config.staking.stake_precision,
            events_tx,
            open: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            feed: None,
        };
        (venue, events_rx)
    }

    /// Attach the tick feed so shutdown reaches the real connection
    pub fn with_feed(mut self, feed: Arc<DerivClient>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn open_contracts(&self) -> usize {
        self.open.lock().await.len()
    }

    async fn emit(&self, event: FeedEvent) -> tick_feed::Result<()> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| FeedError::ChannelClosed)
    }

    fn settle(&self, contract: &PaperContract, exit_digit: u8) -> Settlement {
        let won = contract
            .contract
            .wins(exit_digit, contract.barrier)
            .unwrap_or(false);

        let profit = if won {
            (contract.stake * self.payout_ratio).round_dp(self.stake_precision)
        } else {
            -contract.stake
        };

        Settlement {
            contract_id: contract.contract_id.clone(),
            is_settled: true,
            status: if won { ContractStatus::Won } else { ContractStatus::Lost },
            profit,
            symbol: Some(contract.symbol.clone()),
        }
    }
}

#[async_trait::async_trait]
impl TradeVenue for PaperVenue {
    async fn place(&self, request: &TradeRequest) -> tick_feed::Result<()> {
        if request.contract.needs_barrier() && request.barrier.is_none() {
            return self
                .emit(FeedEvent::BuyRejected {
                    decision_id: Some(request.decision_id),
                    message: format!("{} requires a barrier", request.contract),
                })
                .await;
        }

        let contract_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.open.lock().await.push(PaperContract {
            contract_id: contract_id.clone(),
            symbol: request.symbol.clone(),
            contract: request.contract,
            barrier: request.barrier,
            stake: request.stake,
            remaining: request.duration_ticks.max(1),
        });

        info!(
            "📝 Paper {} on {} barrier={:?} stake={} -> {}",
            request.contract, request.symbol, request.barrier, request.stake, contract_id
        );

        self.emit(FeedEvent::BuyAccepted {
            decision_id: request.decision_id,
            contract_id,
        })
        .await
    }

    async fn observe_tick(&self, tick: &Tick) {
        let Some(&precision) = self.precisions.get(&tick.symbol) else {
            return;
        };

        let settled: Vec<Settlement> = {
            let mut open = self.open.lock().await;
            let mut settled = Vec::new();
            let mut still_open = Vec::with_capacity(open.len());

            for mut contract in open.drain(..) {
                if contract.symbol != tick.symbol {
                    still_open.push(contract);
                    continue;
                }
                contract.remaining -= 1;
                if contract.remaining > 0 {
                    still_open.push(contract);
                    continue;
                }
                match digit::extract(tick.quote, precision, self.extraction) {
                    Ok(exit_digit) => settled.push(self.settle(&contract, exit_digit)),
                    Err(e) => {
                        warn!("Paper settlement of {} failed: {}", contract.contract_id, e);
                        still_open.push(contract);
                    }
                }
            }

            *open = still_open;
            settled
        };

        for settlement in settled {
            debug!(
                "Paper contract {} {:?} {}",
                settlement.contract_id, settlement.status, settlement.profit
            );
            if self.emit(FeedEvent::Settlement(settlement)).await.is_err() {
                debug!("Paper event receiver dropped");
            }
        }
    }

    async fn unsubscribe_ticks(&self) -> tick_feed::Result<()> {
        match &self.feed {
            Some(feed) => feed.forget_all_ticks().await,
            None => Ok(()),
        }
    }

    async fn close(&self) -> tick_feed::Result<()> {
        let open = self.open.lock().await.len();
        if open > 0 {
            warn!("Closing paper venue with {} open contracts", open);
        }
        match &self.feed {
            Some(feed) => feed.close().await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbolConfig;
    use uuid::Uuid;

    fn config() -> InstanceConfig {
        InstanceConfig::new(
            "paper",
            vec![
                SymbolConfig {
                    symbol: "R_10".to_string(),
                    precision: 3,
                },
                SymbolConfig {
                    symbol: "R_25".to_string(),
                    precision: 3,
                },
            ],
        )
    }

    fn request(contract: ContractKind, barrier: Option<u8>, duration: u32) -> TradeRequest {
        TradeRequest {
            decision_id: Uuid::new_v4(),
            symbol: "R_10".to_string(),
            contract,
            barrier,
            stake: Decimal::from(2),
            duration_ticks: duration,
            currency: "USD".to_string(),
        }
    }

    fn tick(symbol: &str, seq: u64, quote: &str) -> Tick {
        Tick::new(symbol, quote.parse().unwrap(), seq)
    }

    #[tokio::test]
    async fn test_ack_then_settle_on_next_tick() {
        let (venue, mut rx) = PaperVenue::new(&config());
        let req = request(ContractKind::DigitOver, Some(5), 1);
        venue.place(&req).await.unwrap();

        match rx.recv().await.unwrap() {
            FeedEvent::BuyAccepted { decision_id, contract_id } => {
                assert_eq!(decision_id, req.decision_id);
                assert_eq!(contract_id, "paper-1");
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Other symbols don't count toward the duration
        venue.observe_tick(&tick("R_25", 1, "100.009")).await;
        assert_eq!(venue.open_contracts().await, 1);

        venue.observe_tick(&tick("R_10", 2, "100.007")).await;
        match rx.recv().await.unwrap() {
            FeedEvent::Settlement(s) => {
                assert!(s.is_settled);
                assert_eq!(s.status, ContractStatus::Won);
                assert_eq!(s.profit, Decimal::new(190, 2));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(venue.open_contracts().await, 0);
    }

    #[tokio::test]
    async fn test_multi_tick_duration_loss() {
        let (venue, mut rx) = PaperVenue::new(&config());
        venue.place(&request(ContractKind::DigitEven, None, 3)).await.unwrap();
        rx.recv().await.unwrap();

        venue.observe_tick(&tick("R_10", 1, "100.002")).await;
        venue.observe_tick(&tick("R_10", 2, "100.004")).await;
        assert_eq!(venue.open_contracts().await, 1);

        venue.observe_tick(&tick("R_10", 3, "100.001")).await;
        match rx.recv().await.unwrap() {
            FeedEvent::Settlement(s) => {
                assert_eq!(s.status, ContractStatus::Lost);
                assert_eq!(s.profit, Decimal::from(-2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_barrier_rejected() {
        let (venue, mut rx) = PaperVenue::new(&config());
        let req = request(ContractKind::DigitMatch, None, 1);
        venue.place(&req).await.unwrap();

        match rx.recv().await.unwrap() {
            FeedEvent::BuyRejected { decision_id, .. } => {
                assert_eq!(decision_id, Some(req.decision_id));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(venue.open_contracts().await, 0);
    }
}

//! Instance runner - drives one engine from venue events
//!
//! Each configured instance gets its own runner task, its own connection and
//! its own engine. The runner is the only place that performs I/O on behalf
//! of the engine: it forwards trade requests to the venue, journals
//! resolutions and writes state snapshots.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{InstanceConfig, RunnerConfig, TradingMode, API_TOKEN_ENV};
use crate::engine::{Engine, EngineAction, EngineStatus};
use crate::paper::PaperVenue;
use crate::profit::ProfitState;
use crate::state::{NowState, StateManager};
use crate::types::StopReason;
use tick_feed::{DerivClient, FeedEvent, TradeVenue};

/// Runner-wide settings shared by every instance
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub mode: TradingMode,
    pub heartbeat: Duration,
    /// Wait for in-flight settlements once stopped
    pub shutdown_grace: Duration,
}

impl From<&RunnerConfig> for RunSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            mode: config.trading_mode,
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

/// Final figures for a finished instance
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub instance: String,
    pub status: EngineStatus,
    pub profit: ProfitState,
    /// Decisions still unresolved when the runner gave up waiting
    pub unresolved: usize,
}

pub struct InstanceRunner {
    engine: Engine,
    settings: RunSettings,
    venue: Arc<dyn TradeVenue>,
    events: mpsc::Receiver<FeedEvent>,
    /// Separate event channel for venues that settle locally
    venue_events: Option<mpsc::Receiver<FeedEvent>>,
    state: StateManager,
    connected: bool,
}

impl InstanceRunner {
    pub fn new(
        instance: &InstanceConfig,
        settings: RunSettings,
        venue: Arc<dyn TradeVenue>,
        events: mpsc::Receiver<FeedEvent>,
        venue_events: Option<mpsc::Receiver<FeedEvent>>,
        state: StateManager,
    ) -> Self {
        Self {
            engine: Engine::new(instance),
            settings,
            venue,
            events,
            venue_events,
            state,
            connected: true,
        }
    }

    /// Connect to the venue, subscribe the instance's symbols and build the runner
    pub async fn start(config: &RunnerConfig, instance: &InstanceConfig) -> anyhow::Result<Self> {
        let settings = RunSettings::from(config);

        if settings.mode == TradingMode::Live && config.venue.api_token.is_none() {
            anyhow::bail!("Live trading requires {} to be set", API_TOKEN_ENV);
        }

        let (client, events) = DerivClient::connect(config.venue.clone()).await?;
        let client = Arc::new(client);
        client.authorize().await?;
        let warmup = instance.warmup_count();
        for symbol in instance.symbol_names() {
            // History goes out first so its reply lands ahead of live ticks
            if warmup > 0 {
                client.request_history(&symbol, warmup).await?;
            }
            client.subscribe_ticks(&symbol).await?;
        }

        let (venue, venue_events) = match settings.mode {
            TradingMode::Paper => {
                info!("📝 Instance {} running in PAPER TRADING mode", instance.name);
                let (paper, rx) = PaperVenue::new(instance);
                let venue: Arc<dyn TradeVenue> = Arc::new(paper.with_feed(client.clone()));
                (venue, Some(rx))
            }
            TradingMode::Live => {
                warn!(
                    "💰 Instance {} running in LIVE TRADING mode - REAL MONEY AT RISK",
                    instance.name
                );
                let venue: Arc<dyn TradeVenue> = client.clone();
                (venue, None)
            }
        };

        let state = StateManager::new(&config.state_dir(), &instance.name);
        state.init().await?;

        Ok(Self::new(instance, settings, venue, events, venue_events, state))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run until the engine stops, then wind down
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<RunSummary> {
        info!(
            "Instance {} starting on {} ({:?})",
            self.engine.name(),
            self.venue.name(),
            self.settings.mode
        );

        let mut heartbeat = interval(self.settings.heartbeat);

        while !self.engine.is_stopped() {
            tokio::select! {
                event = next_event(&mut self.events, &mut self.venue_events) => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("Event stream closed");
                            let actions = self.engine.stop(StopReason::Shutdown);
                            self.apply(actions).await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    let actions = self.engine.stop(StopReason::Shutdown);
                    self.apply(actions).await;
                }
                _ = heartbeat.tick() => {
                    self.heartbeat().await;
                }
            }
        }

        self.wind_down().await
    }

    async fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Tick(tick) => {
                self.venue.observe_tick(&tick).await;
                let actions = self.engine.on_tick(&tick);
                self.apply(actions).await;
            }
            FeedEvent::History(history) => {
                self.engine.seed_history(&history);
            }
            FeedEvent::BuyAccepted {
                decision_id,
                contract_id,
            } => {
                let actions = self.engine.on_placement_ack(decision_id, &contract_id);
                self.apply(actions).await;
            }
            FeedEvent::BuyRejected {
                decision_id,
                message,
            } => {
                self.engine.on_placement_error(decision_id, &message);
            }
            FeedEvent::Settlement(settlement) => {
                let actions = self.engine.on_settlement(&settlement);
                self.apply(actions).await;
            }
            FeedEvent::Authorized { login_id } => {
                info!("Authorized as {}", login_id.as_deref().unwrap_or("unknown"));
            }
            FeedEvent::ApiError { msg_type, message } => {
                warn!("Venue error on {}: {}", msg_type, message);
            }
            FeedEvent::Disconnected => {
                self.connected = false;
                warn!("Venue disconnected, waiting for reconnect");
            }
            FeedEvent::Reconnected => {
                self.connected = true;
                info!("Venue reconnected");
            }
            FeedEvent::GaveUp => {
                self.connected = false;
                error!("Venue reconnection attempts exhausted");
                let actions = self.engine.stop(StopReason::Shutdown);
                self.apply(actions).await;
            }
        }
    }

    async fn apply(&mut self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::PlaceTrade(request) => {
                    if let Err(e) = self.venue.place(&request).await {
                        warn!("Failed to place {}: {}", request.decision_id, e);
                        self.engine
                            .on_placement_error(Some(request.decision_id), &e.to_string());
                    }
                }
                EngineAction::Resolved(resolved) => {
                    if let Err(e) = self.state.append_resolution(&resolved).await {
                        error!("Failed to journal {}: {}", resolved.decision_id, e);
                    }
                    self.write_state().await;
                }
                EngineAction::Terminate(reason) => {
                    info!(
                        "Instance {} terminating: {} (profit {})",
                        self.engine.name(),
                        reason,
                        self.engine.profit().cumulative_profit
                    );
                }
            }
        }
    }

    async fn heartbeat(&mut self) {
        let profit = self.engine.profit();
        info!(
            "💓 {} | trades {} | wins {} | profit {} | pending {} | connected {}",
            self.engine.name(),
            profit.trade_count,
            profit.win_count,
            profit.cumulative_profit,
            self.engine.pending().count(),
            self.connected
        );
        self.write_state().await;
    }

    async fn write_state(&self) {
        let snapshot = self.engine.snapshot();
        let now = NowState {
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: self.settings.mode,
            venue: self.venue.name(),
            connected: self.connected,
            engine: &snapshot,
        };
        if let Err(e) = self.state.write_now(&now).await {
            error!("Failed to write state: {}", e);
        }
    }

    /// Let in-flight decisions settle, then stop the feed and close the venue
    async fn wind_down(mut self) -> anyhow::Result<RunSummary> {
        let deadline = Instant::now() + self.settings.shutdown_grace;

        while self.engine.has_pending() {
            let event = tokio::time::timeout_at(
                deadline,
                next_event(&mut self.events, &mut self.venue_events),
            )
            .await;
            match event {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "{} decision(s) still pending after {:?}",
                        self.engine.pending().count(),
                        self.settings.shutdown_grace
                    );
                    break;
                }
            }
        }

        if let Err(e) = self.venue.unsubscribe_ticks().await {
            debug!("Unsubscribe failed: {}", e);
        }
        self.write_state().await;
        if let Err(e) = self.venue.close().await {
            warn!("Failed to close venue: {}", e);
        }

        let summary = RunSummary {
            instance: self.engine.name().to_string(),
            status: self.engine.status(),
            profit: self.engine.profit().clone(),
            unresolved: self.engine.pending().count(),
        };
        info!(
            "Instance {} finished: {:?} | trades {} | win rate {}% | profit {}",
            summary.instance,
            summary.status,
            summary.profit.trade_count,
            summary.profit.win_rate(),
            summary.profit.cumulative_profit
        );
        Ok(summary)
    }
}

/// Next event from the feed or, when present, the venue's own channel
async fn next_event(
    events: &mut mpsc::Receiver<FeedEvent>,
    venue_events: &mut Option<mpsc::Receiver<FeedEvent>>,
) -> Option<FeedEvent> {
    match venue_events {
        Some(rx) => tokio::select! {
            event = events.recv() => event,
            Some(event) = rx.recv() => Some(event),
        },
        None => events.recv().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbolConfig;
    use crate::engine::SlotState;

    fn runner(dir: &std::path::Path) -> (InstanceRunner, mpsc::Sender<FeedEvent>) {
        let config = InstanceConfig::new(
            "spawned",
            vec![SymbolConfig {
                symbol: "R_10".to_string(),
                precision: 2,
            }],
        );
        let (paper, paper_events) = PaperVenue::new(&config);
        let (feed, events) = mpsc::channel(8);
        let settings = RunSettings {
            mode: TradingMode::Paper,
            heartbeat: Duration::from_secs(60),
            shutdown_grace: Duration::from_millis(100),
        };
        let state = StateManager::new(dir, "spawned");
        let runner = InstanceRunner::new(
            &config,
            settings,
            Arc::new(paper),
            events,
            Some(paper_events),
            state,
        );
        (runner, feed)
    }

    #[tokio::test]
    async fn test_runner_runs_as_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, feed) = runner(dir.path());
        runner.state.init().await.unwrap();
        let (_shutdown, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(runner.run(shutdown_rx));
        drop(feed);

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runner did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(summary.status, EngineStatus::Stopped(StopReason::Shutdown));
        assert_eq!(summary.unresolved, 0);
    }

    #[tokio::test]
    async fn test_history_event_seeds_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (mut runner, _feed) = runner(dir.path());

        let ticks = (1..=4)
            .map(|seq| tick_feed::Tick::new("R_10", rust_decimal::Decimal::new(10_001, 2), seq))
            .collect();
        runner
            .handle_event(FeedEvent::History(tick_feed::TickHistory {
                symbol: "R_10".to_string(),
                ticks,
            }))
            .await;

        assert_eq!(runner.engine().history("R_10").unwrap().len(), 4);
        assert_eq!(runner.engine().slot_state("R_10"), SlotState::Idle);
    }
}

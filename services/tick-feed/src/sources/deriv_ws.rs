use crate::backoff::ReconnectPolicy;
use crate::protocol;
use crate::types::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Connection settings for the Deriv WebSocket API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Read from the environment, never from config files
    #[serde(skip)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Buffered events between the socket and the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DerivConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            app_id: default_app_id(),
            api_token: None,
            reconnect: ReconnectPolicy::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl DerivConfig {
    /// Full endpoint including the app id query parameter
    pub fn endpoint(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| FeedError::Connection(format!("Invalid venue url {}: {}", self.url, e)))?;
        url.query_pairs_mut().append_pair("app_id", &self.app_id);
        Ok(url)
    }
}

fn default_url() -> String { "wss://ws.derivws.com/websockets/v3".to_string() }
fn default_app_id() -> String { "1089".to_string() }
fn default_channel_capacity() -> usize { 10_000 }

/// Deriv WebSocket client for ticks, buys and contract settlements
///
/// Uses split read/write halves so requests can be sent while the
/// connection task is blocked reading. The connection task owns the
/// reader and reconnects with backoff, restoring the session
/// (authorization, tick subscriptions, open contract updates).
#[derive(Clone)]
pub struct DerivClient {
    config: DerivConfig,
    /// WebSocket write half, `None` while disconnected
    ws_sink: Arc<Mutex<Option<WsSink>>>,
    events_tx: mpsc::Sender<FeedEvent>,
    /// Subscribed tick symbols (survive reconnects)
    subscriptions: Arc<RwLock<BTreeSet<String>>>,
    /// Contracts bought but not yet settled
    open_contracts: Arc<RwLock<HashSet<String>>>,
    connected: Arc<RwLock<bool>>,
    closing: Arc<AtomicBool>,
}

impl DerivClient {
    /// Connect and spawn the connection task.
    ///
    /// Returns the client handle and the receiving end of its event channel.
    pub async fn connect(config: DerivConfig) -> Result<(Self, mpsc::Receiver<FeedEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));

        let client = Self {
            config,
            ws_sink: Arc::new(Mutex::new(None)),
            events_tx,
            subscriptions: Arc::new(RwLock::new(BTreeSet::new())),
            open_contracts: Arc::new(RwLock::new(HashSet::new())),
            connected: Arc::new(RwLock::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
        };

        let reader = client.open().await?;
        info!("Connected to Deriv WebSocket");

        let task_client = client.clone();
        tokio::spawn(async move {
            task_client.connection_loop(reader).await;
        });

        Ok((client, events_rx))
    }

    /// Open a socket, install the write half and hand back the read half
    async fn open(&self) -> Result<WsReader> {
        let endpoint = self.config.endpoint()?;

        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| FeedError::Connection(format!("WebSocket connection failed: {}", e)))?;

        let (sink, reader) = ws_stream.split();
        *self.ws_sink.lock().await = Some(sink);
        *self.connected.write().await = true;

        Ok(reader)
    }

    /// Read until the socket drops, then reconnect with backoff
    async fn connection_loop(&self, mut reader: WsReader) {
        loop {
            self.message_handler(&mut reader).await;

            *self.connected.write().await = false;
            *self.ws_sink.lock().await = None;

            if self.closing.load(Ordering::SeqCst) {
                debug!("Connection task exiting after close");
                return;
            }

            warn!("Deriv WebSocket disconnected");
            self.emit(FeedEvent::Disconnected).await;

            match self.reconnect_with_backoff().await {
                Some(new_reader) => {
                    reader = new_reader;
                    if let Err(e) = self.restore_session().await {
                        warn!("Failed to restore session after reconnect: {}", e);
                    }
                    self.emit(FeedEvent::Reconnected).await;
                }
                None => {
                    error!(
                        "Giving up after {} reconnect attempts",
                        self.config.reconnect.max_attempts
                    );
                    self.emit(FeedEvent::GaveUp).await;
                    return;
                }
            }
        }
    }

    async fn reconnect_with_backoff(&self) -> Option<WsReader> {
        let policy = self.config.reconnect;
        let mut attempt = 1;

        while policy.allows(attempt) {
            let delay = policy.delay_for(attempt);
            info!(
                "Reconnect attempt {}/{} in {:.1}s",
                attempt,
                policy.max_attempts,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;

            if self.closing.load(Ordering::SeqCst) {
                return None;
            }

            match self.open().await {
                Ok(reader) => {
                    info!("Reconnected to Deriv WebSocket");
                    return Some(reader);
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
            attempt += 1;
        }

        None
    }

    /// Re-authorize and re-subscribe after a reconnect
    async fn restore_session(&self) -> Result<()> {
        self.authorize().await?;

        let symbols: Vec<String> = self.subscriptions.read().await.iter().cloned().collect();
        for symbol in symbols {
            self.send_json(&protocol::subscribe_ticks_request(&symbol)).await?;
        }

        let contracts: Vec<String> = self.open_contracts.read().await.iter().cloned().collect();
        for contract_id in contracts {
            debug!("Re-attaching to open contract {}", contract_id);
            self.send_json(&protocol::open_contract_request(&contract_id)).await?;
        }

        Ok(())
    }

    /// Handle incoming messages until the socket ends
    async fn message_handler(&self, reader: &mut WsReader) {
        while let Some(msg) = reader.next().await {
            match msg {
                Ok(Message::Text(text)) => match protocol::parse_message(&text) {
                    Ok(Some(event)) => {
                        self.track(&event).await;
                        self.emit(event).await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Failed to process message: {}", e),
                },
                Ok(Message::Ping(data)) => {
                    let mut sink = self.ws_sink.lock().await;
                    if let Some(sink) = sink.as_mut() {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket closed by server");
                    return;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    return;
                }
                Ok(_) => {}
            }
        }
        info!("WebSocket stream ended");
    }

    /// Keep the open-contract set in step with buys and settlements
    async fn track(&self, event: &FeedEvent) {
        match event {
            FeedEvent::BuyAccepted { contract_id, .. } => {
                self.open_contracts.write().await.insert(contract_id.clone());
            }
            FeedEvent::Settlement(s) if s.is_settled => {
                self.open_contracts.write().await.remove(&s.contract_id);
            }
            _ => {}
        }
    }

    async fn emit(&self, event: FeedEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }

    async fn send_json(&self, value: &Value) -> Result<()> {
        let mut guard = self.ws_sink.lock().await;
        let sink = guard.as_mut().ok_or(FeedError::NotConnected)?;
        sink.send(Message::Text(value.to_string()))
            .await
            .map_err(|e| FeedError::Send(e.to_string()))
    }

    /// Authorize the session when a token is configured
    pub async fn authorize(&self) -> Result<()> {
        match &self.config.api_token {
            Some(token) => self.send_json(&protocol::authorize_request(token)).await,
            None => {
                debug!("No API token configured, skipping authorization");
                Ok(())
            }
        }
    }

    /// Subscribe to real-time ticks for a symbol
    pub async fn subscribe_ticks(&self, symbol: &str) -> Result<()> {
        {
            let subs = self.subscriptions.read().await;
            if subs.contains(symbol) {
                return Ok(()); // Already subscribed
            }
        }

        self.send_json(&protocol::subscribe_ticks_request(symbol)).await?;
        self.subscriptions.write().await.insert(symbol.to_string());

        info!("Subscribed to {} ticks", symbol);
        Ok(())
    }

    /// Request the last `count` ticks; the reply arrives as [`FeedEvent::History`]
    pub async fn request_history(&self, symbol: &str, count: usize) -> Result<()> {
        self.send_json(&protocol::ticks_history_request(symbol, count))
            .await?;
        debug!("Requested {} ticks of {} history", count, symbol);
        Ok(())
    }

    /// Drop every tick subscription
    pub async fn forget_all_ticks(&self) -> Result<()> {
        self.subscriptions.write().await.clear();
        self.send_json(&protocol::forget_all_request("ticks")).await?;
        info!("Unsubscribed from all ticks");
        Ok(())
    }

    /// Buy a contract
    pub async fn buy(&self, request: &TradeRequest) -> Result<()> {
        let msg = protocol::buy_request(request)?;
        self.send_json(&msg).await?;
        debug!(
            "Buy sent: {} {} barrier={:?} stake={}",
            request.symbol, request.contract, request.barrier, request.stake
        );
        Ok(())
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Number of contracts still waiting for settlement
    pub async fn open_contract_count(&self) -> usize {
        self.open_contracts.read().await.len()
    }

    /// Close connection gracefully; the connection task stops reconnecting
    pub async fn close(&self) -> Result<()> {
        info!("Closing Deriv WebSocket connection");
        self.closing.store(true, Ordering::SeqCst);

        let mut guard = self.ws_sink.lock().await;
        if let Some(sink) = guard.as_mut() {
            sink.close()
                .await
                .map_err(|e| FeedError::Send(format!("Failed to close WebSocket: {}", e)))?;
        }
        *guard = None;
        *self.connected.write().await = false;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TradeVenue for DerivClient {
    async fn place(&self, request: &TradeRequest) -> Result<()> {
        self.buy(request).await
    }

    async fn unsubscribe_ticks(&self) -> Result<()> {
        self.forget_all_ticks().await
    }

    async fn close(&self) -> Result<()> {
        DerivClient::close(self).await
    }

    fn name(&self) -> &str {
        "deriv"
    }
}

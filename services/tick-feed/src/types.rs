use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One price update for a subscribed symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub quote: Decimal,
    /// Monotonic per symbol (the venue's tick epoch)
    pub sequence: u64,
    /// Venue-reported decimal places, when present
    pub pip_size: Option<u32>,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, quote: Decimal, sequence: u64) -> Self {
        Self {
            symbol: symbol.into(),
            quote,
            sequence,
            pip_size: None,
        }
    }
}

/// Recent ticks for one symbol, oldest first, used to warm up a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickHistory {
    pub symbol: String,
    pub ticks: Vec<Tick>,
}

/// Digit contract types offered by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    DigitEven,
    DigitOdd,
    DigitMatch,
    DigitDiff,
    DigitOver,
    DigitUnder,
}

impl ContractKind {
    /// Wire name used in buy requests
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::DigitEven => "DIGITEVEN",
            ContractKind::DigitOdd => "DIGITODD",
            ContractKind::DigitMatch => "DIGITMATCH",
            ContractKind::DigitDiff => "DIGITDIFF",
            ContractKind::DigitOver => "DIGITOVER",
            ContractKind::DigitUnder => "DIGITUNDER",
        }
    }

    /// Whether this contract needs a barrier digit
    pub fn needs_barrier(&self) -> bool {
        !matches!(self, ContractKind::DigitEven | ContractKind::DigitOdd)
    }

    /// Contract that wins on exactly the digits this one loses on, with the
    /// same barrier. Over and under have no such counterpart.
    pub fn opposite(&self) -> Option<ContractKind> {
        match self {
            ContractKind::DigitEven => Some(ContractKind::DigitOdd),
            ContractKind::DigitOdd => Some(ContractKind::DigitEven),
            ContractKind::DigitMatch => Some(ContractKind::DigitDiff),
            ContractKind::DigitDiff => Some(ContractKind::DigitMatch),
            ContractKind::DigitOver | ContractKind::DigitUnder => None,
        }
    }

    /// Evaluate the contract against the exit digit.
    ///
    /// Returns `None` when a barrier contract is evaluated without a barrier.
    pub fn wins(&self, exit_digit: u8, barrier: Option<u8>) -> Option<bool> {
        let won = match self {
            ContractKind::DigitEven => exit_digit % 2 == 0,
            ContractKind::DigitOdd => exit_digit % 2 == 1,
            ContractKind::DigitMatch => exit_digit == barrier?,
            ContractKind::DigitDiff => exit_digit != barrier?,
            ContractKind::DigitOver => exit_digit > barrier?,
            ContractKind::DigitUnder => exit_digit < barrier?,
        };
        Some(won)
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound trade request, issued once per accepted trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Echoed back by the venue so acks can be matched
    pub decision_id: Uuid,
    pub symbol: String,
    pub contract: ContractKind,
    pub barrier: Option<u8>,
    pub stake: Decimal,
    pub duration_ticks: u32,
    pub currency: String,
}

/// Contract status as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Open,
    Won,
    Lost,
}

/// Inbound settlement (or open-contract update) for a placed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub contract_id: String,
    pub is_settled: bool,
    pub status: ContractStatus,
    /// Signed profit for the contract
    pub profit: Decimal,
    pub symbol: Option<String>,
}

/// Everything the transport reports back to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Authorized { login_id: Option<String> },
    Tick(Tick),
    History(TickHistory),
    BuyAccepted { decision_id: Uuid, contract_id: String },
    BuyRejected { decision_id: Option<Uuid>, message: String },
    Settlement(Settlement),
    ApiError { msg_type: String, message: String },
    Disconnected,
    Reconnected,
    /// Reconnection attempts exhausted
    GaveUp,
}

/// Error types for the venue transport
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Failed to send request: {0}")]
    Send(String),

    #[error("Invalid message format: {0}")]
    Protocol(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Event channel closed")]
    ChannelClosed,
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Where trade requests go.
///
/// Acks and settlements come back asynchronously as [`FeedEvent`]s on the
/// consumer's event channel, never as return values.
#[async_trait::async_trait]
pub trait TradeVenue: Send + Sync {
    /// Submit a trade request
    async fn place(&self, request: &TradeRequest) -> Result<()>;

    /// Let venues that settle locally see each tick
    async fn observe_tick(&self, _tick: &Tick) {}

    /// Stop the tick feed
    async fn unsubscribe_ticks(&self) -> Result<()>;

    /// Close the connection for good
    async fn close(&self) -> Result<()>;

    /// Venue name
    fn name(&self) -> &str;
}

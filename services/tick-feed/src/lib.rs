//! Venue transport for digit contracts
//!
//! Tick subscriptions, contract buys and settlement updates over the
//! Deriv WebSocket API, surfaced to consumers as [`FeedEvent`]s.

pub mod types;
pub mod protocol;
pub mod backoff;
pub mod sources {
    pub mod deriv_ws;
}

pub use types::*;
pub use backoff::ReconnectPolicy;
pub use sources::deriv_ws::{DerivClient, DerivConfig};

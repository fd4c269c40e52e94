// Exchange module
// Sole owner of the upstream connections and the price-action store

pub mod auth;
pub mod coinbase;
pub mod connection;
pub mod feed;
pub mod registry;
pub mod rest;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{StaticToken, TokenSource};
pub use coinbase::{CoinbaseExchange, FeedUrls};
pub use connection::{Backoff, ConnectionState, SocketSession, SocketSupervisor, SocketTiming};
pub use feed::{FeedHub, MarketSession, UserSession};
pub use registry::{SubscriberRegistry, Subscription, SUBSCRIBER_CAPACITY};
pub use rest::RestClient;

use crate::error::Result;
use crate::models::{Candle, CandleSize, OrderAck, OrderUpdate, Side, Ticker};
use crate::store::PriceActionStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Historical seeds for both served series of a symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolSeeds {
    pub primary: Vec<Candle>,
    pub long: Vec<Candle>,
}

/// Everything the manager, signaler and traders need from a venue
#[async_trait]
pub trait Exchange: Send + Sync {
    fn subscribe_candles(&self, symbol: &str) -> Subscription<Candle>;

    fn subscribe_tickers(&self, symbol: &str) -> Subscription<Ticker>;

    fn subscribe_order_updates(&self, symbol: &str) -> Subscription<OrderUpdate>;

    /// Shared store the read loops ingest into
    fn store(&self) -> Arc<PriceActionStore>;

    /// Activate a symbol's streams, seeding the store if it has no series yet
    async fn start_symbol_stream(&self, symbol: &str, size: CandleSize) -> Result<()>;

    /// Idempotent
    async fn stop_symbol_stream(&self, symbol: &str) -> Result<()>;

    async fn update_symbol_candle_size(&self, symbol: &str, size: CandleSize) -> Result<()>;

    async fn update_inbound_candle_size(&self, size: CandleSize) -> Result<()>;

    async fn historical_candles(&self, symbol: &str, size: CandleSize) -> Result<Vec<Candle>>;

    async fn token_balances(&self) -> Result<HashMap<String, f64>>;

    /// Market order sized in USD
    async fn create_order(&self, symbol: &str, usd: f64, side: Side) -> Result<OrderAck>;

    /// Market sell sized in base tokens
    async fn sell_tokens(&self, symbol: &str, tokens: f64) -> Result<OrderAck>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Primary and long seeds at `size` and its long companion
    async fn seed_histories(&self, symbol: &str, size: CandleSize) -> Result<SymbolSeeds> {
        let primary = self.historical_candles(symbol, size).await?;
        let long = self.historical_candles(symbol, size.long_size()).await?;
        Ok(SymbolSeeds { primary, long })
    }
}

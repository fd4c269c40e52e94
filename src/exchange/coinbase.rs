use super::auth::TokenSource;
use super::connection::{ConnectionState, SocketSupervisor, SocketTiming};
use super::feed::{FeedHub, MarketSession, UserSession};
use super::registry::Subscription;
use super::rest::RestClient;
use super::wire;
use super::{Exchange, SymbolSeeds};
use crate::error::Result;
use crate::models::{Candle, CandleSize, OrderAck, OrderUpdate, Side, Ticker};
use crate::store::PriceActionStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MARKET_WS_URL: &str = "wss://advanced-trade-ws.coinbase.com";
pub const DEFAULT_USER_WS_URL: &str = "wss://advanced-trade-ws-user.coinbase.com";

/// Websocket endpoints of the two upstream feeds
#[derive(Debug, Clone)]
pub struct FeedUrls {
    pub market: String,
    pub user: String,
}

impl Default for FeedUrls {
    fn default() -> Self {
        Self {
            market: DEFAULT_MARKET_WS_URL.to_string(),
            user: DEFAULT_USER_WS_URL.to_string(),
        }
    }
}

/// Coinbase Advanced Trade adapter
///
/// Two supervised sockets feed a [`FeedHub`]; REST calls go through a
/// rate-limited [`RestClient`].
pub struct CoinbaseExchange {
    rest: RestClient,
    hub: Arc<FeedHub>,
    market: Arc<SocketSupervisor<MarketSession>>,
    user: Arc<SocketSupervisor<UserSession>>,
}

impl CoinbaseExchange {
    pub fn new(
        rest: RestClient,
        tokens: Arc<dyn TokenSource>,
        urls: FeedUrls,
        inbound_size: CandleSize,
        timing: SocketTiming,
    ) -> Self {
        let store = Arc::new(PriceActionStore::new(inbound_size));
        let hub = Arc::new(FeedHub::new(store));

        let market = SocketSupervisor::new(
            urls.market,
            Arc::new(MarketSession::new(hub.clone())),
            timing.clone(),
        );
        let user = SocketSupervisor::new(
            urls.user,
            Arc::new(UserSession::new(hub.clone(), tokens)),
            timing,
        );

        Self {
            rest,
            hub,
            market: Arc::new(market),
            user: Arc::new(user),
        }
    }

    /// Spawn the public candles socket loop
    pub fn start_market_feed(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.market.clone().run(cancel))
    }

    /// Spawn the authenticated order socket loop
    pub fn start_user_feed(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.user.clone().run(cancel))
    }

    pub fn market_state(&self) -> watch::Receiver<ConnectionState> {
        self.market.state()
    }

    pub fn user_state(&self) -> watch::Receiver<ConnectionState> {
        self.user.state()
    }

    pub fn hub(&self) -> &Arc<FeedHub> {
        &self.hub
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Send (un)subscribe frames for one symbol on whichever sockets are open
    ///
    /// Callers flip the hub's active set first. A socket still handshaking
    /// either saw the change in its snapshot or writes this frame after it.
    async fn send_subscriptions(&self, symbol: &str, unsubscribe: bool) -> Result<()> {
        let symbols = [symbol.to_string()];

        if self.market.accepts_frames() {
            let frame = wire::market_subscription(&symbols, unsubscribe)?;
            if !self.market.send_text(frame) {
                tracing::debug!(symbol, "market socket dropped before subscribe; resent on reconnect");
            }
        }

        if self.user.accepts_frames() {
            let frame = self.user.session().frame(&symbols, unsubscribe).await?;
            if !self.user.send_text(frame) {
                tracing::debug!(symbol, "user socket dropped before subscribe; resent on reconnect");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Exchange for CoinbaseExchange {
    fn subscribe_candles(&self, symbol: &str) -> Subscription<Candle> {
        self.hub.subscribe_candles(symbol)
    }

    fn subscribe_tickers(&self, symbol: &str) -> Subscription<Ticker> {
        self.hub.subscribe_tickers(symbol)
    }

    fn subscribe_order_updates(&self, symbol: &str) -> Subscription<OrderUpdate> {
        self.hub.subscribe_order_updates(symbol)
    }

    fn store(&self) -> Arc<PriceActionStore> {
        self.hub.store()
    }

    async fn start_symbol_stream(&self, symbol: &str, size: CandleSize) -> Result<()> {
        let store = self.hub.store();
        if !store.contains(symbol) {
            let SymbolSeeds { primary, long } = self.seed_histories(symbol, size).await?;
            store.add_symbol(symbol, size, primary, long);
        }

        if !self.hub.activate(symbol) {
            tracing::debug!(symbol, "stream already active");
            return Ok(());
        }

        tracing::info!(symbol, size = %size, "📡 starting symbol stream");
        self.send_subscriptions(symbol, false).await
    }

    async fn stop_symbol_stream(&self, symbol: &str) -> Result<()> {
        if !self.hub.deactivate(symbol) {
            return Ok(());
        }

        self.hub.store().remove_symbol(symbol);
        tracing::info!(symbol, "stopping symbol stream");
        self.send_subscriptions(symbol, true).await
    }

    async fn update_symbol_candle_size(&self, symbol: &str, size: CandleSize) -> Result<()> {
        let SymbolSeeds { primary, long } = self.seed_histories(symbol, size).await?;
        self.hub.store().set_size(symbol, size, primary, long);
        tracing::info!(symbol, size = %size, "candle size updated");
        Ok(())
    }

    async fn update_inbound_candle_size(&self, size: CandleSize) -> Result<()> {
        let store = self.hub.store();
        store.set_inbound_size(size);

        for symbol in self.hub.active_symbols() {
            let Some(symbol_size) = store.size(&symbol) else {
                continue;
            };
            let SymbolSeeds { primary, long } = self.seed_histories(&symbol, symbol_size).await?;
            store.set_size(&symbol, symbol_size, primary, long);
        }

        tracing::info!(size = %size, "inbound candle size updated");
        Ok(())
    }

    async fn historical_candles(&self, symbol: &str, size: CandleSize) -> Result<Vec<Candle>> {
        self.rest.historical_candles(symbol, size).await
    }

    async fn token_balances(&self) -> Result<HashMap<String, f64>> {
        self.rest.token_balances().await
    }

    async fn create_order(&self, symbol: &str, usd: f64, side: Side) -> Result<OrderAck> {
        self.rest.create_order(symbol, usd, side).await
    }

    async fn sell_tokens(&self, symbol: &str, tokens: f64) -> Result<OrderAck> {
        self.rest.sell_tokens(symbol, tokens).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.rest.cancel_orders(&[order_id.to_string()]).await
    }
}

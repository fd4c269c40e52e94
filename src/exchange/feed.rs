use super::auth::TokenSource;
use super::connection::SocketSession;
use super::registry::{SubscriberRegistry, Subscription};
use super::wire::{self, Inbound};
use crate::error::Result;
use crate::models::{Candle, OrderUpdate, Ticker};
use crate::store::PriceActionStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Fan-out point between the upstream read loops and per-symbol subscribers
///
/// Owns the price-action store, the three subscriber registries and the set
/// of symbols whose streams are active.
pub struct FeedHub {
    store: Arc<PriceActionStore>,
    candles: SubscriberRegistry<Candle>,
    tickers: SubscriberRegistry<Ticker>,
    orders: SubscriberRegistry<OrderUpdate>,
    active: RwLock<BTreeSet<String>>,
}

impl FeedHub {
    pub fn new(store: Arc<PriceActionStore>) -> Self {
        Self {
            store,
            candles: SubscriberRegistry::default(),
            tickers: SubscriberRegistry::default(),
            orders: SubscriberRegistry::default(),
            active: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn store(&self) -> Arc<PriceActionStore> {
        self.store.clone()
    }

    pub fn subscribe_candles(&self, symbol: &str) -> Subscription<Candle> {
        self.candles.subscribe(symbol)
    }

    pub fn subscribe_tickers(&self, symbol: &str) -> Subscription<Ticker> {
        self.tickers.subscribe(symbol)
    }

    pub fn subscribe_order_updates(&self, symbol: &str) -> Subscription<OrderUpdate> {
        self.orders.subscribe(symbol)
    }

    /// Mark a symbol active; false if it already was
    pub fn activate(&self, symbol: &str) -> bool {
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string())
    }

    /// Mark a symbol inactive; false if it was not active
    pub fn deactivate(&self, symbol: &str) -> bool {
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(symbol)
    }

    pub fn is_active(&self, symbol: &str) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(symbol)
    }

    /// Active symbols in sorted order
    pub fn active_symbols(&self) -> Vec<String> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Fold an inbound candle into the store, then publish the primary candle
    /// and a synthetic ticker at its close
    pub fn consume_candle(&self, inbound: &Candle) {
        let Some(candle) = self.store.ingest_inbound(inbound) else {
            return;
        };

        let ticker = Ticker {
            symbol: candle.symbol.clone(),
            price: candle.close,
            time: Utc::now(),
        };

        let dropped = self.candles.publish(&candle.symbol, &candle)
            + self.tickers.publish(&ticker.symbol, &ticker);
        if dropped > 0 {
            tracing::debug!(symbol = %candle.symbol, dropped, "slow subscribers dropped market data");
        }
    }

    pub fn publish_order(&self, update: &OrderUpdate) {
        let dropped = self.orders.publish(&update.symbol, update);
        if dropped > 0 {
            tracing::warn!(
                symbol = %update.symbol,
                order_id = %update.order_id,
                "order subscriber lagging, oldest update dropped"
            );
        }
    }

    /// Close every subscriber channel
    pub fn close_all(&self) {
        self.candles.close_all();
        self.tickers.close_all();
        self.orders.close_all();
    }
}

/// Public candles socket
pub struct MarketSession {
    hub: Arc<FeedHub>,
}

impl MarketSession {
    pub fn new(hub: Arc<FeedHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl SocketSession for MarketSession {
    fn name(&self) -> &'static str {
        "market"
    }

    async fn on_connect(&self) -> Result<Vec<String>> {
        let symbols = self.hub.active_symbols();
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![wire::market_subscription(&symbols, false)?])
    }

    fn on_text(&self, text: &str) {
        match wire::decode(text) {
            Ok(Inbound::Candles(candles)) => {
                for candle in &candles {
                    self.hub.consume_candle(candle);
                }
            }
            Ok(Inbound::Orders(_)) => {
                tracing::debug!("order frame on market socket ignored");
            }
            Ok(Inbound::Ignored(_)) => {}
            Err(e) => tracing::warn!(socket = "market", error = %e, "malformed frame skipped"),
        }
    }
}

/// Authenticated user order socket
pub struct UserSession {
    hub: Arc<FeedHub>,
    tokens: Arc<dyn TokenSource>,
}

impl UserSession {
    pub fn new(hub: Arc<FeedHub>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { hub, tokens }
    }

    /// Subscribe or unsubscribe frame with a fresh token
    pub async fn frame(&self, symbols: &[String], unsubscribe: bool) -> Result<String> {
        let token = self.tokens.bearer_token().await?;
        wire::user_subscription(symbols, &token, unsubscribe)
    }
}

#[async_trait]
impl SocketSession for UserSession {
    fn name(&self) -> &'static str {
        "user"
    }

    async fn on_connect(&self) -> Result<Vec<String>> {
        let symbols = self.hub.active_symbols();
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![self.frame(&symbols, false).await?])
    }

    fn on_text(&self, text: &str) {
        match wire::decode(text) {
            Ok(Inbound::Orders(orders)) => {
                for order in &orders {
                    self.hub.publish_order(order);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(socket = "user", error = %e, "malformed frame skipped"),
        }
    }
}

use super::feed::FeedHub;
use super::registry::Subscription;
use super::Exchange;
use crate::error::{OrchestratorError, Result};
use crate::models::{Candle, CandleSize, OrderAck, OrderUpdate, Side, Ticker};
use crate::store::{align_to_bucket, PriceActionStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Order call recorded by [`StubExchange`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOrder {
    Create { symbol: String, usd: f64, side: Side },
    SellTokens { symbol: String, tokens: f64 },
    Cancel { order_id: String },
}

/// In-memory venue over a real [`FeedHub`]; records every order call
pub struct StubExchange {
    hub: Arc<FeedHub>,
    balances: Mutex<HashMap<String, f64>>,
    orders: Mutex<Vec<RecordedOrder>>,
    next_id: AtomicUsize,
    pub reject_orders: AtomicBool,
}

impl StubExchange {
    pub fn new() -> Arc<Self> {
        let store = Arc::new(PriceActionStore::new(CandleSize::FiveMinutes));
        Arc::new(Self {
            hub: Arc::new(FeedHub::new(store)),
            balances: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            reject_orders: AtomicBool::new(false),
        })
    }

    pub fn hub(&self) -> &Arc<FeedHub> {
        &self.hub
    }

    pub fn set_balance(&self, currency: &str, amount: f64) {
        self.balances
            .lock()
            .unwrap()
            .insert(currency.to_string(), amount);
    }

    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn record(&self, order: RecordedOrder) {
        self.orders.lock().unwrap().push(order);
    }

    fn ack(&self) -> Result<OrderAck> {
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(OrchestratorError::OrderRejected("insufficient funds".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(OrderAck {
            order_id: format!("order-{id}"),
            success: true,
            error: None,
        })
    }
}

#[async_trait]
impl Exchange for StubExchange {
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
            let seeds = self.seed_histories(symbol, size).await?;
            store.add_symbol(symbol, size, seeds.primary, seeds.long);
        }
        self.hub.activate(symbol);
        Ok(())
    }

    async fn stop_symbol_stream(&self, symbol: &str) -> Result<()> {
        if self.hub.deactivate(symbol) {
            self.hub.store().remove_symbol(symbol);
        }
        Ok(())
    }

    async fn update_symbol_candle_size(&self, symbol: &str, size: CandleSize) -> Result<()> {
        let seeds = self.seed_histories(symbol, size).await?;
        self.hub.store().set_size(symbol, size, seeds.primary, seeds.long);
        Ok(())
    }

    async fn update_inbound_candle_size(&self, size: CandleSize) -> Result<()> {
        self.hub.store().set_inbound_size(size);
        Ok(())
    }

    async fn historical_candles(&self, symbol: &str, size: CandleSize) -> Result<Vec<Candle>> {
        let start = align_to_bucket(Utc::now(), size);
        Ok(vec![Candle::flat(symbol, start, 100.0, 1.0)])
    }

    async fn token_balances(&self) -> Result<HashMap<String, f64>> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn create_order(&self, symbol: &str, usd: f64, side: Side) -> Result<OrderAck> {
        self.record(RecordedOrder::Create {
            symbol: symbol.to_string(),
            usd,
            side,
        });
        self.ack()
    }

    async fn sell_tokens(&self, symbol: &str, tokens: f64) -> Result<OrderAck> {
        self.record(RecordedOrder::SellTokens {
            symbol: symbol.to_string(),
            tokens,
        });
        self.ack()
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.record(RecordedOrder::Cancel {
            order_id: order_id.to_string(),
        });
        Ok(())
    }
}

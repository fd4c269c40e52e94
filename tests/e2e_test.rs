use algo_orchestrator::channel::{latest_channel, LatestSender};
use algo_orchestrator::exchange::{
    ConnectionState, Exchange, FeedHub, MarketSession, SocketSupervisor, SocketTiming, Subscription,
};
use algo_orchestrator::manager::{Manager, ManagerConfig, ManagerParams};
use algo_orchestrator::signaler::SignalerConfig;
use algo_orchestrator::store::{align_to_bucket, PriceActionStore};
use algo_orchestrator::trader::{Trader, TraderChannels, TraderConfig, TraderState};
use algo_orchestrator::{
    Candle, CandleSize, OrderAck, OrderStatus, OrderUpdate, ProfitLossUpdate, Result, Side, Signal,
    StrategyKind, Ticker, TradeCfg,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

// ============================================================================
// In-memory venue
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Placed {
    Create { symbol: String, usd: f64, side: Side },
    SellTokens { symbol: String, tokens: f64 },
    Cancel { order_id: String },
}

/// Venue over a real feed hub and price-action store that records order calls
struct MockExchange {
    hub: Arc<FeedHub>,
    placed: Mutex<Vec<Placed>>,
    balances: Mutex<HashMap<String, f64>>,
    next_id: AtomicUsize,
}

impl MockExchange {
    fn new() -> Arc<Self> {
        let store = Arc::new(PriceActionStore::new(CandleSize::FiveMinutes));
        Arc::new(Self {
            hub: Arc::new(FeedHub::new(store)),
            placed: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        })
    }

    /// Seed a symbol with flat history at `price` and mark its stream active
    fn seed(&self, symbol: &str, price: f64) {
        let store = self.hub.store();
        store.add_symbol(
            symbol,
            CandleSize::FiveMinutes,
            flat_history(symbol, CandleSize::FiveMinutes, price, 30),
            flat_history(symbol, CandleSize::ThirtyMinutes, price, 30),
        );
        self.hub.activate(symbol);
    }

    /// Push an inbound candle closing at `price` through the fan-out
    fn tick(&self, symbol: &str, price: f64) {
        let start = align_to_bucket(Utc::now(), CandleSize::FiveMinutes);
        self.hub.consume_candle(&Candle::flat(symbol, start, price, 1.0));
    }

    fn fill(&self, symbol: &str, order_id: &str, filled_qty: f64, leaves: f64) {
        self.hub.publish_order(&OrderUpdate {
            symbol: symbol.to_string(),
            order_id: order_id.to_string(),
            status: OrderStatus::Filled,
            filled_qty,
            filled_value: filled_qty * 100.0,
            leaves,
            price: 100.0,
            side: Side::Buy,
            time: Utc::now(),
        });
    }

    fn set_balance(&self, currency: &str, tokens: f64) {
        self.balances.lock().unwrap().insert(currency.to_string(), tokens);
    }

    fn placed(&self) -> Vec<Placed> {
        self.placed.lock().unwrap().clone()
    }

    fn record(&self, order: Placed) -> OrderAck {
        self.placed.lock().unwrap().push(order);
        OrderAck {
            order_id: format!("order-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            success: true,
            error: None,
        }
    }
}

fn flat_history(symbol: &str, size: CandleSize, price: f64, count: i64) -> Vec<Candle> {
    let newest = align_to_bucket(Utc::now(), size);
    (0..count)
        .rev()
        .map(|i| {
            let start = newest - ChronoDuration::seconds(size.seconds() * i);
            Candle::flat(symbol, start, price, 1.0)
        })
        .collect()
}

#[async_trait]
impl Exchange for MockExchange {
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
        Ok(flat_history(symbol, size, 100.0, 30))
    }

    async fn token_balances(&self) -> Result<HashMap<String, f64>> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn create_order(&self, symbol: &str, usd: f64, side: Side) -> Result<OrderAck> {
        Ok(self.record(Placed::Create {
            symbol: symbol.to_string(),
            usd,
            side,
        }))
    }

    async fn sell_tokens(&self, symbol: &str, tokens: f64) -> Result<OrderAck> {
        Ok(self.record(Placed::SellTokens {
            symbol: symbol.to_string(),
            tokens,
        }))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.record(Placed::Cancel {
            order_id: order_id.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct RunningTrader {
    signals: mpsc::Sender<Signal>,
    updates: LatestSender<TradeCfg>,
    state: watch::Receiver<TraderState>,
    cancel: CancellationToken,
    done: tokio::task::JoinHandle<()>,
}

fn spawn_trader(exchange: &Arc<MockExchange>, symbol: &str, allocated_funds: f64) -> RunningTrader {
    let (signal_tx, signal_rx) = mpsc::channel(1);
    let (updates_tx, updates_rx) = latest_channel(4);
    let (pl_tx, _pl_rx) = latest_channel(16);

    let trader = Trader::new(
        TradeCfg {
            symbol: symbol.to_string(),
            allocated_funds,
            strategy: StrategyKind::DonchianChannel,
            candle_size: CandleSize::FiveMinutes,
        },
        exchange.clone(),
        TraderChannels {
            signals: signal_rx,
            updates: updates_rx,
            profit_loss: pl_tx,
        },
        0.0,
        TraderConfig {
            reconcile_interval_ms: 50,
            ..TraderConfig::default()
        },
    );
    let state = trader.watch_state();
    let cancel = CancellationToken::new();
    let done = tokio::spawn(trader.run(cancel.clone()));

    RunningTrader {
        signals: signal_tx,
        updates: updates_tx,
        state,
        cancel,
        done,
    }
}

async fn wait_state(
    state: &mut watch::Receiver<TraderState>,
    check: impl FnMut(&TraderState) -> bool,
) -> TraderState {
    timeout(Duration::from_secs(5), state.wait_for(check))
        .await
        .expect("trader state never reached")
        .expect("trader stopped")
        .clone()
}

fn manager_for(exchange: &Arc<MockExchange>, universe: &[&str]) -> Arc<Manager> {
    Manager::new(
        exchange.clone(),
        ManagerParams {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            total_funds: 1000.0,
            daily_max_pl: 100.0,
            default_strategy: StrategyKind::DonchianChannel,
            default_candle_size: CandleSize::FiveMinutes,
        },
        ManagerConfig::default(),
        SignalerConfig {
            emit_interval_ms: 0,
            poll_interval_ms: 20,
            ..SignalerConfig::default()
        },
        TraderConfig::default(),
    )
    .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_happy_path_buy() {
    let exchange = MockExchange::new();
    exchange.seed("X-USD", 100.0);
    let mut trader = spawn_trader(&exchange, "X-USD", 1000.0);

    exchange.tick("X-USD", 100.0);
    trader.signals.send(Signal::buy("X-USD", 50.0)).await.unwrap();

    let state = wait_state(&mut trader.state, |s| s.pending_order.is_some()).await;
    assert_eq!(state.target_position_usd, 500.0);
    assert_eq!(state.current_price, 100.0);
    assert_eq!(
        exchange.placed(),
        vec![Placed::Create {
            symbol: "X-USD".to_string(),
            usd: 500.0,
            side: Side::Buy
        }]
    );

    exchange.fill("X-USD", "order-1", 5.0, 0.0);
    let state = wait_state(&mut trader.state, |s| s.pending_order.is_none()).await;
    assert_eq!(state.actual_position_tokens, 5.0);
    assert_eq!(state.usd_per_fulfilled_orders, 500.0);

    // position matches target, so no further orders follow
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(exchange.placed().len(), 1);

    trader.cancel.cancel();
    trader.done.await.unwrap();
}

#[tokio::test]
async fn test_partial_fill_reconciliation() {
    let exchange = MockExchange::new();
    exchange.seed("X-USD", 100.0);
    let mut trader = spawn_trader(&exchange, "X-USD", 1000.0);

    exchange.tick("X-USD", 100.0);
    trader.signals.send(Signal::buy("X-USD", 50.0)).await.unwrap();
    wait_state(&mut trader.state, |s| s.pending_order.is_some()).await;

    exchange.fill("X-USD", "order-1", 2.0, 300.0);
    let state = wait_state(&mut trader.state, |s| s.actual_position_tokens == 2.0).await;
    assert_eq!(state.usd_per_fulfilled_orders, 200.0);
    let pending = state.pending_order.expect("order still open");
    assert_eq!(pending.remaining_usd, 300.0);
    assert_eq!(pending.filled_usd, 200.0);

    exchange.fill("X-USD", "order-1", 5.0, 0.0);
    let state = wait_state(&mut trader.state, |s| s.pending_order.is_none()).await;
    assert_eq!(state.actual_position_tokens, 5.0);
    assert_eq!(state.usd_per_fulfilled_orders, 500.0);

    // the open remainder counted toward the position, so only one order was placed
    assert_eq!(exchange.placed().len(), 1);

    trader.cancel.cancel();
    trader.done.await.unwrap();
}

#[tokio::test]
async fn test_slow_subscriber_drops_only_its_own_traffic() {
    let exchange = MockExchange::new();
    exchange.seed("X-USD", 100.0);

    let fast = exchange.subscribe_candles("X-USD");
    let slow = exchange.subscribe_candles("X-USD");

    let mut received = 0;
    for i in 0..100 {
        exchange.tick("X-USD", 100.0 + i as f64);
        assert!(slow.len() <= slow.capacity());
        while fast.try_recv().is_some() {
            received += 1;
        }
    }

    assert_eq!(received, 100);
    assert_eq!(slow.len(), slow.capacity());

    // the slow reader only sees the newest candles
    let mut last_close = 0.0;
    while let Some(candle) = slow.try_recv() {
        last_close = candle.close;
    }
    assert_eq!(last_close, 199.0);
}

fn assert_subscribe(frame: &str, symbols: &[&str]) {
    let frame: serde_json::Value = serde_json::from_str(frame).unwrap();
    assert_eq!(frame["type"], "subscribe");
    assert_eq!(frame["channel"], "candles");
    assert_eq!(frame["product_ids"], serde_json::json!(symbols));
}

async fn next_text<S>(ws: &mut S) -> String
where
    S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame from client")
            .expect("client hung up")
            .unwrap();
        if let Message::Text(text) = message {
            return text;
        }
    }
}

#[tokio::test]
async fn test_reconnect_resubscribes_before_publishing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let exchange = MockExchange::new();
    exchange.seed("A-USD", 100.0);
    exchange.seed("B-USD", 100.0);
    let candles = exchange.subscribe_candles("A-USD");

    let supervisor = Arc::new(SocketSupervisor::new(
        url,
        Arc::new(MarketSession::new(exchange.hub.clone())),
        SocketTiming::default(),
    ));
    let mut state = supervisor.state();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(supervisor.clone().run(cancel.clone()));

    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    assert_subscribe(&next_text(&mut ws).await, &["A-USD", "B-USD"]);
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    drop(ws);
    let killed = Instant::now();

    let (stream, _) = timeout(Duration::from_secs(10), listener.accept())
        .await
        .expect("client never redialed")
        .unwrap();
    assert!(killed.elapsed() >= Duration::from_secs(1));

    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    assert_subscribe(&next_text(&mut ws).await, &["A-USD", "B-USD"]);
    assert!(candles.try_recv().is_none());

    let start = align_to_bucket(Utc::now(), CandleSize::FiveMinutes).timestamp();
    let frame = serde_json::json!({
        "channel": "candles",
        "events": [{
            "type": "update",
            "candles": [{
                "start": start.to_string(),
                "open": "100", "high": "102", "low": "99", "close": "101.5",
                "volume": "3", "product_id": "A-USD"
            }]
        }]
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let candle = timeout(Duration::from_secs(5), candles.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(candle.close, 101.5);

    cancel.cancel();
    timeout(Duration::from_secs(10), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_pl_guard_stops_fleet() {
    let exchange = MockExchange::new();
    exchange.set_balance("A", 2.0);
    exchange.set_balance("B", 3.0);
    let manager = manager_for(&exchange, &["A-USD", "B-USD"]);
    let mut halted = manager.halted();

    manager.start("A-USD").await.unwrap();
    manager.start("B-USD").await.unwrap();
    assert_eq!(manager.trader_state("A-USD").unwrap().actual_position_tokens, 2.0);
    let mut traders = vec![
        manager.watch_trader("A-USD").unwrap(),
        manager.watch_trader("B-USD").unwrap(),
    ];

    let now = Utc::now();
    manager.record_profit_loss(ProfitLossUpdate {
        symbol: "A-USD".to_string(),
        profit_loss: 60.0,
        time: now,
    });
    manager.record_profit_loss(ProfitLossUpdate {
        symbol: "B-USD".to_string(),
        profit_loss: 41.0,
        time: now,
    });

    let tripped = Instant::now();
    timeout(Duration::from_secs(2), halted.wait_for(|h| *h))
        .await
        .expect("guard never tripped")
        .unwrap();
    assert!(tripped.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.daily_profit_loss(), 101.0);

    timeout(Duration::from_secs(22), async {
        while !manager.running_symbols().is_empty() || !manager.signaler().is_stopped() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("fleet never drained");

    // each trader ran its close-out to completion
    for state in traders.iter_mut() {
        timeout(Duration::from_secs(5), async {
            while state.changed().await.is_ok() {}
        })
        .await
        .expect("trader task never finished");
    }
    let placed = exchange.placed();
    for (symbol, tokens) in [("A-USD", 2.0), ("B-USD", 3.0)] {
        assert!(
            placed.contains(&Placed::SellTokens {
                symbol: symbol.to_string(),
                tokens
            }),
            "no close-out sell for {symbol}: {placed:?}"
        );
    }

    let placed = placed.len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(exchange.placed().len(), placed);
    assert!(manager.start("A-USD").await.is_err());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_fund_reallocation_pushes_config() {
    let exchange = MockExchange::new();
    let manager = manager_for(&exchange, &["A-USD", "B-USD"]);

    manager.start("A-USD").await.unwrap();
    assert_eq!(manager.trade_cfg("A-USD").unwrap().allocated_funds, 1000.0);

    // a breakout above the flat history makes the Donchian strategy buy the full allocation
    timeout(Duration::from_secs(5), async {
        loop {
            exchange.tick("A-USD", 120.0);
            let target = manager.trader_state("A-USD").unwrap().target_position_usd;
            if target == 1000.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("breakout signal never reached the trader");

    manager.start("B-USD").await.unwrap();
    assert_eq!(manager.trade_cfg("A-USD").unwrap().allocated_funds, 500.0);
    assert_eq!(manager.trade_cfg("B-USD").unwrap().allocated_funds, 500.0);

    // the running trader applied the halved allocation and kept its full share
    let mut a_state = manager.watch_trader("A-USD").unwrap();
    let state = wait_state(&mut a_state, |s| s.target_position_usd == 500.0).await;
    assert_eq!(state.current_price, 120.0);
    assert_eq!(manager.trader_state("A-USD").unwrap().target_position_usd, 500.0);
    assert_eq!(manager.trader_state("B-USD").unwrap().target_position_usd, 0.0);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reallocation_keeps_target_share() {
    let exchange = MockExchange::new();
    exchange.seed("A-USD", 100.0);
    exchange.seed("B-USD", 100.0);
    let mut traders = vec![
        ("A-USD", spawn_trader(&exchange, "A-USD", 1000.0)),
        ("B-USD", spawn_trader(&exchange, "B-USD", 1000.0)),
    ];

    for (symbol, trader) in traders.iter_mut() {
        trader.signals.send(Signal::buy(symbol, 50.0)).await.unwrap();
        wait_state(&mut trader.state, |s| s.target_position_usd == 500.0).await;
    }

    for (symbol, trader) in traders.iter_mut() {
        trader.updates.enqueue_latest(TradeCfg {
            symbol: symbol.to_string(),
            allocated_funds: 500.0,
            strategy: StrategyKind::DonchianChannel,
            candle_size: CandleSize::FiveMinutes,
        });
        wait_state(&mut trader.state, |s| s.target_position_usd == 250.0).await;
    }

    for (_, trader) in traders {
        trader.cancel.cancel();
        trader.done.await.unwrap();
    }

    // each trader cancelled its open buy on the way out and held nothing to sell
    let cancels = exchange
        .placed()
        .into_iter()
        .filter(|p| matches!(p, Placed::Cancel { .. }))
        .count();
    assert_eq!(cancels, 2);
}

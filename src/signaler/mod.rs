// Signaler module
// One evaluation loop per symbol, each owning its strategy instance

use crate::error::{OrchestratorError, Result};
use crate::exchange::{Exchange, Subscription, SymbolSeeds};
use crate::models::{Candle, CandleSize, Signal, StrategyKind, Ticker};
use crate::store::PriceActionStore;
use crate::strategy::{build_strategy, Strategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Signal engine timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalerConfig {
    pub emit_interval_ms: u64,   // Debounce between delivered signals
    pub publish_timeout_ms: u64, // Give up on a busy trader after this
    pub drain_batch: usize,      // Feed items pulled per iteration
    pub poll_interval_ms: u64,   // Wake-up cadence when feeds are quiet
}

impl Default for SignalerConfig {
    fn default() -> Self {
        Self {
            emit_interval_ms: 60_000,
            publish_timeout_ms: 100,
            drain_batch: 10,
            poll_interval_ms: 500,
        }
    }
}

impl SignalerConfig {
    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Strategy currently driving a symbol; swapped in place on strategy changes
#[derive(Clone)]
struct StrategySlot(Arc<RwLock<Arc<dyn Strategy>>>);

impl StrategySlot {
    fn new(strategy: Arc<dyn Strategy>) -> Self {
        Self(Arc::new(RwLock::new(strategy)))
    }

    fn current(&self) -> Arc<dyn Strategy> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace(&self, strategy: Arc<dyn Strategy>) -> Arc<dyn Strategy> {
        let mut slot = self.0.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, strategy)
    }
}

struct SymbolWorker {
    kind: StrategyKind,
    strategy: StrategySlot,
    cancel: CancellationToken,
}

/// Periodically turns price action into signals for every registered symbol
pub struct SignalEngine {
    exchange: Arc<dyn Exchange>,
    store: Arc<PriceActionStore>,
    config: SignalerConfig,
    cancel: Mutex<CancellationToken>,
    tracker: TaskTracker,
    workers: Mutex<HashMap<String, SymbolWorker>>,
}

impl SignalEngine {
    pub fn new(exchange: Arc<dyn Exchange>, config: SignalerConfig) -> Self {
        Self {
            store: exchange.store(),
            exchange,
            config,
            cancel: Mutex::new(CancellationToken::new()),
            tracker: TaskTracker::new(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<String, SymbolWorker>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn root(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Seed the store for `symbol` and start its evaluation loop
    pub fn register_symbol(
        &self,
        symbol: &str,
        kind: StrategyKind,
        size: CandleSize,
        signal_tx: mpsc::Sender<Signal>,
        seeds: SymbolSeeds,
    ) -> Result<()> {
        self.register(symbol, kind, build_strategy(kind), size, signal_tx, seeds)
    }

    fn register(
        &self,
        symbol: &str,
        kind: StrategyKind,
        strategy: Arc<dyn Strategy>,
        size: CandleSize,
        signal_tx: mpsc::Sender<Signal>,
        seeds: SymbolSeeds,
    ) -> Result<()> {
        let root = self.root();
        if root.is_cancelled() {
            return Err(OrchestratorError::Halted("signal engine stopped".to_string()));
        }

        if self.is_registered(symbol) {
            return Err(OrchestratorError::AlreadyRunning(symbol.to_string()));
        }

        self.store.add_symbol(symbol, size, seeds.primary, seeds.long);

        let slot = StrategySlot::new(strategy);
        let cancel = root.child_token();
        let worker_loop = SymbolLoop {
            symbol: symbol.to_string(),
            strategy: slot.clone(),
            store: self.store.clone(),
            candles: self.exchange.subscribe_candles(symbol),
            tickers: self.exchange.subscribe_tickers(symbol),
            signal_tx,
            config: self.config.clone(),
            last_signal_at: None,
        };
        self.tracker.spawn(worker_loop.run(cancel.clone()));

        self.workers().insert(
            symbol.to_string(),
            SymbolWorker {
                kind,
                strategy: slot,
                cancel,
            },
        );

        tracing::info!(symbol, strategy = %kind, size = %size, "🎯 symbol registered with signal engine");
        Ok(())
    }

    /// Stop a symbol's loop and forget its state; no-op when unknown
    pub fn unregister_symbol(&self, symbol: &str) {
        let Some(worker) = self.workers().remove(symbol) else {
            return;
        };

        worker.cancel.cancel();
        worker.strategy.current().reset_symbol(symbol);
        self.store.remove_symbol(symbol);
        tracing::info!(symbol, "symbol unregistered from signal engine");
    }

    /// Swap the strategy of a running symbol and reseed its series at `size`
    pub fn update_strategy(
        &self,
        symbol: &str,
        kind: StrategyKind,
        size: CandleSize,
        seeds: SymbolSeeds,
    ) -> Result<()> {
        let mut workers = self.workers();
        let worker = workers
            .get_mut(symbol)
            .ok_or_else(|| OrchestratorError::NotRunning(symbol.to_string()))?;

        let previous = worker.strategy.replace(build_strategy(kind));
        worker.kind = kind;
        drop(workers);

        previous.reset_symbol(symbol);

        self.store.set_size(symbol, size, seeds.primary, seeds.long);
        tracing::info!(symbol, strategy = %kind, size = %size, "strategy updated");
        Ok(())
    }

    pub fn strategy_kind(&self, symbol: &str) -> Option<StrategyKind> {
        self.workers().get(symbol).map(|worker| worker.kind)
    }

    pub fn is_registered(&self, symbol: &str) -> bool {
        self.workers().contains_key(symbol)
    }

    pub fn registered_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.workers().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Cancel every loop; registrations are refused until [`SignalEngine::restart`]
    pub fn stop(&self) {
        self.root().cancel();
        self.workers().clear();
        self.tracker.close();
        tracing::info!("signal engine stopped");
    }

    /// Accept registrations again after a stop
    pub fn restart(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
            self.tracker.reopen();
            tracing::info!("signal engine restarted");
        }
    }

    /// Wait for every loop to exit after [`SignalEngine::stop`]
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.root().is_cancelled()
    }
}

struct SymbolLoop {
    symbol: String,
    strategy: StrategySlot,
    store: Arc<PriceActionStore>,
    candles: Subscription<Candle>,
    tickers: Subscription<Ticker>,
    signal_tx: mpsc::Sender<Signal>,
    config: SignalerConfig,
    last_signal_at: Option<Instant>,
}

impl SymbolLoop {
    async fn run(mut self, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let feeds_closed = self.candles.is_closed() && self.tickers.is_closed();

            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(ticker) = self.tickers.recv(), if !self.tickers.is_closed() => {
                    self.on_ticker(&ticker);
                }
                Some(_) = self.candles.recv(), if !self.candles.is_closed() => {}
                _ = poll.tick() => {
                    if feeds_closed {
                        tracing::warn!(symbol = %self.symbol, "market feeds closed, signal loop exiting");
                        break;
                    }
                }
            }

            self.drain();

            if !self.maybe_emit().await {
                break;
            }
        }

        tracing::debug!(symbol = %self.symbol, "signal loop stopped");
    }

    fn on_ticker(&self, ticker: &Ticker) {
        self.strategy
            .current()
            .update_trailing_stop(&self.symbol, ticker);
    }

    /// Pull at most one batch of queued feed items without waiting
    fn drain(&self) {
        for _ in 0..self.config.drain_batch {
            if let Some(ticker) = self.tickers.try_recv() {
                self.on_ticker(&ticker);
                continue;
            }
            // Candles are already folded into the store by the exchange
            if self.candles.try_recv().is_some() {
                continue;
            }
            break;
        }
    }

    /// Returns false once the trader side of the signal channel is gone
    async fn maybe_emit(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_signal_at {
            if now.duration_since(last) <= self.config.emit_interval() {
                return true;
            }
        }

        let strategy = self.strategy.current();
        let signal = strategy.calculate_signal(&self.symbol, &self.store);

        // HOLD is never delivered; confirming it would clear an open position
        if signal.is_hold() {
            self.last_signal_at = Some(now);
            return true;
        }

        match tokio::time::timeout(
            self.config.publish_timeout(),
            self.signal_tx.send(signal.clone()),
        )
        .await
        {
            Ok(Ok(())) => {
                strategy.confirm_signal_delivered(&self.symbol, &signal);
                self.last_signal_at = Some(Instant::now());
                tracing::info!(
                    symbol = %self.symbol,
                    strategy = strategy.name(),
                    signal = ?signal.signal_type,
                    percent = signal.percent,
                    "📣 signal emitted"
                );
                true
            }
            Ok(Err(_)) => {
                tracing::debug!(symbol = %self.symbol, "signal receiver dropped");
                false
            }
            Err(_) => {
                tracing::warn!(
                    symbol = %self.symbol,
                    signal = ?signal.signal_type,
                    "trader busy, signal dropped"
                );
                true
            }
        }
    }
}

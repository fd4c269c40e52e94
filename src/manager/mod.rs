// Manager module
// Supervises the per-symbol traders, fund allocation and the daily P/L guard
pub mod pl_guard;

pub use pl_guard::{DailyPnlGuard, PnlTrip};

use crate::channel::{latest_channel, LatestReceiver, LatestSender};
use crate::error::{OrchestratorError, Result};
use crate::exchange::Exchange;
use crate::models::{
    base_currency, Candle, CandleSize, ProfitLossUpdate, Signal, StrategyKind, Ticker, TradeCfg,
};
use crate::signaler::{SignalEngine, SignalerConfig};
use crate::trader::{Trader, TraderChannels, TraderConfig, TraderState, CONFIG_UPDATES_CAPACITY};
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const PROFIT_LOSS_CAPACITY: usize = 256;

/// Supervisor timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub supervisor_interval_ms: u64, // P/L guard cadence
    pub stop_timeout_ms: u64,        // Wait for one trader to close out
    pub stop_all_timeout_ms: u64,    // Wait for the whole fleet
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            supervisor_interval_ms: 200,
            stop_timeout_ms: 19_000,
            stop_all_timeout_ms: 22_000,
        }
    }
}

impl ManagerConfig {
    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor_interval_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn stop_all_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_all_timeout_ms)
    }
}

/// Startup parameters of the fleet
#[derive(Debug, Clone)]
pub struct ManagerParams {
    pub universe: Vec<String>,
    pub total_funds: f64,
    pub daily_max_pl: f64,
    pub default_strategy: StrategyKind,
    pub default_candle_size: CandleSize,
}

/// Per-symbol settings, kept whether or not the symbol is running
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SymbolConfig {
    pub strategy: StrategyKind,
    pub candle_size: CandleSize,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerCfg {
    pub total_funds: f64,
    pub daily_max_pl: f64,
    pub symbols: BTreeMap<String, SymbolConfig>,
}

struct TraderHandle {
    cfg: TradeCfg,
    cancel: CancellationToken,
    updates: LatestSender<TradeCfg>,
    state: watch::Receiver<TraderState>,
    done: JoinHandle<()>,
}

/// Top-level supervisor of the trading fleet
pub struct Manager {
    exchange: Arc<dyn Exchange>,
    signaler: SignalEngine,
    config: ManagerConfig,
    trader_config: TraderConfig,
    universe: Vec<String>,
    cfg: Mutex<ManagerCfg>,
    traders: Mutex<HashMap<String, TraderHandle>>,
    balances: Mutex<HashMap<String, f64>>,
    guard: Mutex<DailyPnlGuard>,
    profit_loss: LatestSender<ProfitLossUpdate>,
    /// Serializes start/stop/update so the registry never sees interleaved control flows
    control: tokio::sync::Mutex<()>,
    halted: watch::Sender<bool>,
    watchers: TaskTracker,
    cancel: CancellationToken,
}

impl Manager {
    /// Build the manager with every symbol disabled and spawn its supervisor
    pub fn new(
        exchange: Arc<dyn Exchange>,
        params: ManagerParams,
        config: ManagerConfig,
        signaler_config: SignalerConfig,
        trader_config: TraderConfig,
    ) -> Result<Arc<Self>> {
        if params.universe.is_empty() {
            return Err(OrchestratorError::Config("universe is empty".to_string()));
        }
        if params.total_funds <= 0.0 {
            return Err(OrchestratorError::Config(format!(
                "total funds must be positive, got {}",
                params.total_funds
            )));
        }

        let symbols = params
            .universe
            .iter()
            .map(|symbol| {
                (
                    symbol.clone(),
                    SymbolConfig {
                        strategy: params.default_strategy,
                        candle_size: params.default_candle_size,
                        enabled: false,
                    },
                )
            })
            .collect();

        let (profit_loss, pl_rx) = latest_channel(PROFIT_LOSS_CAPACITY);
        let (halted, _) = watch::channel(false);

        let manager = Arc::new(Self {
            signaler: SignalEngine::new(exchange.clone(), signaler_config),
            exchange,
            config,
            trader_config,
            universe: params.universe,
            cfg: Mutex::new(ManagerCfg {
                total_funds: params.total_funds,
                daily_max_pl: params.daily_max_pl,
                symbols,
            }),
            traders: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            guard: Mutex::new(DailyPnlGuard::new(params.daily_max_pl, Utc::now())),
            profit_loss,
            control: tokio::sync::Mutex::new(()),
            halted,
            watchers: TaskTracker::new(),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(manager.clone().supervise(pl_rx));

        tracing::info!(
            symbols = manager.universe.len(),
            total_funds = params.total_funds,
            daily_max_pl = params.daily_max_pl,
            "📊 manager ready"
        );
        Ok(manager)
    }

    fn cfg_lock(&self) -> MutexGuard<'_, ManagerCfg> {
        self.cfg.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn traders(&self) -> MutexGuard<'_, HashMap<String, TraderHandle>> {
        self.traders.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn guard(&self) -> MutexGuard<'_, DailyPnlGuard> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_known(&self, symbol: &str) -> Result<()> {
        if self.universe.iter().any(|s| s == symbol) {
            Ok(())
        } else {
            Err(OrchestratorError::UnknownSymbol(symbol.to_string()))
        }
    }

    fn symbol_config(&self, symbol: &str) -> Result<SymbolConfig> {
        self.cfg_lock()
            .symbols
            .get(symbol)
            .copied()
            .ok_or_else(|| OrchestratorError::UnknownSymbol(symbol.to_string()))
    }

    fn set_enabled(&self, symbol: &str, enabled: bool) {
        if let Some(symbol_cfg) = self.cfg_lock().symbols.get_mut(symbol) {
            symbol_cfg.enabled = enabled;
        }
    }

    async fn supervise(self: Arc<Self>, pl_rx: LatestReceiver<ProfitLossUpdate>) {
        let mut tick = tokio::time::interval(self.config.supervisor_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            let now = Utc::now();
            let verdict = {
                let mut guard = self.guard();
                while let Some(update) = pl_rx.try_recv() {
                    guard.record(&update, now);
                }
                guard.check(now)
            };

            if let Err(trip) = verdict {
                if !*self.halted.borrow() {
                    tracing::error!(
                        total = trip.total,
                        limit = trip.limit,
                        day = %trip.day,
                        "🚨 daily P/L limit exceeded, stopping all traders"
                    );
                    self.halted.send_replace(true);
                    self.stop_all().await;
                }
            }
        }

        tracing::debug!("manager supervisor stopped");
    }

    /// Start trading `symbol` with its configured strategy and candle size
    pub async fn start(self: &Arc<Self>, symbol: &str) -> Result<()> {
        let _control = self.control.lock().await;
        self.start_locked(symbol).await
    }

    async fn start_locked(self: &Arc<Self>, symbol: &str) -> Result<()> {
        if *self.halted.borrow() {
            return Err(OrchestratorError::Halted(
                "daily P/L limit reached; raise it to resume".to_string(),
            ));
        }
        let symbol_cfg = self.symbol_config(symbol)?;
        if self.traders().contains_key(symbol) {
            return Err(OrchestratorError::AlreadyRunning(symbol.to_string()));
        }

        let seeds = self
            .exchange
            .seed_histories(symbol, symbol_cfg.candle_size)
            .await?;

        let (signal_tx, signal_rx) = mpsc::channel::<Signal>(1);
        self.signaler.register_symbol(
            symbol,
            symbol_cfg.strategy,
            symbol_cfg.candle_size,
            signal_tx,
            seeds,
        )?;

        if let Err(e) = self
            .exchange
            .start_symbol_stream(symbol, symbol_cfg.candle_size)
            .await
        {
            self.signaler.unregister_symbol(symbol);
            return Err(e);
        }

        let starting_tokens = match self.refresh_balances().await {
            Ok(balances) => balances.get(base_currency(symbol)).copied().unwrap_or(0.0),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "balance refresh failed, using cached balances");
                self.balance(base_currency(symbol))
            }
        };

        let running = self.traders().len();
        let total_funds = self.cfg_lock().total_funds;
        let cfg = TradeCfg {
            symbol: symbol.to_string(),
            allocated_funds: total_funds / (running + 1) as f64,
            strategy: symbol_cfg.strategy,
            candle_size: symbol_cfg.candle_size,
        };

        let (updates_tx, updates_rx) = latest_channel(CONFIG_UPDATES_CAPACITY);
        let trader = Trader::new(
            cfg.clone(),
            self.exchange.clone(),
            TraderChannels {
                signals: signal_rx,
                updates: updates_rx,
                profit_loss: self.profit_loss.clone(),
            },
            starting_tokens,
            self.trader_config.clone(),
        );
        let state = trader.watch_state();
        let cancel = self.cancel.child_token();
        let done = tokio::spawn(trader.run(cancel.clone()));

        self.traders().insert(
            symbol.to_string(),
            TraderHandle {
                cfg,
                cancel,
                updates: updates_tx,
                state,
                done,
            },
        );
        self.set_enabled(symbol, true);
        self.reallocate();

        tracing::info!(
            symbol,
            strategy = %symbol_cfg.strategy,
            size = %symbol_cfg.candle_size,
            tokens = starting_tokens,
            "🚀 trader started"
        );
        Ok(())
    }

    /// Stop a running trader; its close-out is awaited in the background
    pub async fn stop(self: &Arc<Self>, symbol: &str) -> Result<()> {
        let _control = self.control.lock().await;
        self.stop_locked(symbol).await
    }

    async fn stop_locked(self: &Arc<Self>, symbol: &str) -> Result<()> {
        self.ensure_known(symbol)?;
        let handle = self
            .traders()
            .remove(symbol)
            .ok_or_else(|| OrchestratorError::NotRunning(symbol.to_string()))?;

        let done = self.detach(symbol, handle).await;

        let manager = self.clone();
        let symbol = symbol.to_string();
        let timeout = self.config.stop_timeout();
        self.watchers.spawn(async move {
            match tokio::time::timeout(timeout, done).await {
                Ok(_) => {
                    tracing::info!(symbol = %symbol, "trader stopped cleanly");
                    if !manager.cancel.is_cancelled() && !*manager.halted.borrow() {
                        manager.reallocate();
                    }
                }
                Err(_) => tracing::warn!(
                    symbol = %symbol,
                    "trader did not stop in time; reconcile exchange positions before restarting"
                ),
            }
        });

        Ok(())
    }

    /// Cancel a removed trader and release its signaler and stream resources
    async fn detach(&self, symbol: &str, handle: TraderHandle) -> JoinHandle<()> {
        handle.cancel.cancel();
        handle.updates.close();
        self.signaler.unregister_symbol(symbol);
        if let Err(e) = self.exchange.stop_symbol_stream(symbol).await {
            tracing::warn!(symbol, error = %e, "failed to stop symbol stream");
        }
        self.set_enabled(symbol, false);
        handle.done
    }

    /// Stop every trader and the signaler, waiting for the fleet within budget
    pub async fn stop_all(&self) {
        let _control = self.control.lock().await;

        let handles: Vec<(String, TraderHandle)> = self.traders().drain().collect();
        tracing::info!(traders = handles.len(), "stopping all traders");

        let mut waits = Vec::with_capacity(handles.len());
        for (symbol, handle) in handles {
            let done = self.detach(&symbol, handle).await;
            waits.push(async move { (symbol, done.await) });
        }
        self.signaler.stop();

        let drain = async {
            let results = join_all(waits).await;
            self.signaler.wait().await;
            results
        };

        match tokio::time::timeout(self.config.stop_all_timeout(), drain).await {
            Ok(results) => {
                for (symbol, result) in results {
                    if let Err(e) = result {
                        tracing::error!(symbol = %symbol, error = %e, "trader task failed");
                    }
                }
                tracing::info!("all traders stopped cleanly");
            }
            Err(_) => tracing::error!("timed out waiting for traders to stop"),
        }
    }

    /// Stop everything and end the supervisor
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.cancel.cancel();
        self.watchers.close();
        let _ = tokio::time::timeout(self.config.stop_timeout(), self.watchers.wait()).await;
    }

    /// Start a stopped symbol or stop a running one; returns whether it now runs
    pub async fn toggle_symbol(self: &Arc<Self>, symbol: &str) -> Result<bool> {
        let _control = self.control.lock().await;
        self.ensure_known(symbol)?;
        if self.traders().contains_key(symbol) {
            self.stop_locked(symbol).await?;
            Ok(false)
        } else {
            self.start_locked(symbol).await?;
            Ok(true)
        }
    }

    /// Split total funds evenly across running traders
    fn reallocate(&self) {
        let total_funds = self.cfg_lock().total_funds;
        let pushes: Vec<(LatestSender<TradeCfg>, TradeCfg)> = {
            let mut traders = self.traders();
            if traders.is_empty() {
                return;
            }
            let per_trader = total_funds / traders.len() as f64;
            traders
                .values_mut()
                .map(|handle| {
                    handle.cfg.allocated_funds = per_trader;
                    (handle.updates.clone(), handle.cfg.clone())
                })
                .collect()
        };

        for (updates, cfg) in pushes {
            tracing::debug!(symbol = %cfg.symbol, allocated = cfg.allocated_funds, "allocation pushed");
            updates.enqueue_latest(cfg);
        }
    }

    /// Change the strategy of one symbol, or of every symbol when none is given
    pub async fn update_strategy(&self, symbol: Option<&str>, kind: StrategyKind) -> Result<()> {
        let _control = self.control.lock().await;

        let targets: Vec<String> = match symbol {
            Some(symbol) => {
                self.ensure_known(symbol)?;
                vec![symbol.to_string()]
            }
            None => self.universe.clone(),
        };

        for symbol in targets {
            let size = {
                let mut cfg = self.cfg_lock();
                let Some(symbol_cfg) = cfg.symbols.get_mut(&symbol) else {
                    continue;
                };
                symbol_cfg.strategy = kind;
                symbol_cfg.candle_size
            };

            if !self.traders().contains_key(&symbol) {
                continue;
            }

            let seeds = self.exchange.seed_histories(&symbol, size).await?;
            self.signaler.update_strategy(&symbol, kind, size, seeds)?;
            self.push_trade_cfg(&symbol, |cfg| cfg.strategy = kind);
        }

        tracing::info!(symbol = symbol.unwrap_or("*"), strategy = %kind, "strategy update applied");
        Ok(())
    }

    /// Change the candle size of a symbol, reseeding its series when running
    pub async fn update_candle_size(&self, symbol: &str, size: CandleSize) -> Result<()> {
        let _control = self.control.lock().await;
        self.ensure_known(symbol)?;

        if self.traders().contains_key(symbol) {
            self.exchange.update_symbol_candle_size(symbol, size).await?;
            self.push_trade_cfg(symbol, |cfg| cfg.candle_size = size);
        }

        if let Some(symbol_cfg) = self.cfg_lock().symbols.get_mut(symbol) {
            symbol_cfg.candle_size = size;
        }
        tracing::info!(symbol, size = %size, "candle size updated");
        Ok(())
    }

    fn push_trade_cfg(&self, symbol: &str, change: impl FnOnce(&mut TradeCfg)) {
        let push = self.traders().get_mut(symbol).map(|handle| {
            change(&mut handle.cfg);
            (handle.updates.clone(), handle.cfg.clone())
        });
        if let Some((updates, cfg)) = push {
            updates.enqueue_latest(cfg);
        }
    }

    /// Replace the daily P/L limit; lifts a halt caused by the previous limit
    pub fn update_max_pl(&self, max_pl: f64) {
        self.cfg_lock().daily_max_pl = max_pl;
        self.guard().set_max_pl(max_pl);

        if *self.halted.borrow() {
            self.signaler.restart();
            self.halted.send_replace(false);
            tracing::info!(max_pl, "P/L limit raised, manager resumed");
        } else {
            tracing::info!(max_pl, "P/L limit updated");
        }
    }

    /// Feed a P/L report into the guard; traders report through the same path
    pub fn record_profit_loss(&self, update: ProfitLossUpdate) {
        self.profit_loss.enqueue_latest(update);
    }

    pub async fn refresh_balances(&self) -> Result<HashMap<String, f64>> {
        let balances = self.exchange.token_balances().await?;
        *self.balances.lock().unwrap_or_else(|e| e.into_inner()) = balances.clone();
        Ok(balances)
    }

    pub fn balance(&self, currency: &str) -> f64 {
        self.balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(currency)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn price_history(&self, symbol: &str) -> Result<Vec<Ticker>> {
        self.ensure_known(symbol)?;
        Ok(self.exchange.store().price_history(symbol))
    }

    pub fn candle_history(&self, symbol: &str) -> Result<Vec<Candle>> {
        self.ensure_known(symbol)?;
        Ok(self.exchange.store().candle_history(symbol).into_vec())
    }

    pub fn long_candle_history(&self, symbol: &str) -> Result<Vec<Candle>> {
        self.ensure_known(symbol)?;
        Ok(self.exchange.store().long_candle_history(symbol).into_vec())
    }

    pub fn running_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.traders().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn is_running(&self, symbol: &str) -> bool {
        self.traders().contains_key(symbol)
    }

    pub fn config(&self, symbol: &str) -> Result<SymbolConfig> {
        self.symbol_config(symbol)
    }

    pub fn manager_cfg(&self) -> ManagerCfg {
        self.cfg_lock().clone()
    }

    /// Latest config pushed to a running trader
    pub fn trade_cfg(&self, symbol: &str) -> Option<TradeCfg> {
        self.traders().get(symbol).map(|handle| handle.cfg.clone())
    }

    pub fn trader_state(&self, symbol: &str) -> Option<TraderState> {
        self.traders()
            .get(symbol)
            .map(|handle| handle.state.borrow().clone())
    }

    /// Live view of a running trader; closes once its task has finished
    pub fn watch_trader(&self, symbol: &str) -> Option<watch::Receiver<TraderState>> {
        self.traders().get(symbol).map(|handle| handle.state.clone())
    }

    pub fn daily_profit_loss(&self) -> f64 {
        self.guard().total()
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.borrow()
    }

    /// Flips to true when the P/L guard stops the fleet
    pub fn halted(&self) -> watch::Receiver<bool> {
        self.halted.subscribe()
    }

    pub fn signaler(&self) -> &SignalEngine {
        &self.signaler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::{RecordedOrder, StubExchange};

    fn params(universe: &[&str]) -> ManagerParams {
        ManagerParams {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            total_funds: 1000.0,
            daily_max_pl: 100.0,
            default_strategy: StrategyKind::DonchianChannel,
            default_candle_size: CandleSize::FiveMinutes,
        }
    }

    fn manager(exchange: &Arc<StubExchange>, universe: &[&str]) -> Arc<Manager> {
        let exchange: Arc<dyn Exchange> = exchange.clone();
        Manager::new(
            exchange,
            params(universe),
            ManagerConfig::default(),
            SignalerConfig::default(),
            TraderConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_new_validates_params() {
        let exchange: Arc<dyn Exchange> = StubExchange::new();
        let empty = Manager::new(
            exchange.clone(),
            params(&[]),
            ManagerConfig::default(),
            SignalerConfig::default(),
            TraderConfig::default(),
        );
        assert!(matches!(empty, Err(OrchestratorError::Config(_))));

        let broke = Manager::new(
            exchange,
            ManagerParams {
                total_funds: 0.0,
                ..params(&["ETH-USD"])
            },
            ManagerConfig::default(),
            SignalerConfig::default(),
            TraderConfig::default(),
        );
        assert!(matches!(broke, Err(OrchestratorError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_registers_everything_once() {
        let exchange = StubExchange::new();
        exchange.set_balance("ETH", 2.0);
        let manager = manager(&exchange, &["ETH-USD", "BTC-USD"]);

        assert!(!manager.config("ETH-USD").unwrap().enabled);
        manager.start("ETH-USD").await.unwrap();

        assert!(manager.is_running("ETH-USD"));
        assert!(manager.config("ETH-USD").unwrap().enabled);
        assert!(manager.signaler().is_registered("ETH-USD"));
        assert!(exchange.hub().is_active("ETH-USD"));
        assert_eq!(manager.balance("ETH"), 2.0);
        assert_eq!(manager.trade_cfg("ETH-USD").unwrap().allocated_funds, 1000.0);
        assert!(!manager.candle_history("ETH-USD").unwrap().is_empty());

        assert!(matches!(
            manager.start("ETH-USD").await,
            Err(OrchestratorError::AlreadyRunning(_))
        ));
        assert!(matches!(
            manager.start("DOGE-USD").await,
            Err(OrchestratorError::UnknownSymbol(_))
        ));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_and_stop_reallocate_funds() {
        let exchange = StubExchange::new();
        let manager = manager(&exchange, &["ETH-USD", "BTC-USD"]);

        manager.start("ETH-USD").await.unwrap();
        manager.start("BTC-USD").await.unwrap();
        assert_eq!(manager.trade_cfg("ETH-USD").unwrap().allocated_funds, 500.0);
        assert_eq!(manager.trade_cfg("BTC-USD").unwrap().allocated_funds, 500.0);

        manager.stop("BTC-USD").await.unwrap();
        assert!(matches!(
            manager.stop("BTC-USD").await,
            Err(OrchestratorError::NotRunning(_))
        ));
        assert!(!exchange.hub().is_active("BTC-USD"));
        assert!(!manager.signaler().is_registered("BTC-USD"));

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.trade_cfg("ETH-USD").unwrap().allocated_funds != 1000.0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_closes_out_held_tokens() {
        let exchange = StubExchange::new();
        exchange.set_balance("ETH", 3.0);
        let manager = manager(&exchange, &["ETH-USD"]);

        manager.start("ETH-USD").await.unwrap();
        manager.stop("ETH-USD").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while exchange.orders().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            exchange.orders(),
            vec![RecordedOrder::SellTokens {
                symbol: "ETH-USD".to_string(),
                tokens: 3.0
            }]
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_toggle_and_update_controls() {
        let exchange = StubExchange::new();
        let manager = manager(&exchange, &["ETH-USD", "BTC-USD"]);

        assert!(manager.toggle_symbol("ETH-USD").await.unwrap());
        assert_eq!(manager.running_symbols(), vec!["ETH-USD".to_string()]);

        manager
            .update_strategy(None, StrategyKind::Supertrend)
            .await
            .unwrap();
        assert_eq!(manager.config("BTC-USD").unwrap().strategy, StrategyKind::Supertrend);
        assert_eq!(
            manager.signaler().strategy_kind("ETH-USD"),
            Some(StrategyKind::Supertrend)
        );
        assert_eq!(
            manager.trade_cfg("ETH-USD").unwrap().strategy,
            StrategyKind::Supertrend
        );

        manager
            .update_candle_size("ETH-USD", CandleSize::OneHour)
            .await
            .unwrap();
        assert_eq!(manager.config("ETH-USD").unwrap().candle_size, CandleSize::OneHour);
        assert_eq!(exchange.store().size("ETH-USD"), Some(CandleSize::OneHour));

        assert!(!manager.toggle_symbol("ETH-USD").await.unwrap());
        assert!(manager.running_symbols().is_empty());
        assert!(manager.toggle_symbol("NOPE").await.is_err());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_pl_guard_halts_until_limit_raised() {
        let exchange = StubExchange::new();
        let manager = manager(&exchange, &["ETH-USD", "BTC-USD"]);
        let mut halted = manager.halted();

        manager.start("ETH-USD").await.unwrap();
        manager.record_profit_loss(ProfitLossUpdate {
            symbol: "ETH-USD".to_string(),
            profit_loss: 101.0,
            time: Utc::now(),
        });

        tokio::time::timeout(Duration::from_secs(5), halted.wait_for(|h| *h))
            .await
            .unwrap()
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.is_running("ETH-USD") || !manager.signaler().is_stopped() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(
            manager.start("BTC-USD").await,
            Err(OrchestratorError::Halted(_))
        ));

        manager.update_max_pl(500.0);
        assert!(!manager.is_halted());
        manager.start("BTC-USD").await.unwrap();
        assert!(manager.is_running("BTC-USD"));

        manager.shutdown().await;
    }
}

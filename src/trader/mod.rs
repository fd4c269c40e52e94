// Trader module
// Per-symbol reconciliation of the actual position toward a signal-driven target
pub mod pending;

pub use pending::{FillDelta, PendingOrder};

use crate::channel::{LatestReceiver, LatestSender};
use crate::exchange::{Exchange, Subscription};
use crate::models::{
    OrderStatus, OrderUpdate, ProfitLossUpdate, Side, Signal, SignalType, Ticker, TradeCfg,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Bound of the manager-to-trader config channel
pub const CONFIG_UPDATES_CAPACITY: usize = 4;

/// Trader timing and risk settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    pub reconcile_interval_ms: u64,  // How often actual is pushed toward target
    pub tolerance_ratio: f64,        // Dead-band as a share of allocated funds
    pub close_out_timeout_ms: u64,   // Budget for each close-out call
    pub pl_report_interval_ms: u64,  // P/L cadence toward the manager
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 30_000,
            tolerance_ratio: 0.01,
            close_out_timeout_ms: 10_000,
            pl_report_interval_ms: 20_000,
        }
    }
}

impl TraderConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }

    pub fn close_out_timeout(&self) -> Duration {
        Duration::from_millis(self.close_out_timeout_ms)
    }

    pub fn pl_report_interval(&self) -> Duration {
        Duration::from_millis(self.pl_report_interval_ms.max(1))
    }
}

/// Position bookkeeping of one trader
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraderState {
    pub pending_order: Option<PendingOrder>,
    pub actual_position_tokens: f64,
    pub actual_position_usd: f64,
    /// Cost basis reconciled from fills, never marked to market
    pub usd_per_fulfilled_orders: f64,
    pub target_position_usd: f64,
    pub current_price: f64,
}

impl TraderState {
    /// Fulfilled cost basis plus whatever the pending order still commits
    pub fn position_proxy(&self) -> f64 {
        self.usd_per_fulfilled_orders
            + self
                .pending_order
                .as_ref()
                .map(PendingOrder::signed_remaining)
                .unwrap_or(0.0)
    }

    pub fn profit_loss(&self) -> f64 {
        self.actual_position_usd - self.usd_per_fulfilled_orders
    }
}

/// Inbound and outbound channels wired by the manager
pub struct TraderChannels {
    pub signals: mpsc::Receiver<Signal>,
    pub updates: LatestReceiver<TradeCfg>,
    pub profit_loss: LatestSender<ProfitLossUpdate>,
}

pub struct Trader {
    cfg: TradeCfg,
    config: TraderConfig,
    exchange: Arc<dyn Exchange>,
    state: TraderState,
    tickers: Subscription<Ticker>,
    orders: Subscription<OrderUpdate>,
    signals: mpsc::Receiver<Signal>,
    updates: LatestReceiver<TradeCfg>,
    profit_loss: LatestSender<ProfitLossUpdate>,
    state_tx: watch::Sender<TraderState>,
}

impl Trader {
    /// Subscribes to tickers and order updates immediately so nothing published
    /// before the first poll of [`Trader::run`] is missed
    pub fn new(
        cfg: TradeCfg,
        exchange: Arc<dyn Exchange>,
        channels: TraderChannels,
        starting_tokens: f64,
        config: TraderConfig,
    ) -> Self {
        let state = TraderState {
            actual_position_tokens: starting_tokens.max(0.0),
            ..TraderState::default()
        };
        let (state_tx, _) = watch::channel(state.clone());

        Self {
            tickers: exchange.subscribe_tickers(&cfg.symbol),
            orders: exchange.subscribe_order_updates(&cfg.symbol),
            cfg,
            config,
            exchange,
            state,
            signals: channels.signals,
            updates: channels.updates,
            profit_loss: channels.profit_loss,
            state_tx,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.cfg.symbol
    }

    pub fn cfg(&self) -> &TradeCfg {
        &self.cfg
    }

    pub fn state(&self) -> &TraderState {
        &self.state
    }

    /// Live view of the state, refreshed after every handled event
    pub fn watch_state(&self) -> watch::Receiver<TraderState> {
        self.state_tx.subscribe()
    }

    /// Event loop; returns after close-out once `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            symbol = %self.cfg.symbol,
            allocated = self.cfg.allocated_funds,
            strategy = %self.cfg.strategy,
            tokens = self.state.actual_position_tokens,
            "🤖 trader started"
        );

        let start = Instant::now();
        let mut reconcile = tokio::time::interval_at(
            start + self.config.reconcile_interval(),
            self.config.reconcile_interval(),
        );
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report = tokio::time::interval_at(
            start + self.config.pl_report_interval(),
            self.config.pl_report_interval(),
        );
        report.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut signals_open = true;
        let mut updates_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.close_out().await;
                    break;
                }
                Some(ticker) = self.tickers.recv(), if !self.tickers.is_closed() => {
                    self.on_ticker(&ticker);
                }
                Some(update) = self.orders.recv(), if !self.orders.is_closed() => {
                    self.on_order_update(&update);
                }
                update = self.updates.recv(), if updates_open => match update {
                    Some(cfg) => self.on_config(cfg),
                    None => updates_open = false,
                },
                signal = self.signals.recv(), if signals_open => match signal {
                    Some(signal) => self.on_signal(&signal),
                    None => signals_open = false,
                },
                _ = reconcile.tick() => self.reconcile().await,
                _ = report.tick() => self.report_profit_loss(),
            }

            self.state_tx.send_replace(self.state.clone());
        }

        self.state_tx.send_replace(self.state.clone());
        tracing::info!(symbol = %self.cfg.symbol, "trader stopped");
    }

    fn pct_of_allocated(&self, usd: f64) -> f64 {
        if self.cfg.allocated_funds > 0.0 {
            usd / self.cfg.allocated_funds * 100.0
        } else {
            0.0
        }
    }

    fn on_ticker(&mut self, ticker: &Ticker) {
        self.state.current_price = ticker.price;
        self.state.actual_position_usd = self.state.actual_position_tokens * ticker.price;

        // Adopt a balance that existed before this trader started
        if self.state.usd_per_fulfilled_orders == 0.0 {
            self.state.usd_per_fulfilled_orders = self.state.actual_position_usd;
        }
    }

    fn on_config(&mut self, update: TradeCfg) {
        if update.symbol != self.cfg.symbol {
            tracing::warn!(
                symbol = %self.cfg.symbol,
                update_symbol = %update.symbol,
                "config update for another symbol ignored"
            );
            return;
        }

        let old_target_pct = self.pct_of_allocated(self.state.target_position_usd);
        let strategy_changed = update.strategy != self.cfg.strategy;
        let previous_allocation = self.cfg.allocated_funds;
        self.cfg = update;

        self.state.target_position_usd = if strategy_changed {
            0.0
        } else {
            (old_target_pct * self.cfg.allocated_funds / 100.0).clamp(0.0, self.cfg.allocated_funds)
        };

        tracing::info!(
            symbol = %self.cfg.symbol,
            from = previous_allocation,
            to = self.cfg.allocated_funds,
            strategy_changed,
            target = self.state.target_position_usd,
            "allocation updated"
        );
    }

    fn on_signal(&mut self, signal: &Signal) {
        if signal.percent <= 0.0 {
            return;
        }

        let allocated = self.cfg.allocated_funds;
        match signal.signal_type {
            SignalType::Buy => {
                self.state.target_position_usd =
                    (self.state.target_position_usd + signal.percent * allocated / 100.0)
                        .min(allocated);
            }
            SignalType::Sell => {
                // Percent is taken against the actual position when it outgrew the target
                let target_pct = self.pct_of_allocated(self.state.target_position_usd);
                let actual_pct = self.pct_of_allocated(self.state.actual_position_usd);
                let mut pct = signal.percent;
                if actual_pct > target_pct && target_pct > 0.0 {
                    pct *= actual_pct / target_pct;
                }
                let pct = pct.min(target_pct);
                self.state.target_position_usd =
                    (self.state.target_position_usd - pct * allocated / 100.0).max(0.0);
            }
            SignalType::Hold => return,
        }

        tracing::info!(
            symbol = %self.cfg.symbol,
            signal = ?signal.signal_type,
            percent = signal.percent,
            target = self.state.target_position_usd,
            "🎯 target updated"
        );
    }

    fn on_order_update(&mut self, update: &OrderUpdate) {
        let Some(pending) = self.state.pending_order.as_ref() else {
            return;
        };
        if pending.order_id != update.order_id {
            return;
        }

        match &update.status {
            OrderStatus::Filled => {
                if !self.apply_fill(update) {
                    return;
                }
                if self
                    .state
                    .pending_order
                    .as_ref()
                    .is_some_and(PendingOrder::is_resolved)
                {
                    self.state.pending_order = None;
                }
                self.report_profit_loss();
            }
            OrderStatus::Cancelled | OrderStatus::Expired | OrderStatus::Failed => {
                // an IOC order can fill partially before it is cancelled
                let partly_filled = update.filled_qty > pending.filled_tokens;
                if partly_filled {
                    self.apply_fill(update);
                }

                tracing::warn!(
                    symbol = %self.cfg.symbol,
                    order_id = %update.order_id,
                    status = ?update.status,
                    filled_tokens = update.filled_qty,
                    "pending order ended before filling completely, cleared"
                );
                self.state.pending_order = None;
                if partly_filled {
                    self.report_profit_loss();
                }
            }
            _ => {}
        }
    }

    /// Fold a cumulative fill report into the pending order and the position
    fn apply_fill(&mut self, update: &OrderUpdate) -> bool {
        let Some(pending) = self.state.pending_order.as_mut() else {
            return false;
        };
        let Some(delta) = pending.apply_fill(update.leaves, update.filled_qty) else {
            return false;
        };
        let side = pending.side;
        let sign = side.sign();

        self.state.usd_per_fulfilled_orders += sign * delta.usd;
        self.state.actual_position_tokens =
            (self.state.actual_position_tokens + sign * delta.tokens).max(0.0);
        self.state.actual_position_usd =
            self.state.actual_position_tokens * self.state.current_price;

        tracing::info!(
            symbol = %self.cfg.symbol,
            order_id = %update.order_id,
            side = side.as_str(),
            filled_usd = delta.usd,
            filled_tokens = delta.tokens,
            leaves = update.leaves,
            "💰 fill applied"
        );
        true
    }

    fn has_pending_order(&mut self) -> bool {
        match &self.state.pending_order {
            Some(order) if order.is_resolved() => {
                tracing::debug!(symbol = %self.cfg.symbol, "resolved pending order cleared");
                self.state.pending_order = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    async fn reconcile(&mut self) {
        if self.has_pending_order() {
            return;
        }

        let tolerance = self.cfg.allocated_funds * self.config.tolerance_ratio;
        let delta = self.state.position_proxy() - self.state.target_position_usd;

        let (side, usd) = if delta > tolerance {
            (Side::Sell, delta)
        } else if delta < -tolerance {
            (Side::Buy, -delta)
        } else {
            return;
        };

        self.submit(side, usd).await;
    }

    async fn submit(&mut self, side: Side, usd: f64) {
        debug_assert!(self.state.pending_order.is_none(), "second pending order");
        if let Some(stale) = self.state.pending_order.take() {
            tracing::error!(
                symbol = %self.cfg.symbol,
                order_id = %stale.order_id,
                "submitting while an order is pending, stale order cleared"
            );
        }

        match self.exchange.create_order(&self.cfg.symbol, usd, side).await {
            Ok(ack) if ack.success && !ack.order_id.is_empty() => {
                tracing::info!(
                    symbol = %self.cfg.symbol,
                    order_id = %ack.order_id,
                    side = side.as_str(),
                    usd,
                    "📤 order submitted"
                );
                self.state.pending_order = Some(PendingOrder::new(
                    ack.order_id,
                    side,
                    usd,
                    self.state.current_price,
                ));
            }
            Ok(ack) => {
                tracing::warn!(
                    symbol = %self.cfg.symbol,
                    side = side.as_str(),
                    usd,
                    error = ack.error.as_deref().unwrap_or("unknown"),
                    "order not accepted, retrying next tick"
                );
            }
            Err(e) => {
                tracing::warn!(
                    symbol = %self.cfg.symbol,
                    side = side.as_str(),
                    usd,
                    error = %e,
                    "order submit failed, retrying next tick"
                );
            }
        }
    }

    fn report_profit_loss(&self) {
        let update = ProfitLossUpdate {
            symbol: self.cfg.symbol.clone(),
            profit_loss: self.state.profit_loss(),
            time: Utc::now(),
        };
        tracing::debug!(symbol = %update.symbol, profit_loss = update.profit_loss, "P/L reported");
        self.profit_loss.enqueue_latest(update);
    }

    /// Cancel the pending order then sell every held token, each within budget
    async fn close_out(&mut self) {
        tracing::info!(symbol = %self.cfg.symbol, "trader cancelled, closing position");
        let budget = self.config.close_out_timeout();

        if let Some(order) = self.state.pending_order.clone() {
            match tokio::time::timeout(budget, self.exchange.cancel_order(&order.order_id)).await {
                Ok(Ok(())) => {
                    tracing::info!(symbol = %self.cfg.symbol, order_id = %order.order_id, "pending order cancelled");
                    self.state.pending_order = None;
                }
                Ok(Err(e)) => {
                    tracing::error!(symbol = %self.cfg.symbol, order_id = %order.order_id, error = %e, "cancel failed");
                }
                Err(_) => {
                    tracing::error!(symbol = %self.cfg.symbol, order_id = %order.order_id, "cancel timed out");
                }
            }
        }

        let tokens = self.state.actual_position_tokens;
        if tokens <= 0.0 {
            return;
        }

        match tokio::time::timeout(budget, self.exchange.sell_tokens(&self.cfg.symbol, tokens)).await {
            Ok(Ok(ack)) if ack.success => {
                tracing::info!(symbol = %self.cfg.symbol, tokens, order_id = %ack.order_id, "💰 close-out sell submitted");
            }
            Ok(Ok(ack)) => {
                tracing::error!(
                    symbol = %self.cfg.symbol,
                    tokens,
                    error = ack.error.as_deref().unwrap_or("unknown"),
                    "close-out sell rejected"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(symbol = %self.cfg.symbol, tokens, error = %e, "close-out sell failed");
            }
            Err(_) => {
                tracing::error!(symbol = %self.cfg.symbol, tokens, "close-out sell timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::latest_channel;
    use crate::exchange::testing::{RecordedOrder, StubExchange};
    use crate::models::{CandleSize, StrategyKind};
    use std::sync::atomic::Ordering;

    const SYMBOL: &str = "ETH-USD";

    struct Harness {
        trader: Trader,
        exchange: Arc<StubExchange>,
        signal_tx: mpsc::Sender<Signal>,
        config_tx: LatestSender<TradeCfg>,
        pl_rx: LatestReceiver<ProfitLossUpdate>,
    }

    fn cfg(allocated: f64, strategy: StrategyKind) -> TradeCfg {
        TradeCfg {
            symbol: SYMBOL.to_string(),
            allocated_funds: allocated,
            strategy,
            candle_size: CandleSize::FiveMinutes,
        }
    }

    fn harness(allocated: f64, starting_tokens: f64) -> Harness {
        let exchange = StubExchange::new();
        let (signal_tx, signals) = mpsc::channel(1);
        let (config_tx, updates) = latest_channel(CONFIG_UPDATES_CAPACITY);
        let (pl_tx, pl_rx) = latest_channel(16);
        let dyn_exchange: Arc<dyn Exchange> = exchange.clone();

        let trader = Trader::new(
            cfg(allocated, StrategyKind::MeanReversion),
            dyn_exchange,
            TraderChannels {
                signals,
                updates,
                profit_loss: pl_tx,
            },
            starting_tokens,
            TraderConfig::default(),
        );

        Harness {
            trader,
            exchange,
            signal_tx,
            config_tx,
            pl_rx,
        }
    }

    fn ticker(price: f64) -> Ticker {
        Ticker {
            symbol: SYMBOL.to_string(),
            price,
            time: Utc::now(),
        }
    }

    fn filled(order_id: &str, filled_qty: f64, leaves: f64) -> OrderUpdate {
        OrderUpdate {
            symbol: SYMBOL.to_string(),
            order_id: order_id.to_string(),
            status: OrderStatus::Filled,
            filled_qty,
            filled_value: 0.0,
            leaves,
            price: 100.0,
            side: Side::Buy,
            time: Utc::now(),
        }
    }

    #[test]
    fn test_buy_signal_raises_target_up_to_allocation() {
        let mut h = harness(1000.0, 0.0);

        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));
        assert_eq!(h.trader.state().target_position_usd, 500.0);

        h.trader.on_signal(&Signal::buy(SYMBOL, 80.0));
        assert_eq!(h.trader.state().target_position_usd, 1000.0);

        h.trader.on_signal(&Signal::hold(SYMBOL));
        h.trader.on_signal(&Signal::sell(SYMBOL, 0.0));
        assert_eq!(h.trader.state().target_position_usd, 1000.0);
    }

    #[test]
    fn test_sell_signal_scales_with_oversized_position() {
        let mut h = harness(1000.0, 6.0);
        h.trader.on_ticker(&ticker(100.0));
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));

        // actual 60% against a 50% target: a 25% sell becomes 30%
        h.trader.on_signal(&Signal::sell(SYMBOL, 25.0));
        assert!((h.trader.state().target_position_usd - 200.0).abs() < 1e-9);

        h.trader.on_signal(&Signal::sell(SYMBOL, 100.0));
        assert_eq!(h.trader.state().target_position_usd, 0.0);
    }

    #[test]
    fn test_config_update_keeps_target_share() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));

        h.trader.on_config(cfg(500.0, StrategyKind::MeanReversion));
        assert_eq!(h.trader.state().target_position_usd, 250.0);
        assert_eq!(h.trader.cfg().allocated_funds, 500.0);

        h.trader.on_config(cfg(500.0, StrategyKind::TurtleTrader));
        assert_eq!(h.trader.state().target_position_usd, 0.0);

        h.trader.on_config(TradeCfg {
            symbol: "BTC-USD".to_string(),
            ..cfg(10.0, StrategyKind::TurtleTrader)
        });
        assert_eq!(h.trader.cfg().allocated_funds, 500.0);
    }

    #[test]
    fn test_ticker_adopts_existing_balance() {
        let mut h = harness(1000.0, 2.0);
        h.trader.on_ticker(&ticker(100.0));

        assert_eq!(h.trader.state().actual_position_usd, 200.0);
        assert_eq!(h.trader.state().usd_per_fulfilled_orders, 200.0);

        h.trader.on_ticker(&ticker(110.0));
        assert_eq!(h.trader.state().actual_position_usd, 220.0);
        assert_eq!(h.trader.state().usd_per_fulfilled_orders, 200.0);
        assert_eq!(h.trader.state().profit_loss(), 20.0);
    }

    #[tokio::test]
    async fn test_reconcile_buys_and_applies_fill() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_ticker(&ticker(100.0));
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));

        h.trader.reconcile().await;
        assert_eq!(
            h.exchange.orders(),
            vec![RecordedOrder::Create {
                symbol: SYMBOL.to_string(),
                usd: 500.0,
                side: Side::Buy
            }]
        );
        let pending = h.trader.state().pending_order.clone().unwrap();
        assert_eq!(pending.order_id, "order-1");
        assert_eq!(pending.original_tokens, 5.0);

        h.trader.on_order_update(&filled("order-1", 5.0, 0.0));
        let state = h.trader.state();
        assert_eq!(state.actual_position_tokens, 5.0);
        assert_eq!(state.usd_per_fulfilled_orders, 500.0);
        assert!(state.pending_order.is_none());
        assert!(h.pl_rx.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_partial_fills_reconcile_incrementally() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_ticker(&ticker(100.0));
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));
        h.trader.reconcile().await;

        h.trader.on_order_update(&filled("order-1", 2.0, 300.0));
        let state = h.trader.state();
        assert_eq!(state.actual_position_tokens, 2.0);
        assert_eq!(state.usd_per_fulfilled_orders, 200.0);
        assert_eq!(state.pending_order.as_ref().unwrap().remaining_usd, 300.0);

        // Pending order blocks further submissions
        h.trader.reconcile().await;
        assert_eq!(h.exchange.orders().len(), 1);

        h.trader.on_order_update(&filled("other", 9.0, 0.0));
        h.trader.on_order_update(&filled("order-1", 5.0, 0.0));
        let state = h.trader.state();
        assert_eq!(state.actual_position_tokens, 5.0);
        assert_eq!(state.usd_per_fulfilled_orders, 500.0);
        assert!(state.pending_order.is_none());
    }

    #[tokio::test]
    async fn test_reconcile_respects_tolerance_and_sells_excess() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_ticker(&ticker(100.0));
        h.trader.on_signal(&Signal::buy(SYMBOL, 0.5));

        h.trader.reconcile().await;
        assert!(h.exchange.orders().is_empty());

        let mut h = harness(1000.0, 3.0);
        h.trader.on_ticker(&ticker(100.0));
        h.trader.reconcile().await;
        assert_eq!(
            h.exchange.orders(),
            vec![RecordedOrder::Create {
                symbol: SYMBOL.to_string(),
                usd: 300.0,
                side: Side::Sell
            }]
        );
        assert_eq!(h.trader.state().position_proxy(), 0.0);
    }

    #[tokio::test]
    async fn test_rejected_submit_retries_next_tick() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));
        h.exchange.reject_orders.store(true, Ordering::SeqCst);

        h.trader.reconcile().await;
        assert!(h.trader.state().pending_order.is_none());

        h.exchange.reject_orders.store(false, Ordering::SeqCst);
        h.trader.reconcile().await;
        assert!(h.trader.state().pending_order.is_some());
        assert_eq!(h.exchange.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_order_clears_pending() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));
        h.trader.reconcile().await;

        h.trader.on_order_update(&OrderUpdate {
            status: OrderStatus::Cancelled,
            ..filled("order-1", 0.0, 500.0)
        });
        assert!(h.trader.state().pending_order.is_none());
        assert_eq!(h.trader.state().usd_per_fulfilled_orders, 0.0);
    }

    #[tokio::test]
    async fn test_cancel_after_partial_fill_keeps_filled_part() {
        let mut h = harness(1000.0, 0.0);
        h.trader.on_ticker(&ticker(100.0));
        h.trader.on_signal(&Signal::buy(SYMBOL, 50.0));
        h.trader.reconcile().await;

        h.trader.on_order_update(&OrderUpdate {
            status: OrderStatus::Cancelled,
            ..filled("order-1", 2.0, 300.0)
        });

        let state = h.trader.state();
        assert!(state.pending_order.is_none());
        assert_eq!(state.actual_position_tokens, 2.0);
        assert_eq!(state.usd_per_fulfilled_orders, 200.0);
        assert_eq!(state.actual_position_usd, 200.0);
        assert_eq!(h.pl_rx.try_recv().unwrap().profit_loss, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reconciles_and_closes_out_on_cancel() {
        let h = harness(1000.0, 0.0);
        let exchange = h.exchange.clone();
        let hub = exchange.hub().clone();
        let state = h.trader.watch_state();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.trader.run(cancel.clone()));

        h.signal_tx.send(Signal::buy(SYMBOL, 50.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.borrow().target_position_usd, 500.0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(exchange.orders().len(), 1);

        hub.publish_order(&filled("order-1", 2.0, 300.0));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.borrow().actual_position_tokens, 2.0);

        h.config_tx.enqueue_latest(cfg(500.0, StrategyKind::MeanReversion));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.borrow().target_position_usd, 250.0);

        cancel.cancel();
        handle.await.unwrap();

        let orders = exchange.orders();
        assert_eq!(
            orders[1..].to_vec(),
            vec![
                RecordedOrder::Cancel {
                    order_id: "order-1".to_string()
                },
                RecordedOrder::SellTokens {
                    symbol: SYMBOL.to_string(),
                    tokens: 2.0
                },
            ]
        );
        assert!(state.borrow().pending_order.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_profit_loss_periodically() {
        let h = harness(1000.0, 1.0);
        let hub = h.exchange.hub().clone();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.trader.run(cancel.clone()));

        let start = crate::store::align_to_bucket(Utc::now(), CandleSize::ThirtyMinutes);
        hub.store().add_symbol(
            SYMBOL,
            CandleSize::FiveMinutes,
            vec![crate::models::Candle::flat(SYMBOL, start, 100.0, 1.0)],
            vec![crate::models::Candle::flat(SYMBOL, start, 100.0, 1.0)],
        );
        hub.consume_candle(&crate::models::Candle::flat(SYMBOL, start, 100.0, 1.0));
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.consume_candle(&crate::models::Candle::flat(SYMBOL, start, 120.0, 1.0));

        tokio::time::sleep(Duration::from_secs(21)).await;
        let report = h.pl_rx.try_recv().unwrap();
        assert_eq!(report.symbol, SYMBOL);
        assert_eq!(report.profit_loss, 20.0);

        cancel.cancel();
        handle.await.unwrap();
    }
}

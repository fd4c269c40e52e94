use crate::indicators::{calculate_atr, calculate_ema, calculate_rsi};
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Mean reversion trading strategy
///
/// Buys capitulation bars on the long series and lets fixed ATR-based
/// levels take it out again.
///
/// Entry conditions (ALL must be true):
/// - RSI is extremely low (rsi_oversold, e.g. < 20)
/// - A fair-value gap is open: the low `fvg_lookback` bars ago is above the current high
/// - The current bar closed green
/// - Close is below both the fast and the slow EMA
///
/// Exit conditions (ANY triggers exit):
/// - Close reaches the take profit (entry + 3.5 ATR)
/// - Close reaches the stop loss (entry - 1.75 ATR)
#[derive(Debug, Default)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    /// RSI period for calculation
    pub rsi_period: usize,

    /// RSI level for "extremely oversold" (e.g. 20)
    pub rsi_oversold: f64,

    /// Bars back to the candle whose low must clear the current high
    pub fvg_lookback: usize,

    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
    pub atr_period: usize,

    /// Take profit distance in ATRs
    pub take_profit_atr: f64,

    /// Stop loss distance in ATRs
    pub stop_loss_atr: f64,

    pub min_candles: usize,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,         // Standard RSI period
            rsi_oversold: 20.0,     // Deeply oversold
            fvg_lookback: 12,       // Gap measured against the bar 12 back
            fast_ema_period: 20,    // Short-term mean
            slow_ema_period: 100,   // Long-term mean
            atr_period: 14,         // Standard ATR period
            take_profit_atr: 3.5,   // 2:1 reward to risk
            stop_loss_atr: 1.75,
            min_candles: 100,       // Full long series
        }
    }
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }
}

impl Strategy for MeanReversionStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.merged_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let candles = history.as_slice();
        let current = &candles[n - 1];
        let close = current.close;
        let position = self.positions.get(symbol);

        if position.in_position {
            if position.take_profit_hit(close) || position.stop_loss_hit(close) {
                tracing::info!(
                    "💰 MEAN REVERSION EXIT {}: close ${:.2} (TP {:.2}, SL {:.2})",
                    symbol,
                    close,
                    position.take_profit,
                    position.stop_loss
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        let closes = history.closes();
        let (Some(rsi), Some(fast_ema), Some(slow_ema), Some(atr)) = (
            calculate_rsi(&closes, self.config.rsi_period),
            calculate_ema(&closes, self.config.fast_ema_period),
            calculate_ema(&closes, self.config.slow_ema_period),
            calculate_atr(candles, self.config.atr_period),
        ) else {
            return Signal::hold(symbol);
        };

        let gap_open = candles[n - 1 - self.config.fvg_lookback].low > current.high;
        let entry_conditions = [
            rsi < self.config.rsi_oversold,
            gap_open,
            current.close > current.open,
            close < fast_ema && close < slow_ema,
        ];

        tracing::debug!(
            "Mean Reversion Entry Check {}: rsi={:.1} (<{}?={}), fvg={}, green={}, below_emas={}",
            symbol,
            rsi,
            self.config.rsi_oversold,
            entry_conditions[0],
            entry_conditions[1],
            entry_conditions[2],
            entry_conditions[3]
        );

        if entry_conditions.iter().all(|&x| x) {
            let take_profit = close + self.config.take_profit_atr * atr;
            let stop_loss = close - self.config.stop_loss_atr * atr;
            tracing::info!(
                "🎯 MEAN REVERSION BUY {}: ${:.2}, RSI {:.1}, TP {:.2}, SL {:.2}",
                symbol,
                close,
                rsi,
                take_profit,
                stop_loss
            );
            return Signal::buy(symbol, 100.0)
                .with_entry(close)
                .with_take_profit(take_profit)
                .with_stop_loss(stop_loss);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::MeanReversion
    }

    fn min_candles_required(&self) -> usize {
        self.config
            .min_candles
            .max(self.config.slow_ema_period)
            .max(self.config.fvg_lookback + 1)
    }
}

use crate::indicators::{calculate_atr_series, ema_series};
use crate::models::{Candle, Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::{cross_over, cross_under, or_zero};
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Heiken-Ashi ATR trailing-stop strategy
///
/// Runs an ATR trailing line over the Heiken-Ashi view of the primary
/// series. A close crossing above the line while above the EMA opens a
/// position with fixed ATR levels; a crossunder below the EMA or either
/// level being touched closes it.
#[derive(Debug, Default)]
pub struct HeikenAshiStrategy {
    config: HeikenAshiConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct HeikenAshiConfig {
    pub atr_period: usize,
    /// Trailing line distance in ATRs
    pub atr_multiplier: f64,
    pub ema_period: usize,
    pub take_profit_atr: f64,
    pub stop_loss_atr: f64,
}

impl Default for HeikenAshiConfig {
    fn default() -> Self {
        Self {
            atr_period: 26,
            atr_multiplier: 4.0,
            ema_period: 20,
            take_profit_atr: 3.5,
            stop_loss_atr: 1.75,
        }
    }
}

impl HeikenAshiStrategy {
    pub fn new(config: HeikenAshiConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }

    /// ATR trailing stop line aligned with `candles`
    fn trailing_line(&self, candles: &[Candle], atr: &[f64]) -> Vec<f64> {
        let mut line = vec![0.0; candles.len()];
        for j in 1..candles.len() {
            let close = candles[j].close;
            let prev_close = candles[j - 1].close;
            let prev = line[j - 1];
            let loss = self.config.atr_multiplier * or_zero(atr[j]);

            line[j] = if close > prev && prev_close > prev {
                prev.max(close - loss)
            } else if close < prev && prev_close < prev {
                prev.min(close + loss)
            } else if close > prev {
                close - loss
            } else {
                close + loss
            };
        }
        line
    }
}

impl Strategy for HeikenAshiStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let ha = store.heiken_ashi_history(symbol);
        let n = ha.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }
        let history = store.candle_history(symbol);
        let Some(raw) = history.last() else {
            return Signal::hold(symbol);
        };

        let atr = calculate_atr_series(&ha, self.config.atr_period);
        let ha_closes: Vec<f64> = ha.iter().map(|c| c.close).collect();
        let ema = ema_series(&ha_closes, self.config.ema_period);
        let line = self.trailing_line(&ha, &atr);

        let ha_close = ha_closes[n - 1];
        let last_atr = or_zero(atr[n - 1]);
        let buy = cross_over(&ha_closes, &line) && ha_close > ema[n - 1];
        let sell = cross_under(&ha_closes, &line) && ha_close < ema[n - 1];

        tracing::debug!(
            "Heiken Ashi {}: ha_close={:.2}, line={:.2}, ema={:.2}, atr={:.4}",
            symbol,
            ha_close,
            line[n - 1],
            ema[n - 1],
            last_atr
        );

        let position = self.positions.get(symbol);
        if position.in_position {
            if sell || position.stop_loss_hit(raw.low) || position.take_profit_hit(raw.high) {
                tracing::info!(
                    "💰 HEIKEN ASHI EXIT {}: ${:.2} (TP {:.2}, SL {:.2}, crossunder={})",
                    symbol,
                    raw.close,
                    position.take_profit,
                    position.stop_loss,
                    sell
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        if buy {
            let stop_loss = raw.close - self.config.stop_loss_atr * last_atr;
            let take_profit = raw.close + self.config.take_profit_atr * last_atr;
            tracing::info!(
                "🎯 HEIKEN ASHI BUY {}: ${:.2}, TP {:.2}, SL {:.2}",
                symbol,
                raw.close,
                take_profit,
                stop_loss
            );
            return Signal::buy(symbol, 100.0)
                .with_entry(raw.close)
                .with_take_profit(take_profit)
                .with_stop_loss(stop_loss);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::HeikenAshi
    }

    fn min_candles_required(&self) -> usize {
        self.config.atr_period + 2
    }
}

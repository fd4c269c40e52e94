use crate::indicators::calculate_atr_series;
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::{or_zero, sign};
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Grover Llorens activator
///
/// A stepping line that jumps one ATR away from price on every cross and
/// then walks toward price by ATR/length per bar since that cross. Close
/// crossing above the line buys; crossing below exits.
#[derive(Debug, Default)]
pub struct GroverLlorensStrategy {
    config: GroverLlorensConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct GroverLlorensConfig {
    pub length: usize,
    pub multiplier: f64,
    pub trailing_stop_atr: f64,
    pub take_profit_atr: f64,
}

impl Default for GroverLlorensConfig {
    fn default() -> Self {
        Self {
            length: 14,
            multiplier: 1.0,
            trailing_stop_atr: 2.0,
            take_profit_atr: 4.0,
        }
    }
}

/// Cross state of the activator line on the last bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cross {
    Up,
    Down,
    None,
}

impl GroverLlorensStrategy {
    pub fn new(config: GroverLlorensConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }

    fn last_cross(&self, closes: &[f64], atr: &[f64]) -> Cross {
        let n = closes.len();
        let mut line = closes[0];
        let mut prev_diff = 0.0;
        let mut last_cross = 0;
        let mut cross = Cross::None;

        for i in 1..n {
            let diff = closes[i] - line;
            cross = if prev_diff <= 0.0 && diff > 0.0 {
                Cross::Up
            } else if prev_diff >= 0.0 && diff < 0.0 {
                Cross::Down
            } else {
                Cross::None
            };

            line = match cross {
                Cross::Up => {
                    last_cross = i;
                    line - or_zero(atr[i]) * self.config.multiplier
                }
                Cross::Down => {
                    last_cross = i;
                    line + or_zero(atr[i]) * self.config.multiplier
                }
                Cross::None => {
                    let step = or_zero(atr[last_cross]) / self.config.length as f64;
                    line + sign(diff) * step * (i - last_cross) as f64
                }
            };
            prev_diff = diff;
        }

        cross
    }
}

impl Strategy for GroverLlorensStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.merged_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let closes = history.closes();
        let atr = calculate_atr_series(history.as_slice(), self.config.length);
        let cross = self.last_cross(&closes, &atr);
        let close = closes[n - 1];

        tracing::debug!("Grover Llorens {}: cross={:?}, close={:.2}", symbol, cross, close);

        let position = self.positions.get(symbol);
        if cross == Cross::Up && !position.in_position {
            let atr_now = or_zero(atr[n - 1]);
            let trailing_stop = close - self.config.trailing_stop_atr * atr_now;
            let take_profit = close + self.config.take_profit_atr * atr_now;
            tracing::info!(
                "🎯 GROVER LLORENS BUY {}: ${:.2}, TS {:.2}, TP {:.2}",
                symbol,
                close,
                trailing_stop,
                take_profit
            );
            return Signal::buy(symbol, 100.0)
                .with_entry(close)
                .with_trailing_stop(trailing_stop, close)
                .with_take_profit(take_profit);
        }

        if position.in_position
            && (position.take_profit_hit(close)
                || position.trailing_stop_hit(close)
                || cross == Cross::Down)
        {
            tracing::info!(
                "💰 GROVER LLORENS EXIT {}: ${:.2} (TP {:.2}, TS {:.2}, flip={})",
                symbol,
                close,
                position.take_profit,
                position.trailing_stop,
                cross == Cross::Down
            );
            return Signal::sell(symbol, 100.0);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::GroverLlorensActivator
    }

    fn min_candles_required(&self) -> usize {
        self.config.length + 2
    }
}

use crate::indicators::{calculate_atr, highest, lowest};
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Donchian channel breakout
///
/// Buys a close above the previous 20-bar high with an ATR trailing stop and
/// take profit; exits when the close breaks the previous 10-bar low.
#[derive(Debug, Default)]
pub struct DonchianStrategy {
    config: DonchianConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct DonchianConfig {
    pub entry_period: usize,
    pub exit_period: usize,
    pub atr_period: usize,
    pub trailing_stop_atr: f64,
    pub take_profit_atr: f64,
}

impl Default for DonchianConfig {
    fn default() -> Self {
        Self {
            entry_period: 20,       // Classic 20-bar breakout
            exit_period: 10,        // Faster exit channel
            atr_period: 14,
            trailing_stop_atr: 2.0,
            take_profit_atr: 4.0,
        }
    }
}

impl DonchianStrategy {
    pub fn new(config: DonchianConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }
}

impl Strategy for DonchianStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.candle_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let cfg = &self.config;
        let highs = history.highs();
        let lows = history.lows();
        let last = n - 1;
        let close = history.as_slice()[last].close;

        let (Some(upper), Some(exit_lower)) = (
            highest(&highs, last, cfg.entry_period),
            lowest(&lows, last, cfg.exit_period),
        ) else {
            return Signal::hold(symbol);
        };

        let position = self.positions.get(symbol);
        if position.in_position {
            let channel_exit = close < exit_lower;
            if channel_exit || position.take_profit_hit(close) || position.trailing_stop_hit(close) {
                tracing::info!(
                    "💰 DONCHIAN EXIT {}: ${:.2} (lower {:.2}, TP {:.2}, TS {:.2})",
                    symbol,
                    close,
                    exit_lower,
                    position.take_profit,
                    position.trailing_stop
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        if close > upper {
            let Some(atr) = calculate_atr(history.as_slice(), cfg.atr_period) else {
                return Signal::hold(symbol);
            };
            let trailing_stop = close - cfg.trailing_stop_atr * atr;
            let take_profit = close + cfg.take_profit_atr * atr;
            tracing::info!(
                "🎯 DONCHIAN BUY {}: ${:.2} > upper {:.2}, TS {:.2}, TP {:.2}",
                symbol,
                close,
                upper,
                trailing_stop,
                take_profit
            );
            return Signal::buy(symbol, 100.0)
                .with_entry(close)
                .with_trailing_stop(trailing_stop, close)
                .with_take_profit(take_profit);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::DonchianChannel
    }

    fn min_candles_required(&self) -> usize {
        self.config
            .entry_period
            .max(self.config.exit_period)
            .max(self.config.atr_period)
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalType;
    use crate::strategy::test_support::{create_test_candles, seeded_store, SYMBOL};

    fn range_then(last: (f64, f64, f64, f64, f64)) -> Vec<(f64, f64, f64, f64, f64)> {
        let mut bars = vec![(100.0, 101.0, 99.0, 100.0, 1.0); 30];
        bars.push(last);
        bars
    }

    #[test]
    fn test_donchian_holds_inside_channel() {
        let strategy = DonchianStrategy::default();
        let store = seeded_store(create_test_candles(&range_then((100.0, 101.0, 99.0, 100.5, 1.0))));

        assert!(strategy.calculate_signal(SYMBOL, &store).is_hold());
    }

    #[test]
    fn test_donchian_buys_breakout() {
        let strategy = DonchianStrategy::default();
        let store = seeded_store(create_test_candles(&range_then((100.0, 106.0, 99.5, 105.0, 1.0))));

        let signal = strategy.calculate_signal(SYMBOL, &store);
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(signal.last_trailing_stop_price, Some(105.0));
        assert!(signal.trailing_stop.unwrap() < 105.0);
        assert!(signal.take_profit.unwrap() > 105.0);
    }

    #[test]
    fn test_donchian_exits_below_lower_channel() {
        let strategy = DonchianStrategy::default();
        let store = seeded_store(create_test_candles(&range_then((99.0, 99.5, 96.5, 97.0, 1.0))));
        strategy.confirm_signal_delivered(SYMBOL, &Signal::buy(SYMBOL, 100.0));

        let signal = strategy.calculate_signal(SYMBOL, &store);
        assert_eq!(signal.signal_type, SignalType::Sell);
        assert_eq!(signal.percent, 100.0);
    }
}

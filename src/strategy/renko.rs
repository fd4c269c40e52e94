use crate::indicators::calculate_atr;
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::{is_bearish, is_bullish};
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Renko brick reversal strategy
///
/// Bricks are rebuilt from the tick history on every evaluation with a brick
/// size of 1.5 ATR(26) on the primary series. A down brick followed by an up
/// brick opens a position; the opposite reversal closes it.
#[derive(Debug, Default)]
pub struct RenkoStrategy {
    config: RenkoConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct RenkoConfig {
    pub atr_period: usize,
    /// Brick size in ATRs
    pub brick_atr: f64,
    /// Take profit distance in bricks
    pub take_profit_bricks: f64,
    /// Stop loss distance in bricks
    pub stop_loss_bricks: f64,
}

impl Default for RenkoConfig {
    fn default() -> Self {
        Self {
            atr_period: 26,
            brick_atr: 1.5,
            take_profit_bricks: 3.0,
            stop_loss_bricks: 1.5,
        }
    }
}

impl RenkoStrategy {
    pub fn new(config: RenkoConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }
}

impl Strategy for RenkoStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.candle_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let Some(atr) = calculate_atr(history.as_slice(), self.config.atr_period) else {
            return Signal::hold(symbol);
        };
        let brick = self.config.brick_atr * atr;
        let bricks = store.build_renko(symbol, brick);
        if bricks.len() < 2 {
            tracing::debug!(symbol, bricks = bricks.len(), brick, "not enough renko bricks");
            return Signal::hold(symbol);
        }

        let previous = &bricks[bricks.len() - 2];
        let current = &bricks[bricks.len() - 1];
        let buy = is_bearish(previous) && is_bullish(current);
        let sell = is_bullish(previous) && is_bearish(current);
        let close = history.as_slice()[n - 1].close;

        let position = self.positions.get(symbol);
        if position.in_position {
            if position.take_profit_hit(close) || position.stop_loss_hit(close) || sell {
                tracing::info!(
                    "💰 RENKO EXIT {}: ${:.2} (TP {:.2}, SL {:.2}, reversal={})",
                    symbol,
                    close,
                    position.take_profit,
                    position.stop_loss,
                    sell
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        if buy {
            let take_profit = close + self.config.take_profit_bricks * brick;
            let stop_loss = close - self.config.stop_loss_bricks * brick;
            tracing::info!(
                "🎯 RENKO BUY {}: ${:.2}, brick {:.4}, TP {:.2}, SL {:.2}",
                symbol,
                close,
                brick,
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
        StrategyKind::RenkoCandlesticks
    }

    fn min_candles_required(&self) -> usize {
        self.config.atr_period + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candle, SignalType};
    use crate::store::PriceActionStore;
    use crate::strategy::test_support::{create_test_candles, seeded_store, SYMBOL};
    use chrono::Duration;

    /// Quiet history with one wide last bar, then ticks 100 -> 90 -> 102
    fn store_with_reversal() -> PriceActionStore {
        let mut bars = vec![(100.0, 101.0, 99.0, 100.0, 1.0); 39];
        bars.push((100.0, 130.0, 70.0, 100.0, 1.0));
        let candles = create_test_candles(&bars);
        let last_start = candles[candles.len() - 1].start;
        let store = seeded_store(candles);

        let now = last_start + Duration::minutes(1);
        for price in [100.0, 90.0, 102.0] {
            store.ingest_inbound_at(&Candle::flat(SYMBOL, last_start, price, 1.0), now);
        }
        store
    }

    #[test]
    fn test_renko_needs_bricks() {
        let strategy = RenkoStrategy::default();
        let store = seeded_store(create_test_candles(&[(100.0, 101.0, 99.0, 100.0, 1.0); 40]));

        assert!(strategy.calculate_signal(SYMBOL, &store).is_hold());
    }

    #[test]
    fn test_renko_buys_on_reversal_brick() {
        let strategy = RenkoStrategy::default();
        let store = store_with_reversal();

        let signal = strategy.calculate_signal(SYMBOL, &store);
        assert_eq!(signal.signal_type, SignalType::Buy);

        let brick = 1.5 * 110.0 / 26.0;
        assert!((signal.take_profit.unwrap() - (102.0 + 3.0 * brick)).abs() < 1e-9);
        assert!((signal.stop_loss.unwrap() - (102.0 - 1.5 * brick)).abs() < 1e-9);
        assert_eq!(store.renko_history(SYMBOL).len(), 2);
    }

    #[test]
    fn test_renko_exits_on_stop_loss() {
        let strategy = RenkoStrategy::default();
        let store = store_with_reversal();
        strategy.confirm_signal_delivered(
            SYMBOL,
            &Signal::buy(SYMBOL, 100.0)
                .with_take_profit(130.0)
                .with_stop_loss(105.0),
        );

        let signal = strategy.calculate_signal(SYMBOL, &store);
        assert_eq!(signal.signal_type, SignalType::Sell);
    }
}

use crate::indicators::{calculate_atr, calculate_ema};
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::{find_pivots, line_price_at};
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Trendline breakout
///
/// Draws a resistance line through the last two lower pivot highs and a
/// support line through the last two higher pivot lows. A close crossing
/// above resistance (optionally above the EMA) opens a position; a close
/// crossing below support closes it.
#[derive(Debug, Default)]
pub struct TrendlineBreakoutStrategy {
    config: TrendlineBreakoutConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct TrendlineBreakoutConfig {
    /// Bars required on each side of a pivot
    pub pivot_lookback: usize,
    pub use_ema_filter: bool,
    pub ema_period: usize,
    pub atr_period: usize,
    pub trailing_stop_atr: f64,
    pub take_profit_atr: f64,
    /// Pivots remembered per side
    pub max_pivots: usize,
}

impl Default for TrendlineBreakoutConfig {
    fn default() -> Self {
        Self {
            pivot_lookback: 5,
            use_ema_filter: true,
            ema_period: 50,
            atr_period: 14,
            trailing_stop_atr: 2.0,
            take_profit_atr: 4.0,
            max_pivots: 20,
        }
    }
}

/// Line through two pivots, projected onto bar indices
#[derive(Debug, Clone, Copy)]
struct Trendline {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl Trendline {
    /// Line through the last two pivots, if they slope the way `accept` wants
    fn from_pivots(pivots: &[(usize, f64)], accept: impl Fn(f64, f64) -> bool) -> Option<Self> {
        let [.., (x1, y1), (x2, y2)] = pivots else {
            return None;
        };
        (accept(*y1, *y2) && x2 > x1).then_some(Self {
            x1: *x1 as f64,
            y1: *y1,
            x2: *x2 as f64,
            y2: *y2,
        })
    }

    fn price_at(&self, idx: usize) -> f64 {
        line_price_at(self.x1, self.y1, self.x2, self.y2, idx as f64)
    }
}

impl TrendlineBreakoutStrategy {
    pub fn new(config: TrendlineBreakoutConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }
}

impl Strategy for TrendlineBreakoutStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.candle_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let cfg = &self.config;
        let closes = history.closes();
        let lows = find_pivots(&history.lows(), cfg.pivot_lookback, false, cfg.max_pivots);
        let highs = find_pivots(&history.highs(), cfg.pivot_lookback, true, cfg.max_pivots);

        let support = Trendline::from_pivots(&lows, |y1, y2| y2 > y1);
        let resistance = Trendline::from_pivots(&highs, |y1, y2| y2 < y1);

        let (curr, prev) = (n - 1, n - 2);
        let close = closes[curr];
        let close_prev = closes[prev];
        let ema = calculate_ema(&closes, cfg.ema_period);

        let long_break = resistance.is_some_and(|line| {
            close_prev <= line.price_at(prev)
                && close > line.price_at(curr)
                && (!cfg.use_ema_filter || ema.is_some_and(|ema| close > ema))
        });
        let short_break = support.is_some_and(|line| {
            close_prev >= line.price_at(prev)
                && close < line.price_at(curr)
                && (!cfg.use_ema_filter || ema.is_some_and(|ema| close < ema))
        });

        tracing::debug!(
            "Trendline Breakout {}: support={}, resistance={}, long_break={}, short_break={}",
            symbol,
            support.is_some(),
            resistance.is_some(),
            long_break,
            short_break
        );

        let position = self.positions.get(symbol);
        if long_break && !position.in_position {
            let Some(atr) = calculate_atr(history.as_slice(), cfg.atr_period) else {
                return Signal::hold(symbol);
            };
            let trailing_stop = close - cfg.trailing_stop_atr * atr;
            let take_profit = close + cfg.take_profit_atr * atr;
            tracing::info!(
                "🎯 TRENDLINE BREAKOUT BUY {}: ${:.2}, TS {:.2}, TP {:.2}",
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

        if position.in_position && !short_break {
            if position.take_profit_hit(close) || position.trailing_stop_hit(close) {
                tracing::info!(
                    "💰 TRENDLINE EXIT {}: ${:.2} (TP {:.2}, TS {:.2})",
                    symbol,
                    close,
                    position.take_profit,
                    position.trailing_stop
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        if short_break {
            tracing::info!("💰 TRENDLINE SUPPORT BREAK {}: ${:.2}", symbol, close);
            return Signal::sell(symbol, 100.0);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::TrendlineBreakout
    }

    fn min_candles_required(&self) -> usize {
        self.config.pivot_lookback + 2
    }
}

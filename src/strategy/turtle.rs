use crate::indicators::calculate_atr_series;
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::or_zero;
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// How the prediction distance is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionUnit {
    Atr,
    Percent,
}

/// Turtle breakout with Fibonacci pullback filter and pyramiding
///
/// A breakout above the Donchian high while the channel is in "high break"
/// mode opens half a position. Each further rise of 0.2 prediction units
/// adds an eighth; take profit or the trailing stop closes everything.
#[derive(Debug, Default)]
pub struct TurtleStrategy {
    config: TurtleConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct TurtleConfig {
    pub period: usize,
    pub prediction_unit: PredictionUnit,
    pub prediction_multiplier: f64,
    /// Only buy above the last high pullback level
    pub use_pullback_filter: bool,
    pub entry_percent: f64,
    pub scale_in_percent: f64,
    /// Scale-in step as a fraction of the prediction distance
    pub scale_in_step: f64,
}

impl Default for TurtleConfig {
    fn default() -> Self {
        Self {
            period: 26,
            prediction_unit: PredictionUnit::Atr,
            prediction_multiplier: 4.0,
            use_pullback_filter: true,
            entry_percent: 50.0,        // Half position on breakout
            scale_in_percent: 12.5,     // Eighth per pyramid step
            scale_in_step: 0.2,
        }
    }
}

/// Channel state derived from the whole series, evaluated at the last bar
struct Breakout {
    up_trend: bool,
    down_trend: bool,
    buy: bool,
    sell: bool,
}

impl TurtleStrategy {
    pub fn new(config: TurtleConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }

    fn breakout(&self, highs: &[f64], lows: &[f64], closes: &[f64]) -> Breakout {
        let n = closes.len();
        let period = self.config.period;

        let mut hb = vec![0.0; n];
        let mut lb = vec![0.0; n];
        let mut hf = vec![0.0; n];
        let mut lf = vec![0.0; n];
        for i in period - 1..n {
            let window = i + 1 - period..=i;
            hb[i] = highs[window.clone()].iter().copied().fold(f64::MIN, f64::max);
            lb[i] = lows[window].iter().copied().fold(f64::MAX, f64::min);
            let dist = hb[i] - lb[i];
            hf[i] = hb[i] - dist * 0.236;
            lf[i] = hb[i] - dist * 0.764;
        }

        let mut leh = vec![0.0; n];
        let mut lel = vec![0.0; n];
        let mut high_break = vec![false; n];
        for i in 3..n {
            let hb_start = hb[i - 3] == hb[i - 2] && hb[i - 2] == hb[i - 1] && highs[i] > hb[i - 1];
            let lb_start = lb[i - 3] == lb[i - 2] && lb[i - 2] == lb[i - 1] && lows[i] < lb[i - 1];

            let ev_high = hb_start || highs[i - 1] == hb[i];
            let ev_low = lb_start || lows[i - 1] == lb[i];
            leh[i] = if ev_high { hf[i] } else { leh[i - 1] };
            lel[i] = if ev_low { lf[i] } else { lel[i - 1] };

            high_break[i] = if ev_high {
                true
            } else if ev_low {
                false
            } else {
                high_break[i - 1]
            };
        }

        let i = n - 1;
        let close = closes[i];
        let up_trend = high_break[i] && close > hf[i];
        let down_trend = !high_break[i] && close < lf[i];
        let pullback_ok = |level: bool| !self.config.use_pullback_filter || level;

        Breakout {
            up_trend,
            down_trend,
            buy: up_trend && highs[i] > hb[i - 1] && pullback_ok(close > leh[i]),
            sell: down_trend && lows[i] < lb[i - 1] && pullback_ok(close < lel[i]),
        }
    }

    fn prediction(&self, atr: f64, close: f64) -> f64 {
        match self.config.prediction_unit {
            PredictionUnit::Atr => self.config.prediction_multiplier * or_zero(atr),
            PredictionUnit::Percent => self.config.prediction_multiplier * close / 100.0,
        }
    }
}

impl Strategy for TurtleStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.merged_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let cfg = &self.config;
        let highs = history.highs();
        let lows = history.lows();
        let closes = history.closes();
        let close = closes[n - 1];

        let breakout = self.breakout(&highs, &lows, &closes);
        let atr = calculate_atr_series(history.as_slice(), cfg.period);
        let pred = self.prediction(atr[n - 1], close);

        tracing::debug!(
            "Turtle {}: up={}, down={}, buy={}, sell={}, pred={:.4}",
            symbol,
            breakout.up_trend,
            breakout.down_trend,
            breakout.buy,
            breakout.sell,
            pred
        );

        let position = self.positions.get(symbol);
        if !position.in_position && breakout.buy {
            let trailing_stop = close - 0.5 * pred;
            let take_profit = close + pred;
            let threshold = close + cfg.scale_in_step * pred;
            tracing::info!(
                "🎯 TURTLE BUY {}: ${:.2}, TS {:.2}, TP {:.2}, add above {:.2}",
                symbol,
                close,
                trailing_stop,
                take_profit,
                threshold
            );
            return Signal::buy(symbol, cfg.entry_percent)
                .with_entry(close)
                .with_trailing_stop(trailing_stop, close)
                .with_take_profit(take_profit)
                .with_position_increase_threshold(threshold);
        }

        if position.in_position {
            if position.take_profit_hit(close) || position.trailing_stop_hit(close) {
                tracing::info!(
                    "💰 TURTLE EXIT {}: ${:.2} (TP {:.2}, TS {:.2})",
                    symbol,
                    close,
                    position.take_profit,
                    position.trailing_stop
                );
                return Signal::sell(symbol, 100.0);
            }
            if position.increase_threshold_hit(close) {
                let threshold = position.position_increase_threshold + cfg.scale_in_step * pred;
                tracing::info!(
                    "➕ TURTLE ADD {}: ${:.2}, next add above {:.2}",
                    symbol,
                    close,
                    threshold
                );
                return Signal::buy(symbol, cfg.scale_in_percent)
                    .with_entry(position.entry_price)
                    .with_trailing_stop(position.trailing_stop, position.last_trailing_stop_price)
                    .with_take_profit(position.take_profit)
                    .with_position_increase_threshold(threshold);
            }
            return Signal::hold(symbol);
        }

        if breakout.sell {
            // Long-only: a downside breakout with no position just flattens
            return Signal::sell(symbol, 100.0);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::TurtleTrader
    }

    fn min_candles_required(&self) -> usize {
        self.config.period + 4
    }
}

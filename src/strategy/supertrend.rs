use crate::indicators::{calculate_atr_series, sma_series};
use crate::models::{Candle, Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::{not_enough_history, PositionHolder, Strategy};
use chrono::Timelike;
use chrono_tz::Tz;

/// Supertrend-gated opening range breakout
///
/// The opening range is the high/low of the first candles after the session
/// open in the configured exchange timezone. A close breaking above the
/// range while the supertrend points up on above-average volume opens a
/// position; a close back below the range low closes it.
#[derive(Debug, Default)]
pub struct SupertrendStrategy {
    config: SupertrendConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct SupertrendConfig {
    pub atr_period: usize,
    pub factor: f64,
    pub session_hour: u32,
    pub session_minute: u32,
    pub session_tz: Tz,
    /// Candles in the opening range
    pub orb_length: usize,
    pub volume_filter: bool,
    pub volume_period: usize,
    /// Take profit distance as a multiple of the stop distance
    pub risk_reward: f64,
    /// ATR buffer below the range low for the trailing stop
    pub trailing_stop_atr: f64,
}

impl Default for SupertrendConfig {
    fn default() -> Self {
        Self {
            atr_period: 11,
            factor: 2.0,
            session_hour: 9,                              // 09:30 New York open
            session_minute: 30,
            session_tz: chrono_tz::America::New_York,
            orb_length: 5,
            volume_filter: true,
            volume_period: 50,
            risk_reward: 3.0,
            trailing_stop_atr: 1.0,
        }
    }
}

/// Direction of the supertrend at each bar; negative means up
fn supertrend_direction(candles: &[Candle], atr: &[f64], factor: f64) -> Vec<i8> {
    let n = candles.len();
    let mut dir = vec![1i8; n];
    let mut final_upper = vec![f64::NAN; n];
    let mut final_lower = vec![f64::NAN; n];

    for i in 0..n {
        let mid = (candles[i].high + candles[i].low) / 2.0;
        let basic_upper = mid + factor * atr[i];
        let basic_lower = mid - factor * atr[i];

        if i == 0 {
            final_upper[i] = basic_upper;
            final_lower[i] = basic_lower;
            continue;
        }

        let prev_close = candles[i - 1].close;
        final_upper[i] = if basic_upper.is_nan() || final_upper[i - 1].is_nan() {
            basic_upper
        } else if basic_upper < final_upper[i - 1] || prev_close > final_upper[i - 1] {
            basic_upper
        } else {
            final_upper[i - 1]
        };
        final_lower[i] = if basic_lower.is_nan() || final_lower[i - 1].is_nan() {
            basic_lower
        } else if basic_lower > final_lower[i - 1] || prev_close < final_lower[i - 1] {
            basic_lower
        } else {
            final_lower[i - 1]
        };

        let close = candles[i].close;
        dir[i] = if dir[i - 1] == 1 {
            if close > final_upper[i] { -1 } else { 1 }
        } else if close < final_lower[i] {
            1
        } else {
            -1
        };
    }

    dir
}

impl SupertrendStrategy {
    pub fn new(config: SupertrendConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }

    /// High and low of the most recent complete opening range
    fn opening_range(&self, candles: &[Candle]) -> Option<(f64, f64)> {
        let cfg = &self.config;
        let start = candles.iter().rposition(|c| {
            let local = c.start.with_timezone(&cfg.session_tz);
            local.hour() == cfg.session_hour && local.minute() == cfg.session_minute
        })?;
        if start + cfg.orb_length > candles.len() {
            return None;
        }

        let range = &candles[start..start + cfg.orb_length];
        let high = range.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = range.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        Some((high, low))
    }
}

impl Strategy for SupertrendStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.candle_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let cfg = &self.config;
        let candles = history.as_slice();
        let last = &candles[n - 1];
        let close = last.close;
        let close_prev = candles[n - 2].close;

        let atr = calculate_atr_series(candles, cfg.atr_period);
        let direction = supertrend_direction(candles, &atr, cfg.factor)[n - 1];
        let volume_ok = !cfg.volume_filter || {
            let volume_ma = sma_series(&history.volumes(), cfg.volume_period)[n - 1];
            !volume_ma.is_nan() && last.volume > volume_ma
        };
        let range = self.opening_range(candles);

        let long = range.is_some_and(|(high, _)| {
            close > high && close_prev <= high && close > last.open && direction < 0
        }) && volume_ok;
        let below_range = range.is_some_and(|(_, low)| close < low);

        tracing::debug!(
            "Supertrend {}: direction={}, range={:?}, volume_ok={}, long={}",
            symbol,
            direction,
            range,
            volume_ok,
            long
        );

        let position = self.positions.get(symbol);
        if long && !position.in_position {
            if let Some((_, range_low)) = range {
                let atr_now = atr[n - 1];
                let trailing_stop = if atr_now.is_nan() {
                    range_low
                } else {
                    range_low - cfg.trailing_stop_atr * atr_now
                };
                let take_profit = close + cfg.risk_reward * (close - trailing_stop);
                tracing::info!(
                    "🎯 SUPERTREND ORB BUY {}: ${:.2}, TS {:.2}, TP {:.2}",
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
        }

        if position.in_position
            && (position.take_profit_hit(close) || position.trailing_stop_hit(close) || below_range)
        {
            tracing::info!(
                "💰 SUPERTREND EXIT {}: ${:.2} (TP {:.2}, TS {:.2}, below_range={})",
                symbol,
                close,
                position.take_profit,
                position.trailing_stop,
                below_range
            );
            return Signal::sell(symbol, 100.0);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Supertrend
    }

    fn min_candles_required(&self) -> usize {
        2
    }
}

use crate::indicators::{
    calculate_adx, calculate_atr, calculate_bollinger, calculate_macd, calculate_rsi,
    calculate_stochastic, sma_series,
};
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::{cross_over, cross_under};
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Moving-average crossover gated by a stack of confirmation filters
///
/// Entry: fast SMA crosses above slow SMA while the Bollinger bands are wider
/// than 2 ATR, close is above the basis, RSI > 50, MACD above its signal,
/// Stochastic %K rising out of oversold and ADX shows a trend.
///
/// Exit: take profit, trailing stop, or the mirrored crossunder setup.
#[derive(Debug, Default)]
pub struct TrendFollowingStrategy {
    config: TrendFollowingConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct TrendFollowingConfig {
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    /// Bands must be wider than this many ATRs
    pub bb_min_width_atr: f64,
    pub bb_atr_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_period: usize,
    pub stoch_smooth: usize,
    pub stoch_d: usize,
    pub stoch_oversold: f64,
    pub stoch_overbought: f64,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub atr_period: usize,
    pub trailing_stop_atr: f64,
    pub take_profit_atr: f64,
}

impl Default for TrendFollowingConfig {
    fn default() -> Self {
        Self {
            fast_ma_period: 20,       // 20-period MA
            slow_ma_period: 50,       // 50-period MA
            bb_period: 20,
            bb_multiplier: 2.0,
            bb_min_width_atr: 2.0,    // Skip crossovers in a squeeze
            bb_atr_period: 20,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_period: 14,
            stoch_smooth: 3,
            stoch_d: 3,
            stoch_oversold: 20.0,
            stoch_overbought: 80.0,
            adx_period: 14,
            adx_threshold: 20.0,      // Trending market only
            atr_period: 14,
            trailing_stop_atr: 2.0,
            take_profit_atr: 4.0,
        }
    }
}

impl TrendFollowingStrategy {
    pub fn new(config: TrendFollowingConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }
}

impl Strategy for TrendFollowingStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.merged_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let cfg = &self.config;
        let candles = history.as_slice();
        let closes = history.closes();
        let close = closes[n - 1];

        let fast = sma_series(&closes, cfg.fast_ma_period);
        let slow = sma_series(&closes, cfg.slow_ma_period);

        let (Some(bands), Some(band_atr), Some(rsi), Some(macd), Some((k, d)), Some((adx, _, _)), Some(atr)) = (
            calculate_bollinger(&closes, cfg.bb_period, cfg.bb_multiplier),
            calculate_atr(candles, cfg.bb_atr_period),
            calculate_rsi(&closes, cfg.rsi_period),
            calculate_macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal),
            calculate_stochastic(candles, cfg.stoch_period, cfg.stoch_smooth, cfg.stoch_d),
            calculate_adx(candles, cfg.adx_period),
            calculate_atr(candles, cfg.atr_period),
        ) else {
            return Signal::hold(symbol);
        };

        let volatile = bands.upper - bands.lower > band_atr * cfg.bb_min_width_atr;
        let trending = adx > cfg.adx_threshold;

        let buy = cross_over(&fast, &slow)
            && volatile
            && close > bands.middle
            && rsi > 50.0
            && macd.macd > macd.signal
            && k > cfg.stoch_oversold
            && k > d
            && trending;

        let sell = cross_under(&fast, &slow)
            && volatile
            && close < bands.middle
            && rsi < 50.0
            && macd.macd < macd.signal
            && k < cfg.stoch_overbought
            && k < d
            && trending;

        tracing::debug!(
            "Trend Following {}: rsi={:.1}, macd_hist={:.4}, k={:.1}, d={:.1}, adx={:.1}, volatile={}",
            symbol,
            rsi,
            macd.histogram,
            k,
            d,
            adx,
            volatile
        );

        let position = self.positions.get(symbol);
        if position.in_position {
            if position.take_profit_hit(close) || position.trailing_stop_hit(close) || sell {
                tracing::info!(
                    "💰 TREND FOLLOWING EXIT {}: ${:.2} (TP {:.2}, TS {:.2}, crossunder={})",
                    symbol,
                    close,
                    position.take_profit,
                    position.trailing_stop,
                    sell
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        if buy {
            let trailing_stop = close - cfg.trailing_stop_atr * atr;
            let take_profit = close + cfg.take_profit_atr * atr;
            tracing::info!(
                "🎯 TREND FOLLOWING BUY {}: ${:.2}, ADX {:.1}, TS {:.2}, TP {:.2}",
                symbol,
                close,
                adx,
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
        StrategyKind::TrendFollowing
    }

    fn min_candles_required(&self) -> usize {
        self.config
            .slow_ma_period
            .max(self.config.macd_slow + self.config.macd_signal)
            .max(self.config.stoch_period + self.config.stoch_smooth + self.config.stoch_d)
    }
}

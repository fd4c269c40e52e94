use crate::indicators::{calculate_atr, calculate_sma};
use crate::models::{Signal, StrategyKind};
use crate::store::PriceActionStore;
use crate::strategy::helpers::latest_pivot_low;
use crate::strategy::patterns::{
    average_strength, bearish_patterns, bullish_patterns, fired, neutral_patterns, Bars,
    BEARISH_STRENGTHS, BULLISH_NAMES, BULLISH_STRENGTHS, NEUTRAL_NAMES, NEUTRAL_STRENGTHS,
};
use crate::strategy::{not_enough_history, PositionHolder, Strategy};

/// Candlestick pattern voting
///
/// Scores 25 bullish, 25 bearish and 34 neutral patterns on the latest bar
/// of the long series. Entries need a strong bullish vote confirmed by
/// volume, trend, a nearby pivot-low support and the higher timeframe.
/// Open positions are closed on a strong bearish vote in a downtrend or on
/// a strong indecision vote.
#[derive(Debug, Default)]
pub struct CandlestickAggregationStrategy {
    config: CandlestickAggregationConfig,
    positions: PositionHolder,
}

#[derive(Debug, Clone)]
pub struct CandlestickAggregationConfig {
    pub atr_period: usize,
    pub volume_ma_period: usize,
    /// Volume must exceed its MA by this factor
    pub volume_spike: f64,
    pub trend_ma_period: usize,
    pub htf_ma_period: usize,
    /// Patterns weaker than this do not vote
    pub min_pattern_strength: f64,
    /// Average strength needed to act
    pub signal_threshold: f64,
    pub pivot_lookback: usize,
    /// Max distance from support as a fraction of the support price
    pub support_tolerance: f64,
    pub min_candles: usize,
}

impl Default for CandlestickAggregationConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            volume_ma_period: 20,
            volume_spike: 1.5,            // 50% above average volume
            trend_ma_period: 20,
            htf_ma_period: 50,
            min_pattern_strength: 5.0,
            signal_threshold: 7.0,
            pivot_lookback: 10,
            support_tolerance: 0.01,      // Within 1% of the pivot low
            min_candles: 100,
        }
    }
}

impl CandlestickAggregationStrategy {
    pub fn new(config: CandlestickAggregationConfig) -> Self {
        Self {
            config,
            positions: PositionHolder::new(),
        }
    }
}

impl Strategy for CandlestickAggregationStrategy {
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal {
        let history = store.merged_history(symbol);
        let n = history.len();
        if n < self.min_candles_required() {
            return not_enough_history(self, symbol, n, self.min_candles_required());
        }

        let cfg = &self.config;
        let candles = history.as_slice();
        let closes = history.closes();
        let volumes = history.volumes();
        let current = &candles[n - 1];
        let close = current.close;

        let (Some(atr), Some(volume_ma), Some(trend_ma), Some(htf_ma)) = (
            calculate_atr(candles, cfg.atr_period),
            calculate_sma(&volumes, cfg.volume_ma_period),
            calculate_sma(&closes, cfg.trend_ma_period),
            calculate_sma(&closes, cfg.htf_ma_period),
        ) else {
            return Signal::hold(symbol);
        };
        let Some(bars) = Bars::new(candles, atr) else {
            return Signal::hold(symbol);
        };

        let bullish = bullish_patterns(&bars);
        let bearish = bearish_patterns(&bars);
        let neutral = neutral_patterns(&bars);
        let bull_avg = average_strength(&bullish, &BULLISH_STRENGTHS, cfg.min_pattern_strength);
        let bear_avg = average_strength(&bearish, &BEARISH_STRENGTHS, cfg.min_pattern_strength);
        let neutral_avg =
            average_strength(&neutral, &NEUTRAL_STRENGTHS, cfg.min_pattern_strength);

        let uptrend = close > trend_ma;
        let volume_spike = current.volume > volume_ma * cfg.volume_spike;
        let near_support = latest_pivot_low(&history.lows(), cfg.pivot_lookback)
            .map(|support| support > 0.0 && (close - support).abs() / support <= cfg.support_tolerance)
            .unwrap_or(false);
        let follow_through = current.close > current.open;
        let htf_up = close > htf_ma;

        tracing::debug!(
            "Candlestick Aggregation {}: bull={:.1}, bear={:.1}, neutral={:.1}, uptrend={}, spike={}, support={}, htf_up={}",
            symbol,
            bull_avg,
            bear_avg,
            neutral_avg,
            uptrend,
            volume_spike,
            near_support,
            htf_up
        );

        let position = self.positions.get(symbol);
        if position.in_position {
            let exit = (bear_avg >= cfg.signal_threshold && !uptrend)
                || neutral_avg >= cfg.signal_threshold;
            if exit {
                tracing::info!(
                    "💰 CANDLESTICK EXIT {}: ${:.2}, bearish {:.1}, neutral {:.1} {:?}",
                    symbol,
                    close,
                    bear_avg,
                    neutral_avg,
                    fired(&neutral, &NEUTRAL_NAMES)
                );
                return Signal::sell(symbol, 100.0);
            }
            return Signal::hold(symbol);
        }

        let long = bull_avg >= cfg.signal_threshold
            && bear_avg < cfg.signal_threshold
            && uptrend
            && volume_spike
            && near_support
            && follow_through
            && htf_up;

        if long {
            let percent = (bull_avg * 10.0).min(100.0);
            tracing::info!(
                "🎯 CANDLESTICK BUY {}: ${:.2}, strength {:.1} {:?}",
                symbol,
                close,
                bull_avg,
                fired(&bullish, &BULLISH_NAMES)
            );
            return Signal::buy(symbol, percent).with_entry(close);
        }

        Signal::hold(symbol)
    }

    fn positions(&self) -> &PositionHolder {
        &self.positions
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::CandlestickAggregation
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_candles.max(self.config.htf_ma_period)
    }
}

/// Candle geometry and series helpers shared by the strategies

use crate::models::Candle;

pub fn body_size(candle: &Candle) -> f64 {
    (candle.close - candle.open).abs()
}

pub fn candle_range(candle: &Candle) -> f64 {
    candle.high - candle.low
}

pub fn upper_shadow(candle: &Candle) -> f64 {
    (candle.high - candle.open.max(candle.close)).max(0.0)
}

pub fn lower_shadow(candle: &Candle) -> f64 {
    (candle.open.min(candle.close) - candle.low).max(0.0)
}

pub fn is_bullish(candle: &Candle) -> bool {
    candle.close > candle.open
}

pub fn is_bearish(candle: &Candle) -> bool {
    candle.close < candle.open
}

/// Body smaller than `atr × atr_mult` or than `range × range_pct`
pub fn is_small_body(candle: &Candle, atr: f64, atr_mult: f64, range_pct: f64) -> bool {
    let body = body_size(candle);
    body < atr * atr_mult || body < candle_range(candle) * range_pct
}

/// Body larger than `atr × atr_mult` or than `range × range_pct`
pub fn is_long_body(candle: &Candle, atr: f64, atr_mult: f64, range_pct: f64) -> bool {
    let body = body_size(candle);
    body > atr * atr_mult || body > candle_range(candle) * range_pct
}

pub fn is_doji(candle: &Candle, atr: f64, atr_mult: f64, range_pct: f64) -> bool {
    is_small_body(candle, atr, atr_mult, range_pct)
        && upper_shadow(candle) > 0.0
        && lower_shadow(candle) > 0.0
}

/// Current candle's full range sits strictly inside the previous one
pub fn is_harami_strict(current: &Candle, previous: &Candle) -> bool {
    current.high < previous.high && current.low > previous.low
}

pub fn is_engulfing(current: &Candle, previous: &Candle) -> bool {
    body_size(current) > body_size(previous) && is_bullish(current) != is_bullish(previous)
}

pub fn is_marubozu(candle: &Candle, shadow_pct: f64) -> bool {
    body_size(candle) > candle_range(candle) * (1.0 - shadow_pct)
}

pub fn is_gap_up(current: &Candle, previous: &Candle) -> bool {
    !current.open.is_nan() && !previous.high.is_nan() && current.open > previous.high
}

pub fn is_gap_down(current: &Candle, previous: &Candle) -> bool {
    !current.open.is_nan() && !previous.low.is_nan() && current.open < previous.low
}

/// Shadow longer than `pct` of the candle range; zero-range candles never qualify
pub fn is_long_shadow(shadow: f64, range: f64, pct: f64) -> bool {
    range != 0.0 && shadow > range * pct
}

/// `a` crossed above `b` on the latest bar
pub fn cross_over(a: &[f64], b: &[f64]) -> bool {
    if a.len() < 2 || b.len() < 2 {
        return false;
    }
    a[a.len() - 2] < b[b.len() - 2] && a[a.len() - 1] > b[b.len() - 1]
}

/// `a` crossed below `b` on the latest bar
pub fn cross_under(a: &[f64], b: &[f64]) -> bool {
    if a.len() < 2 || b.len() < 2 {
        return false;
    }
    a[a.len() - 2] > b[b.len() - 2] && a[a.len() - 1] < b[b.len() - 1]
}

/// Price at bar `idx` of the line through (x1, y1) and (x2, y2)
pub fn line_price_at(x1: f64, y1: f64, x2: f64, y2: f64, idx: f64) -> f64 {
    if x2 == x1 {
        return y2;
    }
    let slope = (y2 - y1) / (x2 - x1);
    y2 + slope * (idx - x2)
}

pub fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Indicator warm-up values count as zero in recursive calculations
pub fn or_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// Confirmed pivots: bars that are the extreme of the `lookback` bars on each side
///
/// Returns (index, value) pairs oldest first, keeping at most `keep`.
pub fn find_pivots(values: &[f64], lookback: usize, highs: bool, keep: usize) -> Vec<(usize, f64)> {
    let mut pivots = Vec::new();
    if values.len() < 2 * lookback + 1 {
        return pivots;
    }

    for center in lookback..values.len() - lookback {
        let window = &values[center - lookback..=center + lookback];
        let extreme = if highs {
            window.iter().copied().fold(f64::MIN, f64::max)
        } else {
            window.iter().copied().fold(f64::MAX, f64::min)
        };
        if values[center] == extreme {
            pivots.push((center, values[center]));
            if pivots.len() > keep {
                pivots.remove(0);
            }
        }
    }

    pivots
}

/// Most recent strict pivot low (lower than every bar within `lookback` on both sides)
pub fn latest_pivot_low(lows: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || lows.len() < 2 * lookback + 1 {
        return None;
    }

    (lookback..lows.len() - lookback).rev().find_map(|center| {
        let is_trough = (1..=lookback)
            .all(|j| lows[center] < lows[center - j] && lows[center] < lows[center + j]);
        is_trough.then_some(lows[center])
    })
}

/// Most recent strict pivot high (higher than every bar within `lookback` on both sides)
pub fn latest_pivot_high(highs: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || highs.len() < 2 * lookback + 1 {
        return None;
    }

    (lookback..highs.len() - lookback).rev().find_map(|center| {
        let is_peak = (1..=lookback)
            .all(|j| highs[center] > highs[center - j] && highs[center] > highs[center + j]);
        is_peak.then_some(highs[center])
    })
}

/// Average True Range (ATR) indicator
///
/// Measures market volatility by calculating the average of true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (same as RSI and ADX) for the moving average.

use crate::models::Candle;

/// True range of each candle; the first uses high - low
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| match i {
            0 => candle.high - candle.low,
            _ => {
                let prev_close = candles[i - 1].close;
                (candle.high - candle.low)
                    .max((candle.high - prev_close).abs())
                    .max((candle.low - prev_close).abs())
            }
        })
        .collect()
}

/// Calculate ATR for the given candles
///
/// Returns the current ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period)
        .last()
        .copied()
        .filter(|v| !v.is_nan())
}

/// ATR aligned with `candles`
///
/// The first `period` values are NaN; the first ATR is the simple average of
/// the true ranges of candles 1..=period, then Wilder-smoothed.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let ranges = true_ranges(candles);

    // First ATR is simple average of first 'period' true ranges
    let mut atr: f64 = ranges[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = atr;

    // Apply Wilder's smoothing for subsequent values
    for i in period + 1..candles.len() {
        atr = (atr * (period as f64 - 1.0) + ranges[i]) / period as f64;
        out[i] = atr;
    }

    out
}

/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// Also returns +DI and -DI to determine trend direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend

use crate::models::Candle;

/// Calculate ADX, +DI, and -DI for trend strength and direction
///
/// Returns (adx, plus_di, minus_di) or None if insufficient data
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    if candles.len() < period + 1 {
        return None;
    }

    // Step 1: Calculate True Range (TR) and Directional Movement (+DM, -DM)
    let mut true_ranges = Vec::new();
    let mut plus_dms = Vec::new();
    let mut minus_dms = Vec::new();

    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;
        let prev_high = candles[i - 1].high;
        let prev_low = candles[i - 1].low;

        // True Range = max(high - low, abs(high - prev_close), abs(low - prev_close))
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        true_ranges.push(tr);

        // Directional Movement
        let up_move = high - prev_high;
        let down_move = prev_low - low;

        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };

        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        plus_dms.push(plus_dm);
        minus_dms.push(minus_dm);
    }

    if true_ranges.len() < period {
        return None;
    }

    // Step 2-5: Wilder-smooth TR and DM, derive the DI lines and DX per bar,
    // then smooth DX into ADX
    let tr_series = wilder_series(&true_ranges, period);
    let plus_series = wilder_series(&plus_dms, period);
    let minus_series = wilder_series(&minus_dms, period);

    let mut dx_values = Vec::with_capacity(tr_series.len());
    let mut plus_di = 0.0;
    let mut minus_di = 0.0;
    for ((tr, plus_dm), minus_dm) in tr_series.iter().zip(&plus_series).zip(&minus_series) {
        plus_di = if *tr > 0.0 { (plus_dm / tr) * 100.0 } else { 0.0 };
        minus_di = if *tr > 0.0 { (minus_dm / tr) * 100.0 } else { 0.0 };

        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            ((plus_di - minus_di).abs() / di_sum) * 100.0
        } else {
            0.0
        };
        dx_values.push(dx);
    }

    // Fall back to the latest DX until enough DX values exist to smooth
    let adx = wilder_smooth(&dx_values, period).or_else(|| dx_values.last().copied())?;

    Some((adx, plus_di, minus_di))
}

/// Wilder-smoothed values, one per input from index `period - 1` onwards
fn wilder_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }

    let mut smoothed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    let mut out = vec![smoothed];
    for value in &values[period..] {
        smoothed = (smoothed * (period as f64 - 1.0) + value) / period as f64;
        out.push(smoothed);
    }

    out
}

/// Wilder's smoothing method (similar to EMA but using Wilder's formula)
fn wilder_smooth(values: &[f64], period: usize) -> Option<f64> {
    wilder_series(values, period).last().copied()
}

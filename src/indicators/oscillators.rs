/// Momentum oscillators: MACD and Stochastic

use super::moving_average::{ema_series, sma_series};
use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD line, signal line and histogram for the latest bar
pub fn calculate_macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if prices.len() < slow + signal {
        return None;
    }

    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .filter(|(f, s)| !f.is_nan() && !s.is_nan())
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal);
    let macd = *macd_line.last()?;
    let signal = *signal_line.last().filter(|v| !v.is_nan())?;

    Some(Macd {
        macd,
        signal,
        histogram: macd - signal,
    })
}

/// Stochastic oscillator (%K smoothed over `k_smooth`, %D = SMA of %K)
///
/// Returns (k, d) for the latest bar.
pub fn calculate_stochastic(
    candles: &[Candle],
    period: usize,
    k_smooth: usize,
    d_period: usize,
) -> Option<(f64, f64)> {
    if period == 0 || candles.len() < period + k_smooth + d_period {
        return None;
    }

    let raw_k: Vec<f64> = (period..=candles.len())
        .map(|end| {
            let window = &candles[end - period..end];
            let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let close = window[window.len() - 1].close;
            if high > low {
                (close - low) / (high - low) * 100.0
            } else {
                50.0
            }
        })
        .collect();

    let k_line: Vec<f64> = sma_series(&raw_k, k_smooth.max(1))
        .into_iter()
        .filter(|v| !v.is_nan())
        .collect();
    let d_line = sma_series(&k_line, d_period.max(1));

    let k = *k_line.last()?;
    let d = *d_line.last().filter(|v| !v.is_nan())?;
    Some((k, d))
}

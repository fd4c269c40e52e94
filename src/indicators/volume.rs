/// Volume analysis

use crate::models::Candle;

/// Calculate average volume over the last `period` candles
pub fn calculate_average_volume(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let start_idx = candles.len() - period;
    let total_volume: f64 = candles[start_idx..].iter().map(|c| c.volume).sum();
    Some(total_volume / period as f64)
}

/// Check if volume has spiked above threshold
///
/// Returns true if current volume > threshold * average volume of the
/// `lookback` candles before it
pub fn is_volume_spike(candles: &[Candle], lookback: usize, threshold: f64) -> bool {
    if lookback == 0 || candles.len() < lookback + 1 {
        return false;
    }

    let current_volume = candles[candles.len() - 1].volume;
    let history = &candles[..candles.len() - 1];
    match calculate_average_volume(history, lookback) {
        Some(avg_volume) => current_volume > threshold * avg_volume,
        None => false,
    }
}

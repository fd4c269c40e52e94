/// Calculate Simple Moving Average (SMA)
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA)
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied().filter(|v| !v.is_nan())
}

/// SMA aligned with `prices`; the first `period - 1` values are NaN
pub fn sma_series(prices: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let mut sum: f64 = prices[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..prices.len() {
        sum += prices[i] - prices[i - period];
        out[i] = sum / period as f64;
    }

    out
}

/// EMA aligned with `prices`, seeded with the SMA of the first `period` values
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    smoothed_series(prices, period, 2.0 / (period as f64 + 1.0))
}

/// Wilder's smoothed moving average (RMA), as used by RSI and ATR
pub fn rma_series(prices: &[f64], period: usize) -> Vec<f64> {
    smoothed_series(prices, period, 1.0 / period as f64)
}

fn smoothed_series(prices: &[f64], period: usize, alpha: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    // Start with SMA
    let mut value = prices[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = value;
    for i in period..prices.len() {
        value = (prices[i] - value) * alpha + value;
        out[i] = value;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_ema() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema(&prices, 5);
        assert!(ema.is_some());
        assert!(ema.unwrap() > 104.0); // EMA should be above initial SMA
    }

    #[test]
    fn test_sma_series_alignment() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let series = sma_series(&prices, 3);

        assert_eq!(series.len(), prices.len());
        assert!(series[0].is_nan() && series[1].is_nan());
        assert_eq!(&series[2..], &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_rma_is_slower_than_ema() {
        let mut prices = vec![100.0; 20];
        prices.extend(vec![110.0; 5]);

        let ema = *ema_series(&prices, 14).last().unwrap();
        let rma = *rma_series(&prices, 14).last().unwrap();
        assert!(ema > rma && rma > 100.0);
    }
}

/// Price channels: Bollinger Bands and Donchian channels

use super::moving_average::calculate_sma;

/// Population standard deviation of the last `period` values
pub fn calculate_stddev(prices: &[f64], period: usize) -> Option<f64> {
    let mean = calculate_sma(prices, period)?;
    let variance = prices
        .iter()
        .rev()
        .take(period)
        .map(|p| (p - mean).powi(2))
        .sum::<f64>()
        / period as f64;
    Some(variance.sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Band width relative to the middle band
    pub fn width(&self) -> f64 {
        if self.middle == 0.0 {
            return 0.0;
        }
        (self.upper - self.lower) / self.middle
    }
}

/// Bollinger Bands: SMA(period) ± multiplier × stddev(period)
pub fn calculate_bollinger(prices: &[f64], period: usize, multiplier: f64) -> Option<BollingerBands> {
    let middle = calculate_sma(prices, period)?;
    let deviation = calculate_stddev(prices, period)?;
    Some(BollingerBands {
        upper: middle + multiplier * deviation,
        middle,
        lower: middle - multiplier * deviation,
    })
}

/// Highest value over the `period` values ending just before `end`
pub fn highest(values: &[f64], end: usize, period: usize) -> Option<f64> {
    window(values, end, period).map(|w| w.iter().copied().fold(f64::MIN, f64::max))
}

/// Lowest value over the `period` values ending just before `end`
pub fn lowest(values: &[f64], end: usize, period: usize) -> Option<f64> {
    window(values, end, period).map(|w| w.iter().copied().fold(f64::MAX, f64::min))
}

fn window(values: &[f64], end: usize, period: usize) -> Option<&[f64]> {
    if period == 0 || end > values.len() || end < period {
        return None;
    }
    Some(&values[end - period..end])
}

/// Donchian channel (upper, lower, middle) over the `period` bars before `end`
pub fn donchian_channel(
    highs: &[f64],
    lows: &[f64],
    end: usize,
    period: usize,
) -> Option<(f64, f64, f64)> {
    let upper = highest(highs, end, period)?;
    let lower = lowest(lows, end, period)?;
    Some((upper, lower, (upper + lower) / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stddev_of_constant_series() {
        assert_eq!(calculate_stddev(&[5.0; 10], 10), Some(0.0));
    }

    #[test]
    fn test_bollinger_symmetric() {
        let prices = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bands = calculate_bollinger(&prices, 8, 2.0).unwrap();

        assert_eq!(bands.middle, 5.0);
        assert_eq!(bands.upper, 9.0);
        assert_eq!(bands.lower, 1.0);
        assert!((bands.width() - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_donchian_excludes_current_bar() {
        let highs = vec![1.0, 5.0, 3.0, 10.0];
        let lows = vec![0.5, 2.0, 1.0, 9.0];

        let (upper, lower, middle) = donchian_channel(&highs, &lows, 3, 3).unwrap();
        assert_eq!(upper, 5.0);
        assert_eq!(lower, 0.5);
        assert_eq!(middle, 2.75);
        assert!(donchian_channel(&highs, &lows, 2, 3).is_none());
    }
}

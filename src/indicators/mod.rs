// Technical indicators module
// Pure functions over price slices and candle arrays

pub mod adx;
pub mod atr;
pub mod bands;
pub mod moving_average;
pub mod oscillators;
pub mod rsi;
pub mod volume;

pub use adx::calculate_adx;
pub use atr::{calculate_atr, calculate_atr_series, true_ranges};
pub use bands::{
    calculate_bollinger, calculate_stddev, donchian_channel, highest, lowest, BollingerBands,
};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, rma_series, sma_series};
pub use oscillators::{calculate_macd, calculate_stochastic, Macd};
pub use rsi::{calculate_rsi, rsi_series};
pub use volume::{calculate_average_volume, is_volume_spike};

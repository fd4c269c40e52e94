use crate::models::{Candle, Ticker};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const CANDLE_HISTORY_CAPACITY: usize = 100;
pub const PRICE_HISTORY_CAPACITY: usize = 1200;

/// Bounded candle series, newest at the tail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleHistory {
    candles: Vec<Candle>,
}

impl CandleHistory {
    pub fn new() -> Self {
        Self {
            candles: Vec::with_capacity(CANDLE_HISTORY_CAPACITY),
        }
    }

    /// Build from a seed, keeping the newest `CANDLE_HISTORY_CAPACITY` candles
    /// in ascending start order
    pub fn from_seed(mut seed: Vec<Candle>) -> Self {
        seed.sort_by_key(|c| c.start);
        let overflow = seed.len().saturating_sub(CANDLE_HISTORY_CAPACITY);
        seed.drain(..overflow);
        Self { candles: seed }
    }

    /// Append, dropping the oldest candle when over capacity
    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
        if self.candles.len() > CANDLE_HISTORY_CAPACITY {
            let overflow = self.candles.len() - CANDLE_HISTORY_CAPACITY;
            self.candles.drain(..overflow);
        }
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Candle> {
        self.candles.last_mut()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn starts(&self) -> Vec<DateTime<Utc>> {
        self.candles.iter().map(|c| c.start).collect()
    }

    pub fn into_vec(self) -> Vec<Candle> {
        self.candles
    }
}

/// Bounded price history fed by every ingested inbound close
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    ticks: VecDeque<Ticker>,
}

impl PriceHistory {
    pub fn push(&mut self, ticker: Ticker) {
        self.ticks.push_back(ticker);
        while self.ticks.len() > PRICE_HISTORY_CAPACITY {
            self.ticks.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.ticks.iter().map(|t| t.price).collect()
    }

    pub fn to_vec(&self) -> Vec<Ticker> {
        self.ticks.iter().cloned().collect()
    }
}

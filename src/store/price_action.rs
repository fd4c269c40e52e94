use super::aggregator::{InboundTracker, Series};
use super::history::{CandleHistory, PriceHistory};
use super::views::{heiken_ashi, renko_bricks};
use crate::models::{Candle, CandleSize, Ticker};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct SymbolSeries {
    prices: PriceHistory,
    primary: Series,
    long: Series,
    tracker: InboundTracker,
    renko: Vec<Candle>,
}

impl SymbolSeries {
    fn new(size: CandleSize, primary_seed: Vec<Candle>, long_seed: Vec<Candle>) -> Self {
        Self {
            prices: PriceHistory::default(),
            primary: Series::new(size, primary_seed),
            long: Series::new(size.long_size(), long_seed),
            tracker: InboundTracker::default(),
            renko: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct StoreInner {
    inbound_size: CandleSize,
    symbols: HashMap<String, SymbolSeries>,
}

/// Thread-safe per-symbol price and candle history
///
/// Owned by the exchange adapter; strategies read it through snapshots.
#[derive(Debug)]
pub struct PriceActionStore {
    inner: RwLock<StoreInner>,
}

impl Default for PriceActionStore {
    fn default() -> Self {
        Self::new(CandleSize::default())
    }
}

impl PriceActionStore {
    pub fn new(inbound_size: CandleSize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                inbound_size,
                symbols: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Bootstrap both series of a symbol, replacing any previous state
    pub fn add_symbol(
        &self,
        symbol: &str,
        size: CandleSize,
        primary_seed: Vec<Candle>,
        long_seed: Vec<Candle>,
    ) {
        self.write().symbols.insert(
            symbol.to_string(),
            SymbolSeries::new(size, primary_seed, long_seed),
        );
    }

    pub fn remove_symbol(&self, symbol: &str) {
        self.write().symbols.remove(symbol);
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.read().symbols.contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.read().symbols.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Replace a symbol's series with fresh seeds at a new size
    ///
    /// Price history survives the resize.
    pub fn set_size(
        &self,
        symbol: &str,
        size: CandleSize,
        primary_seed: Vec<Candle>,
        long_seed: Vec<Candle>,
    ) {
        let mut inner = self.write();
        match inner.symbols.get_mut(symbol) {
            Some(series) => {
                series.primary = Series::new(size, primary_seed);
                series.long = Series::new(size.long_size(), long_seed);
                series.tracker = InboundTracker::default();
            }
            None => tracing::warn!(symbol, "set_size on unknown symbol"),
        }
    }

    pub fn inbound_size(&self) -> CandleSize {
        self.read().inbound_size
    }

    /// Change the upstream cadence; callers reseed each symbol afterwards
    pub fn set_inbound_size(&self, size: CandleSize) {
        let mut inner = self.write();
        inner.inbound_size = size;
        for series in inner.symbols.values_mut() {
            series.tracker = InboundTracker::default();
        }
    }

    pub fn size(&self, symbol: &str) -> Option<CandleSize> {
        self.read().symbols.get(symbol).map(|s| s.primary.size)
    }

    /// Fold an inbound candle into both series of its symbol
    ///
    /// Returns the newest primary candle, or `None` when the symbol is unknown
    /// or the candle is older than the last accepted one.
    pub fn ingest_inbound(&self, candle: &Candle) -> Option<Candle> {
        self.ingest_inbound_at(candle, Utc::now())
    }

    pub fn ingest_inbound_at(&self, candle: &Candle, now: DateTime<Utc>) -> Option<Candle> {
        let mut inner = self.write();
        let inbound_size = inner.inbound_size;

        let Some(series) = inner.symbols.get_mut(&candle.symbol) else {
            tracing::warn!(symbol = %candle.symbol, "inbound candle for unknown symbol");
            return None;
        };

        if series.tracker.is_skewed(candle) {
            tracing::debug!(
                symbol = %candle.symbol,
                start = %candle.start,
                "discarding out-of-order inbound candle"
            );
            return None;
        }

        series.prices.push(Ticker {
            symbol: candle.symbol.clone(),
            price: candle.close,
            time: now,
        });

        let primary = series
            .primary
            .apply(candle, inbound_size, &series.tracker, now);
        series.long.apply(candle, inbound_size, &series.tracker, now);
        series.tracker.record(candle);

        Some(primary)
    }

    pub fn candle_history(&self, symbol: &str) -> CandleHistory {
        self.read()
            .symbols
            .get(symbol)
            .map(|s| s.primary.history.clone())
            .unwrap_or_default()
    }

    pub fn long_candle_history(&self, symbol: &str) -> CandleHistory {
        self.read()
            .symbols
            .get(symbol)
            .map(|s| s.long.history.clone())
            .unwrap_or_default()
    }

    /// Long-horizon view used by the slower strategies
    pub fn merged_history(&self, symbol: &str) -> CandleHistory {
        self.long_candle_history(symbol)
    }

    pub fn price_history(&self, symbol: &str) -> Vec<Ticker> {
        self.read()
            .symbols
            .get(symbol)
            .map(|s| s.prices.to_vec())
            .unwrap_or_default()
    }

    pub fn heiken_ashi_history(&self, symbol: &str) -> Vec<Candle> {
        heiken_ashi(self.candle_history(symbol).as_slice())
    }

    /// Rebuild the Renko bricks of a symbol from its price history
    pub fn build_renko(&self, symbol: &str, brick_size: f64) -> Vec<Candle> {
        let mut inner = self.write();
        match inner.symbols.get_mut(symbol) {
            Some(series) => {
                series.renko = renko_bricks(&series.prices.to_vec(), brick_size);
                series.renko.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn renko_history(&self, symbol: &str) -> Vec<Candle> {
        self.read()
            .symbols
            .get(symbol)
            .map(|s| s.renko.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::aggregator::align_to_bucket;
    use crate::store::history::{CANDLE_HISTORY_CAPACITY, PRICE_HISTORY_CAPACITY};
    use chrono::Duration;

    const SYMBOL: &str = "ETH-USD";

    fn t0() -> DateTime<Utc> {
        align_to_bucket(
            DateTime::<Utc>::from_timestamp(1_700_003_000, 0).unwrap(),
            CandleSize::OneDay,
        )
    }

    fn seed(size: CandleSize, count: i64) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle::flat(SYMBOL, t0() + size.duration() * i as i32, 100.0 + i as f64, 1.0))
            .collect()
    }

    fn inbound(start: DateTime<Utc>, close: f64, volume: f64) -> Candle {
        Candle::flat(SYMBOL, start, close, volume)
    }

    fn seeded_store() -> PriceActionStore {
        let store = PriceActionStore::new(CandleSize::FiveMinutes);
        store.add_symbol(
            SYMBOL,
            CandleSize::FiveMinutes,
            seed(CandleSize::FiveMinutes, 10),
            seed(CandleSize::ThirtyMinutes, 10),
        );
        store
    }

    #[test]
    fn test_add_symbol_seeds_both_series() {
        let store = seeded_store();

        assert_eq!(store.candle_history(SYMBOL).len(), 10);
        assert_eq!(store.long_candle_history(SYMBOL).len(), 10);
        assert_eq!(store.size(SYMBOL), Some(CandleSize::FiveMinutes));
        assert!(store.price_history(SYMBOL).is_empty());
    }

    #[test]
    fn test_unknown_symbol_is_noop() {
        let store = seeded_store();
        let result = store.ingest_inbound(&Candle::flat("DOGE-USD", t0(), 1.0, 1.0));

        assert!(result.is_none());
        assert!(store.candle_history("DOGE-USD").is_empty());
    }

    #[test]
    fn test_ingest_updates_primary_and_prices() {
        let store = seeded_store();
        let last_start = t0() + Duration::minutes(45);

        let out = store
            .ingest_inbound_at(&inbound(last_start, 120.0, 3.0), last_start + Duration::seconds(10))
            .unwrap();

        assert_eq!(out.start, last_start);
        assert_eq!(out.close, 120.0);
        assert_eq!(out.high, 120.0);
        assert_eq!(out.volume, 3.0);
        assert_eq!(store.price_history(SYMBOL).len(), 1);
        assert_eq!(store.candle_history(SYMBOL).len(), 10);
    }

    #[test]
    fn test_clock_skew_discarded() {
        let store = seeded_store();
        let last_start = t0() + Duration::minutes(45);
        store.ingest_inbound_at(&inbound(last_start, 120.0, 3.0), last_start + Duration::seconds(10));

        let before = store.candle_history(SYMBOL);
        let stale = inbound(last_start - Duration::minutes(5), 1.0, 1.0);
        assert!(store
            .ingest_inbound_at(&stale, last_start + Duration::seconds(20))
            .is_none());

        assert_eq!(store.candle_history(SYMBOL), before);
        assert_eq!(store.price_history(SYMBOL).len(), 1);
    }

    #[test]
    fn test_histories_stay_bounded_and_ordered() {
        let store = PriceActionStore::new(CandleSize::OneMinute);
        store.add_symbol(SYMBOL, CandleSize::OneMinute, Vec::new(), Vec::new());

        for i in 0..1500i64 {
            let start = t0() + Duration::minutes(i);
            store.ingest_inbound_at(&inbound(start, 100.0, 1.0), start + Duration::seconds(1));
        }

        let history = store.candle_history(SYMBOL);
        assert_eq!(history.len(), CANDLE_HISTORY_CAPACITY);
        assert!(history.starts().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(store.price_history(SYMBOL).len(), PRICE_HISTORY_CAPACITY);
        assert!(store.long_candle_history(SYMBOL).len() <= CANDLE_HISTORY_CAPACITY);
    }

    #[test]
    fn test_remove_then_add_matches_fresh_store() {
        let store = seeded_store();
        let last_start = t0() + Duration::minutes(45);
        store.ingest_inbound_at(&inbound(last_start, 120.0, 3.0), last_start + Duration::seconds(10));

        store.remove_symbol(SYMBOL);
        store.add_symbol(
            SYMBOL,
            CandleSize::FiveMinutes,
            seed(CandleSize::FiveMinutes, 10),
            seed(CandleSize::ThirtyMinutes, 10),
        );
        let fresh = seeded_store();

        assert_eq!(store.candle_history(SYMBOL), fresh.candle_history(SYMBOL));
        assert_eq!(store.long_candle_history(SYMBOL), fresh.long_candle_history(SYMBOL));
        assert_eq!(store.price_history(SYMBOL), fresh.price_history(SYMBOL));
    }

    #[test]
    fn test_set_size_replaces_series() {
        let store = seeded_store();
        store.set_size(
            SYMBOL,
            CandleSize::OneHour,
            seed(CandleSize::OneHour, 3),
            seed(CandleSize::FourHours, 2),
        );

        assert_eq!(store.size(SYMBOL), Some(CandleSize::OneHour));
        assert_eq!(store.candle_history(SYMBOL).len(), 3);
        assert_eq!(store.long_candle_history(SYMBOL).len(), 2);
    }

    #[test]
    fn test_renko_built_from_prices() {
        let store = PriceActionStore::new(CandleSize::OneMinute);
        store.add_symbol(SYMBOL, CandleSize::OneMinute, Vec::new(), Vec::new());
        for (i, price) in [100.0, 102.0, 104.0].iter().enumerate() {
            let start = t0() + Duration::minutes(i as i64);
            store.ingest_inbound_at(&inbound(start, *price, 1.0), start + Duration::seconds(1));
        }

        let bricks = store.build_renko(SYMBOL, 1.0);
        assert_eq!(bricks.len(), 4);
        assert_eq!(store.renko_history(SYMBOL), bricks);
    }
}

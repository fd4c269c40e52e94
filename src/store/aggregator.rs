use super::history::CandleHistory;
use crate::models::{Candle, CandleSize};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

/// Upstream bookkeeping shared by both served series of a symbol
#[derive(Debug, Clone, Default)]
pub struct InboundTracker {
    pub last_volume: f64,
    pub last_start: Option<DateTime<Utc>>,
}

impl InboundTracker {
    /// Inbound candle belongs to an upstream bucket older than the last one seen
    pub fn is_skewed(&self, inbound: &Candle) -> bool {
        matches!(self.last_start, Some(start) if inbound.start < start)
    }

    /// A new upstream bucket started since the previous sample
    pub fn crossed_boundary(&self, inbound: &Candle) -> bool {
        match self.last_start {
            Some(start) => inbound.start > start || inbound.volume < self.last_volume,
            None => false,
        }
    }

    pub fn record(&mut self, inbound: &Candle) {
        self.last_volume = inbound.volume;
        self.last_start = Some(inbound.start);
    }
}

/// One served candle series (primary or long) and its volume accumulator
#[derive(Debug, Clone)]
pub struct Series {
    pub size: CandleSize,
    pub history: CandleHistory,
    stored_volume: f64,
}

impl Series {
    pub fn new(size: CandleSize, seed: Vec<Candle>) -> Self {
        Self {
            size,
            history: CandleHistory::from_seed(seed),
            stored_volume: 0.0,
        }
    }

    /// Fold one inbound candle into the series and return the series' newest candle
    pub fn apply(
        &mut self,
        inbound: &Candle,
        inbound_size: CandleSize,
        tracker: &InboundTracker,
        now: DateTime<Utc>,
    ) -> Candle {
        let bucket = self.size.duration();
        let rolled = match self.history.last() {
            Some(last) => now - last.start > bucket,
            None => true,
        };

        let derived = match self.size.seconds().cmp(&inbound_size.seconds()) {
            Ordering::Equal => inbound.volume,
            Ordering::Less => {
                let closed = if rolled {
                    self.history.as_slice()
                } else {
                    let slice = self.history.as_slice();
                    &slice[..slice.len().saturating_sub(1)]
                };
                let already_counted: f64 = closed
                    .iter()
                    .filter(|c| c.start >= inbound.start)
                    .map(|c| c.volume)
                    .sum();
                (inbound.volume - already_counted).max(0.0)
            }
            Ordering::Greater => {
                if tracker.crossed_boundary(inbound) {
                    self.stored_volume += tracker.last_volume;
                }
                if rolled {
                    self.stored_volume = 0.0;
                }
                self.stored_volume + inbound.volume
            }
        };

        if rolled {
            let start = match self.history.last() {
                Some(last) => next_bucket_start(last.start, bucket, now),
                None => align_to_bucket(now, self.size),
            };
            self.history
                .push(Candle::flat(&inbound.symbol, start, inbound.close, derived));
        } else if let Some(last) = self.history.last_mut() {
            last.close = inbound.close;
            last.high = last.high.max(inbound.close);
            last.low = last.low.min(inbound.close);
            last.volume = derived;
        }

        self.history
            .last()
            .cloned()
            .unwrap_or_else(|| inbound.clone())
    }
}

/// Start of the bucket containing `now`, stepping whole buckets from `last_start`
fn next_bucket_start(last_start: DateTime<Utc>, bucket: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let bucket_secs = bucket.num_seconds().max(1);
    let steps = ((now - last_start).num_seconds() / bucket_secs).max(1);
    last_start + Duration::seconds(steps * bucket_secs)
}

pub fn align_to_bucket(time: DateTime<Utc>, size: CandleSize) -> DateTime<Utc> {
    let secs = time.timestamp();
    let aligned = secs - secs.rem_euclid(size.seconds());
    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(time)
}
